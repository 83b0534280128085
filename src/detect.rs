//! Classification of the operator tokens in a [`TokenSequence`].

use crate::tokenizer::TokenSequence;

/// Which standard stream a redirection rebinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    /// The descriptor replaced by this redirection.
    pub fn stream(self) -> std::os::unix::io::RawFd {
        match self {
            Direction::Input => libc::STDIN_FILENO,
            Direction::Output => libc::STDOUT_FILENO,
        }
    }
}

/// Result of scanning a line for `<` or `>`.
///
/// The carried index is the position of the target file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectionIntent {
    None,
    Input(usize),
    Output(usize),
    Malformed,
}

impl RedirectionIntent {
    pub fn direction(self) -> Option<(Direction, usize)> {
        match self {
            RedirectionIntent::Input(target) => Some((Direction::Input, target)),
            RedirectionIntent::Output(target) => Some((Direction::Output, target)),
            RedirectionIntent::None | RedirectionIntent::Malformed => None,
        }
    }
}

/// Scans `tokens` left to right for a redirection operator.
///
/// The first operator found must be the second-to-last token and be followed
/// by a plain word. Since it is the leftmost operator, that also rejects any
/// line carrying two of them (`cat < in > out`).
///
/// ```
/// use jobsh::detect::{detect_redirection, RedirectionIntent};
/// use jobsh::tokenizer::tokenize;
///
/// assert_eq!(detect_redirection(&tokenize("ls > out")), RedirectionIntent::Output(2));
/// assert_eq!(detect_redirection(&tokenize("ls > out -l")), RedirectionIntent::Malformed);
/// ```
pub fn detect_redirection(tokens: &TokenSequence) -> RedirectionIntent {
    let len = tokens.len();
    for i in 0..len {
        let input = tokens.is_operator(i, '<');
        if !input && !tokens.is_operator(i, '>') {
            continue;
        }
        let target = i + 1;
        if target + 1 != len || tokens.is_any_operator(target) {
            return RedirectionIntent::Malformed;
        }
        return if input {
            RedirectionIntent::Input(target)
        } else {
            RedirectionIntent::Output(target)
        };
    }
    RedirectionIntent::None
}

/// Whether the last token is a bare `&`.
pub fn is_background(tokens: &TokenSequence) -> bool {
    !tokens.is_empty() && tokens.is_operator(tokens.len() - 1, '&')
}
