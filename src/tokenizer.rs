//! Splits a raw input line into words.
//!
//! `<`, `>` and `&` are always tokens of their own, even when glued to the
//! surrounding text. Quoting (`'...'`, `"..."`) and backslash escapes follow
//! the usual shell rules; a quoted or escaped operator character is an
//! ordinary word and is never classified as an operator.

use thiserror::Error;

/// Characters that form single-character operator tokens.
pub const OPERATORS: [char; 3] = ['<', '>', '&'];

/// Access past the end of a [`TokenSequence`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("token index {index} out of range for {len} tokens")]
pub struct IndexError {
    pub index: usize,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    word: String,
    operator: bool,
}

/// The ordered words of one input line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSequence {
    tokens: Vec<Token>,
}

impl TokenSequence {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns the word at `index`.
    pub fn token_at(&self, index: usize) -> Result<&str, IndexError> {
        self.tokens
            .get(index)
            .map(|t| t.word.as_str())
            .ok_or(IndexError {
                index,
                len: self.len(),
            })
    }

    /// Whether the token at `index` is the unquoted operator `op`.
    pub fn is_operator(&self, index: usize, op: char) -> bool {
        self.tokens
            .get(index)
            .is_some_and(|t| t.operator && t.word.len() == op.len_utf8() && t.word.starts_with(op))
    }

    /// Whether the token at `index` is any unquoted operator.
    pub fn is_any_operator(&self, index: usize) -> bool {
        self.tokens.get(index).is_some_and(|t| t.operator)
    }

    /// Drops the last `n` tokens in place.
    pub fn truncate(&mut self, n: usize) -> Result<(), IndexError> {
        let len = self.len();
        if n > len {
            return Err(IndexError { index: n, len });
        }
        self.tokens.truncate(len - n);
        Ok(())
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|t| t.word.as_str())
    }

    pub fn into_words(self) -> Vec<String> {
        self.tokens.into_iter().map(|t| t.word).collect()
    }

    fn push_word(&mut self, word: String) {
        self.tokens.push(Token {
            word,
            operator: false,
        });
    }

    fn push_operator(&mut self, op: char) {
        self.tokens.push(Token {
            word: op.to_string(),
            operator: true,
        });
    }
}

fn is_operator_char(c: char) -> bool {
    OPERATORS.contains(&c)
}

/// Splits an input line into a [`TokenSequence`].
///
/// # Example
/// ```
/// use jobsh::tokenizer::tokenize;
///
/// let tokens = tokenize("cat 'my file'>out.txt &");
/// let words: Vec<&str> = tokens.words().collect();
/// assert_eq!(words, vec!["cat", "my file", ">", "out.txt", "&"]);
/// ```
pub fn tokenize(input: &str) -> TokenSequence {
    let mut tokens = TokenSequence::default();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if is_operator_char(c) {
            chars.next();
            tokens.push_operator(c);
            continue;
        }

        let mut word = String::new();

        loop {
            match chars.peek() {
                Some('\'') => {
                    chars.next(); // opening '
                    for c in chars.by_ref() {
                        if c == '\'' {
                            break;
                        }
                        word.push(c);
                    }
                }
                Some('"') => {
                    chars.next(); // opening "
                    while let Some(&c) = chars.peek() {
                        if c == '"' {
                            chars.next();
                            break;
                        }
                        if c == '\\' {
                            chars.next();
                            match chars.peek() {
                                Some(&next_c) if matches!(next_c, '\\' | '$' | '"' | '\n') => {
                                    word.push(next_c);
                                    chars.next();
                                }
                                _ => word.push('\\'),
                            }
                        } else {
                            word.push(c);
                            chars.next();
                        }
                    }
                }
                Some('\\') => {
                    chars.next();
                    if let Some(c) = chars.next() {
                        word.push(c);
                    }
                }
                Some(&c) if c.is_whitespace() || is_operator_char(c) => break,
                Some(&c) => {
                    word.push(c);
                    chars.next();
                }
                None => break,
            }
        }
        tokens.push_word(word);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        tokenize(line).into_words()
    }

    #[test]
    fn splits_on_runs_of_whitespace() {
        assert_eq!(words("  ls   -l\t/tmp \n"), vec!["ls", "-l", "/tmp"]);
    }

    #[test]
    fn empty_and_blank_lines_have_no_tokens() {
        assert!(tokenize("").is_empty());
        assert_eq!(tokenize(" \t \n").len(), 0);
    }

    #[test]
    fn operators_split_glued_text() {
        assert_eq!(words("cmd>file"), vec!["cmd", ">", "file"]);
        assert_eq!(words("sort<in.txt&"), vec!["sort", "<", "in.txt", "&"]);
        assert_eq!(words("a>>b"), vec!["a", ">", ">", "b"]);
    }

    #[test]
    fn rejoining_plain_words_reproduces_normalized_input() {
        for line in ["echo hello world", "  ls   -la   /usr/bin  ", "a\tb\t\tc\n", "single"] {
            let normalized = line.split_whitespace().collect::<Vec<_>>().join(" ");
            let rejoined = tokenize(line).words().collect::<Vec<_>>().join(" ");
            assert_eq!(rejoined, normalized, "line {line:?}");
        }
    }

    #[test]
    fn quoted_operators_are_words() {
        let tokens = tokenize("echo '>' \"&\" \\<");
        assert_eq!(tokens.clone().into_words(), vec!["echo", ">", "&", "<"]);
        for i in 0..tokens.len() {
            assert!(!tokens.is_any_operator(i));
        }
    }

    #[test]
    fn unquoted_operators_are_classified() {
        let tokens = tokenize("cat < in");
        assert!(tokens.is_operator(1, '<'));
        assert!(!tokens.is_operator(1, '>'));
        assert!(!tokens.is_operator(0, '<'));
        assert!(!tokens.is_operator(7, '<'));
    }

    #[test]
    fn quotes_and_escapes() {
        assert_eq!(words("echo 'a  b' \"c \\\"d\\\"\""), vec!["echo", "a  b", "c \"d\""]);
        assert_eq!(words("echo a\\ b"), vec!["echo", "a b"]);
        assert_eq!(words("echo ''"), vec!["echo", ""]);
        assert_eq!(words("echo 'unterminated"), vec!["echo", "unterminated"]);
    }

    #[test]
    fn token_at_bounds() {
        let tokens = tokenize("a b");
        assert_eq!(tokens.token_at(1), Ok("b"));
        assert_eq!(tokens.token_at(2), Err(IndexError { index: 2, len: 2 }));
    }

    #[test]
    fn truncate_drops_trailing_tokens() {
        let mut tokens = tokenize("sleep 5 &");
        tokens.truncate(1).unwrap();
        assert_eq!(tokens.clone().into_words(), vec!["sleep", "5"]);
        assert_eq!(tokens.truncate(3), Err(IndexError { index: 3, len: 2 }));
        tokens.truncate(2).unwrap();
        assert!(tokens.is_empty());
    }

    #[test]
    fn truncate_zero_is_a_no_op() {
        let mut tokens = tokenize("echo hi > out");
        let before = tokens.clone();
        tokens.truncate(0).unwrap();
        assert_eq!(tokens, before);

        let mut empty = tokenize("");
        empty.truncate(0).unwrap();
        assert!(empty.is_empty());
    }
}
