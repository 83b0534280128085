use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::launcher::LaunchError;
use crate::tokenizer::IndexError;

/// Everything that can abort a single command.
///
/// None of these end the read loop; the shell reports them and reads the
/// next line.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Token(#[from] IndexError),
    #[error("malformed redirection: `<` or `>` must be followed by exactly one file name at the end of the line")]
    RedirectionMalformed,
    #[error("unexpected `{0}`")]
    UnexpectedOperator(String),
    #[error("{}: {source}", .path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("{call} failed: {source}")]
    System {
        call: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ShellError {
    pub(crate) fn system<E: Into<io::Error>>(call: &'static str) -> impl FnOnce(E) -> ShellError {
        move |source| ShellError::System {
            call,
            source: source.into(),
        }
    }
}

/// Prints a per-command diagnostic.
pub fn report(error: &ShellError) {
    eprintln!("jobsh: {error}");
}
