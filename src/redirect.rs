//! Rebinding of the shell's own stdin/stdout to a file for one command.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsFd, AsRawFd, OwnedFd};
use std::path::Path;

use nix::unistd;
use tracing::{debug, warn};

use crate::detect::Direction;
use crate::error::ShellError;

/// An applied redirection. Dropping it puts the original descriptor back and
/// closes both the saved duplicate and the target file, so every path out of
/// a command restores the shell's streams.
#[derive(Debug)]
pub struct Redirection {
    direction: Direction,
    saved: OwnedFd,
    target: File,
}

impl Redirection {
    /// Opens `path` and installs it on descriptor 0 or 1.
    ///
    /// Input targets must exist; output targets are created or truncated.
    pub fn apply(direction: Direction, path: &Path) -> Result<Self, ShellError> {
        let target = match direction {
            Direction::Input => File::open(path),
            Direction::Output => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o644)
                .open(path),
        }
        .map_err(|source| ShellError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;

        let saved = match direction {
            Direction::Input => io::stdin().as_fd().try_clone_to_owned(),
            Direction::Output => {
                let _ = io::stdout().flush();
                io::stdout().as_fd().try_clone_to_owned()
            }
        }
        .map_err(ShellError::system("dup"))?;
        unistd::dup2(target.as_raw_fd(), direction.stream()).map_err(ShellError::system("dup2"))?;
        debug!(?direction, path = %path.display(), "redirection applied");

        Ok(Redirection {
            direction,
            saved,
            target,
        })
    }
}

impl Drop for Redirection {
    fn drop(&mut self) {
        let stream = self.direction.stream();
        if self.direction == Direction::Output {
            let _ = io::stdout().flush();
        }
        match unistd::dup2(self.saved.as_raw_fd(), stream) {
            Ok(_) => debug!(
                direction = ?self.direction,
                target = self.target.as_raw_fd(),
                "redirection restored"
            ),
            Err(e) => warn!(error = %e, stream, "failed to restore redirected stream"),
        }
    }
}
