//! Fork and exec of external programs.
//!
//! `argv[0]` is tried as given first, then each search directory in order
//! with `argv[0]` appended, and `argv[0]` itself is replaced by the candidate
//! so the program sees the path it was run from. A command that cannot be
//! executed is reported by the child, which then exits non-zero; the parent
//! only sees the status.

use std::ffi::{CStr, CString, NulError};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::BorrowedFd;
use std::path::PathBuf;
use std::ptr;

use libc::c_char;
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, SigSet, SigmaskHow, Signal};
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;
use tracing::debug;

/// Exit status of a child whose command was not found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit status of a child whose command was found but could not be run.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("empty command")]
    Empty,
    #[error("argument contains a NUL byte")]
    Nul(#[from] NulError),
    #[error("fork failed: {0}")]
    Fork(#[source] Errno),
}

/// A running child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildHandle {
    pub pid: Pid,
}

/// What the child does to itself between fork and exec.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildSetup<'fd> {
    /// Terminal to claim for the child's new process group. `None` for
    /// background jobs and non-interactive shells.
    pub terminal: Option<BorrowedFd<'fd>>,
}

/// Signals the shell may have ignored or handled that the child must see
/// with their default action.
const RESET_SIGNALS: [Signal; 6] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGCHLD,
];

/// A command prepared for exec. Everything the child needs is allocated
/// before the fork.
pub struct Launch {
    name: String,
    candidates: Vec<CString>,
    args: Vec<CString>,
    unknown: Vec<u8>,
    denied: Vec<u8>,
}

impl Launch {
    pub fn new(argv: &[String], search_path: &[PathBuf]) -> Result<Self, LaunchError> {
        let (name, rest) = argv.split_first().ok_or(LaunchError::Empty)?;
        let mut candidates = vec![CString::new(name.as_bytes())?];
        for dir in search_path {
            let mut full = dir.as_os_str().as_bytes().to_vec();
            if !full.ends_with(b"/") {
                full.push(b'/');
            }
            full.extend_from_slice(name.as_bytes());
            candidates.push(CString::new(full)?);
        }
        let args = rest
            .iter()
            .map(|arg| CString::new(arg.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Launch {
            name: name.clone(),
            candidates,
            args,
            unknown: format!("{name}: unknown command\n").into_bytes(),
            denied: format!("{name}: cannot execute\n").into_bytes(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Paths tried in order: `argv[0]` as given, then each search directory.
    pub fn candidates(&self) -> impl Iterator<Item = &CStr> {
        self.candidates.iter().map(CString::as_c_str)
    }

    /// Forks and execs. Returns in the parent only.
    pub fn spawn(&self, setup: ChildSetup<'_>) -> Result<ChildHandle, LaunchError> {
        let mut argv: Vec<*const c_char> = Vec::with_capacity(self.args.len() + 2);
        argv.push(ptr::null());
        argv.extend(self.args.iter().map(|arg| arg.as_ptr()));
        argv.push(ptr::null());

        let _ = io::stdout().flush();
        match unsafe { unistd::fork() }.map_err(LaunchError::Fork)? {
            ForkResult::Parent { child } => {
                debug!(pid = child.as_raw(), command = %self.name, "forked child");
                Ok(ChildHandle { pid: child })
            }
            ForkResult::Child => self.exec_child(setup, &mut argv),
        }
    }

    /// Runs in the forked child: only async-signal-safe calls from here on.
    fn exec_child(&self, setup: ChildSetup<'_>, argv: &mut [*const c_char]) -> ! {
        unsafe {
            // The new group is not yet in the foreground, so claiming the
            // terminal from it would raise SIGTTOU.
            let _ = signal::signal(Signal::SIGTTOU, SigHandler::SigIgn);
            let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
            if let Some(terminal) = setup.terminal {
                let _ = unistd::tcsetpgrp(terminal, unistd::getpid());
            }
            for sig in RESET_SIGNALS {
                let _ = signal::signal(sig, SigHandler::SigDfl);
            }
        }
        let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None);

        // nix's `execv` builds its pointer array on the heap, so the array
        // prepared before the fork is handed to libc directly.
        let mut found = false;
        for candidate in &self.candidates {
            argv[0] = candidate.as_ptr();
            unsafe { libc::execv(candidate.as_ptr(), argv.as_ptr()) };
            found |= !matches!(Errno::last(), Errno::ENOENT | Errno::ENOTDIR);
        }

        let (message, status) = if found {
            (&self.denied, EXIT_NOT_EXECUTABLE)
        } else {
            (&self.unknown, EXIT_NOT_FOUND)
        };
        write_all_stderr(message);
        unsafe { libc::_exit(status) }
    }
}

/// Writes `bytes` to standard error without allocating.
fn write_all_stderr(mut bytes: &[u8]) {
    while !bytes.is_empty() {
        match unistd::write(io::stderr(), bytes) {
            Ok(0) => return,
            Ok(n) => bytes = &bytes[n..],
            Err(Errno::EINTR) => {}
            Err(_) => return,
        }
    }
}

/// Prepares `argv` and forks a child that execs it.
pub fn launch(
    argv: &[String],
    search_path: &[PathBuf],
    setup: ChildSetup<'_>,
) -> Result<ChildHandle, LaunchError> {
    Launch::new(argv, search_path)?.spawn(setup)
}
