//! Process groups, terminal ownership and waiting.
//!
//! Every external command runs as the leader of its own process group. A
//! foreground job is handed the terminal for as long as it runs, then the
//! shell takes it back before the next prompt. A background job never gets
//! the terminal; it is recorded in the [`JobTable`] and reaped
//! asynchronously (see [`crate::reaper`]).

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::os::unix::io::{AsFd, OwnedFd};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::termios::{self, SetArg, Termios};
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};
use tracing::{debug, trace, warn};

use crate::error::{ShellError, report};
use crate::launcher::{ChildSetup, Launch};
use crate::reaper;
use crate::redirect::Redirection;
use crate::sys::{self, IgnoredSignals};

/// Signals a shell in the background of its terminal receives when it
/// touches the terminal.
const TTY_SIGNALS: [Signal; 2] = [Signal::SIGTTOU, Signal::SIGTTIN];

/// Signals an interactive shell ignores for itself.
const SHELL_IGNORED: [Signal; 3] = [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGTSTP];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Foreground,
    Background,
}

/// How a child changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(i32),
    Signaled(Signal),
    Stopped(Signal),
}

impl WaitOutcome {
    /// `None` for statuses that do not end or suspend a job, such as
    /// `StillAlive` or `Continued`.
    pub fn from_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(WaitOutcome::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(WaitOutcome::Signaled(signal)),
            WaitStatus::Stopped(_, signal) => Some(WaitOutcome::Stopped(signal)),
            _ => None,
        }
    }
}

impl fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitOutcome::Exited(0) => write!(f, "Done"),
            WaitOutcome::Exited(code) => write!(f, "Exit {code}"),
            WaitOutcome::Signaled(signal) => write!(f, "Killed (signal {})", *signal as i32),
            WaitOutcome::Stopped(_) => write!(f, "Stopped"),
        }
    }
}

/// The controlling terminal of an interactive shell.
///
/// Held through a private close-on-exec duplicate of standard input, so it
/// stays reachable while descriptor 0 is redirected to a file.
#[derive(Debug)]
struct Terminal {
    fd: OwnedFd,
    modes: Option<Termios>,
    initial_foreground: Pid,
}

/// The shell's own place in its session, set up once at startup.
#[derive(Debug)]
pub struct ShellContext {
    pgid: Pid,
    terminal: Option<Terminal>,
}

impl ShellContext {
    /// Takes control of the terminal on standard input if there is one.
    ///
    /// An interactive shell started in the background stops itself until it
    /// is brought to the foreground, then moves into its own process group
    /// and claims the terminal.
    pub fn init() -> Result<Self, ShellError> {
        let stdin = io::stdin();
        if !termion::is_tty(&stdin) {
            return Ok(ShellContext::non_interactive());
        }
        let fd = stdin
            .as_fd()
            .try_clone_to_owned()
            .map_err(ShellError::system("dup"))?;

        let initial_foreground = loop {
            let pgrp = unistd::getpgrp();
            let foreground = unistd::tcgetpgrp(&fd).map_err(ShellError::system("tcgetpgrp"))?;
            if foreground == pgrp {
                break pgrp;
            }
            signal::killpg(pgrp, Signal::SIGTTIN).map_err(ShellError::system("kill"))?;
        };

        for signal in SHELL_IGNORED {
            sys::ignore(signal).map_err(ShellError::system("sigaction"))?;
        }

        let pid = unistd::getpid();
        if unistd::getpgrp() != pid {
            unistd::setpgid(pid, pid).map_err(ShellError::system("setpgid"))?;
        }
        {
            let _quiet = IgnoredSignals::new(&TTY_SIGNALS).map_err(ShellError::system("sigaction"))?;
            unistd::tcsetpgrp(&fd, pid).map_err(ShellError::system("tcsetpgrp"))?;
        }
        let modes = termios::tcgetattr(&fd)
            .inspect_err(|e| warn!(error = %e, "cannot save terminal modes"))
            .ok();
        debug!(
            pgid = pid.as_raw(),
            initial_foreground = initial_foreground.as_raw(),
            "shell owns the terminal"
        );

        Ok(ShellContext {
            pgid: pid,
            terminal: Some(Terminal {
                fd,
                modes,
                initial_foreground,
            }),
        })
    }

    /// Context for input that is not a terminal: no terminal handoffs.
    pub fn non_interactive() -> Self {
        ShellContext {
            pgid: unistd::getpgrp(),
            terminal: None,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.terminal.is_some()
    }

    fn child_setup(&self, mode: Mode) -> ChildSetup<'_> {
        ChildSetup {
            terminal: self
                .terminal
                .as_ref()
                .filter(|_| mode == Mode::Foreground)
                .map(|terminal| terminal.fd.as_fd()),
        }
    }

    fn give_terminal(&self, pgid: Pid) {
        let Some(terminal) = &self.terminal else {
            return;
        };
        match unistd::tcsetpgrp(&terminal.fd, pgid) {
            Ok(()) => trace!(pgid = pgid.as_raw(), "terminal handed to job"),
            Err(e) => report(&ShellError::System {
                call: "tcsetpgrp",
                source: e.into(),
            }),
        }
    }

    /// Puts the shell's group back in the foreground and reinstalls the saved
    /// terminal modes.
    fn reclaim_terminal(&self) {
        let Some(terminal) = &self.terminal else {
            return;
        };
        if let Err(e) = unistd::tcsetpgrp(&terminal.fd, self.pgid) {
            report(&ShellError::System {
                call: "tcsetpgrp",
                source: e.into(),
            });
        }
        if let Some(modes) = &terminal.modes
            && let Err(e) = termios::tcsetattr(&terminal.fd, SetArg::TCSADRAIN, modes)
        {
            warn!(error = %e, "cannot restore terminal modes");
        }
        trace!(pgid = self.pgid.as_raw(), "terminal reclaimed");
    }

    /// Runs a prepared command as a job.
    ///
    /// A foreground job is waited for and its outcome returned; a background
    /// job is recorded in `jobs` and left running. Either way the shell owns
    /// the terminal again when this returns, and `redirection` has been
    /// undone.
    pub fn run(
        &self,
        jobs: &mut JobTable,
        launch: &Launch,
        mode: Mode,
        redirection: Option<Redirection>,
        command: &str,
    ) -> Result<(Pid, Option<WaitOutcome>), ShellError> {
        let _quiet = if self.is_interactive() {
            Some(IgnoredSignals::new(&TTY_SIGNALS).map_err(ShellError::system("sigaction"))?)
        } else {
            None
        };

        let child = launch.spawn(self.child_setup(mode))?;
        let job = Job {
            pid: child.pid,
            pgid: child.pid,
            mode,
            redirection,
        };
        // The child does the same; whichever runs first wins. EACCES means it
        // has already exec'd, by which time its own call has succeeded.
        if let Err(e) = unistd::setpgid(job.pid, job.pgid)
            && e != Errno::EACCES
        {
            debug!(pid = job.pid.as_raw(), error = %e, "setpgid in parent failed");
        }
        debug!(
            pid = job.pid.as_raw(),
            pgid = job.pgid.as_raw(),
            mode = ?job.mode,
            redirected = job.redirection.is_some(),
            "job started"
        );

        let result = match job.mode {
            Mode::Foreground => {
                self.give_terminal(job.pgid);
                let waited = sys::waitpid(job.pid, Some(WaitPidFlag::WUNTRACED))
                    .map_err(ShellError::system("waitpid"))
                    .map(|status| {
                        let outcome = WaitOutcome::from_status(status);
                        debug!(pid = job.pid.as_raw(), ?outcome, "foreground job finished");
                        if let Some(WaitOutcome::Stopped(_)) = outcome {
                            jobs.insert(job.pid, command, JobState::Stopped);
                        }
                        (job.pid, outcome)
                    });
                self.reclaim_terminal();
                waited
            }
            Mode::Background => {
                jobs.insert(job.pid, command, JobState::Running);
                debug!(pid = job.pid.as_raw(), "background job launched");
                self.reclaim_terminal();
                Ok((job.pid, None))
            }
        };
        drop(job);
        result
    }
}

impl Drop for ShellContext {
    fn drop(&mut self) {
        if let Some(terminal) = &self.terminal
            && terminal.initial_foreground != self.pgid
        {
            let _quiet = IgnoredSignals::new(&TTY_SIGNALS);
            if let Err(e) = unistd::tcsetpgrp(&terminal.fd, terminal.initial_foreground) {
                debug!(error = %e, "cannot return terminal to its initial group");
            }
        }
    }
}

/// One external command for the duration of its launch or wait. Dropping it
/// undoes its redirection.
#[derive(Debug)]
pub struct Job {
    pub pid: Pid,
    pub pgid: Pid,
    pub mode: Mode,
    redirection: Option<Redirection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct BackgroundJob {
    pub pid: Pid,
    pub command: String,
    state: JobState,
    tracked: bool,
}

/// A job that finished since the last check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub pid: Pid,
    pub command: String,
    pub outcome: WaitOutcome,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}\t{}", self.pid, self.outcome, self.command)
    }
}

/// Jobs that are not in the foreground, keyed by pid.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: BTreeMap<Pid, BackgroundJob>,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable::default()
    }

    pub fn insert(&mut self, pid: Pid, command: &str, state: JobState) {
        let tracked = reaper::track(pid);
        if !tracked {
            debug!(pid = pid.as_raw(), "reaper table full; job will be polled");
        }
        self.jobs.insert(
            pid,
            BackgroundJob {
                pid,
                command: command.to_string(),
                state,
                tracked,
            },
        );
    }

    pub fn get(&self, pid: Pid) -> Option<&BackgroundJob> {
        self.jobs.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Removes and reports every job that has terminated.
    pub fn collect(&mut self) -> Vec<Notice> {
        let mut finished = reaper::drain(|pid| self.jobs.contains_key(&pid)).unwrap_or_else(|e| {
            warn!(error = %e, "cannot drain reaped jobs");
            Vec::new()
        });
        for job in self.jobs.values().filter(|job| !job.tracked) {
            match sys::waitpid(job.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => {
                    if let Some(outcome @ (WaitOutcome::Exited(_) | WaitOutcome::Signaled(_))) =
                        WaitOutcome::from_status(status)
                    {
                        finished.push((job.pid, outcome));
                    }
                }
                Err(e) => {
                    warn!(pid = job.pid.as_raw(), error = %e, "lost track of job");
                    finished.push((job.pid, WaitOutcome::Exited(-1)));
                }
            }
        }

        finished
            .into_iter()
            .filter_map(|(pid, outcome)| {
                let job = self.jobs.remove(&pid)?;
                debug!(pid = pid.as_raw(), ?outcome, state = ?job.state, "background job reaped");
                Some(Notice {
                    pid,
                    command: job.command,
                    outcome,
                })
            })
            .collect()
    }
}
