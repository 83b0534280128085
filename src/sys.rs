//! Scoped signal dispositions and masks, and a `waitpid` that survives
//! interrupted calls.

use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

fn set_of(signals: &[Signal]) -> SigSet {
    let mut set = SigSet::empty();
    for &sig in signals {
        set.add(sig);
    }
    set
}

/// Sets `sig` to be ignored for good.
pub fn ignore(sig: Signal) -> nix::Result<()> {
    let action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    unsafe { signal::sigaction(sig, &action) }.map(drop)
}

/// `waitpid` that retries on `EINTR`.
pub fn waitpid(pid: Pid, flags: Option<WaitPidFlag>) -> nix::Result<WaitStatus> {
    loop {
        match wait::waitpid(pid, flags) {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

/// Blocks the given signals until dropped.
pub struct BlockedSignals {
    previous: SigSet,
}

impl BlockedSignals {
    pub fn new(signals: &[Signal]) -> nix::Result<Self> {
        let mut previous = SigSet::empty();
        signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set_of(signals)), Some(&mut previous))?;
        Ok(BlockedSignals { previous })
    }
}

impl Drop for BlockedSignals {
    fn drop(&mut self) {
        let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}

/// Ignores the given signals until dropped, then reinstalls whatever was
/// there before.
pub struct IgnoredSignals {
    previous: Vec<(Signal, SigAction)>,
}

impl IgnoredSignals {
    pub fn new(signals: &[Signal]) -> nix::Result<Self> {
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        let mut guard = IgnoredSignals {
            previous: Vec::with_capacity(signals.len()),
        };
        for &sig in signals {
            let previous = unsafe { signal::sigaction(sig, &ignore) }?;
            guard.previous.push((sig, previous));
        }
        Ok(guard)
    }
}

impl Drop for IgnoredSignals {
    fn drop(&mut self) {
        for (sig, action) in self.previous.iter().rev() {
            let _ = unsafe { signal::sigaction(*sig, action) };
        }
    }
}
