//! Asynchronous reaping of background jobs.
//!
//! The SIGCHLD handler only collects children whose pids were registered
//! with [`track`], storing how they ended in a fixed table of atomic slots.
//! It never waits on an unregistered pid, so a foreground `waitpid` on a
//! specific child is never robbed. The main loop picks the recorded outcomes
//! up with [`drain`].

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};

use libc::c_int;
use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::job::WaitOutcome;
use crate::sys::BlockedSignals;

const SLOT_COUNT: usize = 64;

const FREE: u8 = 0;
const CLAIMED: u8 = 1;
const RUNNING: u8 = 2;
const DONE: u8 = 3;

struct Slot {
    state: AtomicU8,
    pid: AtomicI32,
    signaled: AtomicBool,
    /// Exit code, or terminating signal number when `signaled`.
    code: AtomicI32,
}

impl Slot {
    const fn new() -> Self {
        Slot {
            state: AtomicU8::new(FREE),
            pid: AtomicI32::new(0),
            signaled: AtomicBool::new(false),
            code: AtomicI32::new(0),
        }
    }

    fn finish(&self, signaled: bool, code: i32) {
        self.signaled.store(signaled, Ordering::Relaxed);
        self.code.store(code, Ordering::Relaxed);
        self.state.store(DONE, Ordering::Release);
    }

    fn outcome(&self) -> WaitOutcome {
        let code = self.code.load(Ordering::Relaxed);
        if !self.signaled.load(Ordering::Relaxed) {
            return WaitOutcome::Exited(code);
        }
        match Signal::try_from(code) {
            Ok(signal) => WaitOutcome::Signaled(signal),
            Err(_) => WaitOutcome::Exited(-1),
        }
    }
}

static SLOTS: [Slot; SLOT_COUNT] = [const { Slot::new() }; SLOT_COUNT];
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Installs the SIGCHLD handler. Later calls are no-ops.
pub fn install() -> nix::Result<()> {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }
    let action = SigAction::new(
        SigHandler::Handler(on_sigchld),
        SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
        SigSet::empty(),
    );
    if let Err(e) = unsafe { signal::sigaction(Signal::SIGCHLD, &action) } {
        INSTALLED.store(false, Ordering::Release);
        return Err(e);
    }
    Ok(())
}

extern "C" fn on_sigchld(_signal: c_int) {
    let saved = Errno::last_raw();
    sweep();
    Errno::set_raw(saved);
}

/// Collects every registered child that has terminated. Async-signal-safe.
fn sweep() {
    for slot in SLOTS.iter() {
        if slot.state.load(Ordering::Acquire) != RUNNING {
            continue;
        }
        let pid = Pid::from_raw(slot.pid.load(Ordering::Relaxed));
        match wait::waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => slot.finish(false, code),
            Ok(WaitStatus::Signaled(_, signal, _)) => slot.finish(true, signal as i32),
            // Reaped with a status nix cannot decode, or collected elsewhere.
            Err(Errno::EINVAL | Errno::ECHILD) => slot.finish(false, -1),
            _ => {}
        }
    }
}

/// Registers a background child for asynchronous reaping.
///
/// Returns `false` when every slot is taken; the caller then has to poll the
/// child itself.
pub fn track(pid: Pid) -> bool {
    for slot in SLOTS.iter() {
        if slot
            .state
            .compare_exchange(FREE, CLAIMED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            slot.pid.store(pid.as_raw(), Ordering::Relaxed);
            slot.state.store(RUNNING, Ordering::Release);
            return true;
        }
    }
    false
}

/// Returns every registered child selected by `owned` that terminated since
/// the last call, and frees their slots.
///
/// SIGCHLD is blocked meanwhile, and one sweep is run here to catch children
/// that exited before they were registered.
pub fn drain(owned: impl Fn(Pid) -> bool) -> nix::Result<Vec<(Pid, WaitOutcome)>> {
    let _blocked = BlockedSignals::new(&[Signal::SIGCHLD])?;
    sweep();
    let mut reaped = Vec::new();
    for slot in SLOTS.iter() {
        if slot.state.load(Ordering::Acquire) != DONE {
            continue;
        }
        let pid = Pid::from_raw(slot.pid.load(Ordering::Relaxed));
        if owned(pid) {
            reaped.push((pid, slot.outcome()));
            slot.state.store(FREE, Ordering::Release);
        }
    }
    Ok(reaped)
}
