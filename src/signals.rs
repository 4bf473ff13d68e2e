//! Signal handling: the critical section that keeps handlers away from the
//! job table, handler installation, and the handlers themselves.
//!
//! Handlers run as an interruption of the main flow and stick to
//! async-signal-safe work: table mutation on the static table, kill(2),
//! waitpid(2), and the fixed-buffer writer in [`crate::output`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{
    kill, sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::error::{fatal, ShellError};
use crate::job::{jobs_in_handler, JobState, JobTable};
use crate::output;
use crate::sig_println;

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(on: bool) {
    VERBOSE.store(on, Ordering::Relaxed);
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Signals whose handlers read or write the job table.
fn job_control_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTSTP);
    set
}

/// Blocks SIGCHLD, SIGINT and SIGTSTP until dropped, then restores the
/// previous mask.
pub struct SignalBlock {
    previous: SigSet,
}

impl SignalBlock {
    pub fn job_control() -> Self {
        let mut previous = SigSet::empty();
        if let Err(errno) = sigprocmask(
            SigmaskHow::SIG_BLOCK,
            Some(&job_control_set()),
            Some(&mut previous),
        ) {
            fatal(&ShellError::os("Sigprocmask error", errno));
        }
        SignalBlock { previous }
    }

    /// Atomically swap back to the pre-block mask and sleep until a
    /// handler has run. The block is in force again on return.
    pub fn suspend(&self) {
        // SAFETY: `previous` is a valid, initialized sigset. sigsuspend
        // always returns -1/EINTR once a handler has run.
        unsafe {
            libc::sigsuspend(self.previous.as_ref());
        }
    }
}

impl Drop for SignalBlock {
    fn drop(&mut self) {
        if let Err(errno) = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None) {
            fatal(&ShellError::os("Sigprocmask error", errno));
        }
    }
}

/// Install the shell's handlers. Each runs with the job-control signals
/// masked so handlers never interleave on the table.
pub fn install() -> Result<(), ShellError> {
    let handlers: [(Signal, extern "C" fn(libc::c_int)); 4] = [
        (Signal::SIGINT, sigint_handler),
        (Signal::SIGTSTP, sigtstp_handler),
        (Signal::SIGCHLD, sigchld_handler),
        (Signal::SIGQUIT, sigquit_handler),
    ];
    for (signal, handler) in handlers {
        let action = SigAction::new(
            SigHandler::Handler(handler),
            SaFlags::SA_RESTART,
            job_control_set(),
        );
        // SAFETY: the handlers only perform async-signal-safe work.
        unsafe { sigaction(signal, &action) }
            .map_err(|errno| ShellError::os("Signal error", errno))?;
    }
    tracing::debug!("signal handlers installed");
    Ok(())
}

/// Send `signal` to the whole process group led by `pid`. A group that
/// has already vanished is not an error.
pub fn signal_group(pid: Pid, signal: Signal) -> Result<(), Errno> {
    match kill(Pid::from_raw(-pid.as_raw()), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(errno),
    }
}

/// A status change observed for a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEvent {
    Stopped { jid: i32, pid: Pid, signal: i32 },
    Terminated { jid: i32, pid: Pid, signal: i32 },
    Exited { jid: i32, pid: Pid, status: i32 },
}

impl fmt::Display for ChildEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChildEvent::Stopped { jid, pid, signal } => {
                write!(f, "Job [{jid}] ({pid}) stopped by signal {signal}")
            }
            ChildEvent::Terminated { jid, pid, signal } => {
                write!(f, "Job [{jid}] ({pid}) terminated by signal {signal}")
            }
            ChildEvent::Exited { jid, pid, status } => {
                write!(f, "Job [{jid}] ({pid}) terminated okay (status {status})")
            }
        }
    }
}

/// Apply one wait status to the table.
///
/// Stopped jobs become `Stopped`; jobs that exited or were killed are
/// removed. Children the table never registered produce no event.
pub fn apply_status(jobs: &mut JobTable, status: WaitStatus) -> Option<ChildEvent> {
    match status {
        WaitStatus::Stopped(pid, signal) => {
            let jid = jobs.pid_to_jid(pid)?;
            jobs.set_state(pid, JobState::Stopped).ok()?;
            Some(ChildEvent::Stopped {
                jid,
                pid,
                signal: signal as i32,
            })
        }
        WaitStatus::Signaled(pid, signal, _) => {
            let jid = jobs.pid_to_jid(pid)?;
            jobs.remove(pid);
            Some(ChildEvent::Terminated {
                jid,
                pid,
                signal: signal as i32,
            })
        }
        WaitStatus::Exited(pid, status) => {
            let jid = jobs.pid_to_jid(pid)?;
            jobs.remove(pid);
            Some(ChildEvent::Exited { jid, pid, status })
        }
        _ => None,
    }
}

/// Reap every child with a pending status change, without blocking.
fn reap_children(jobs: &mut JobTable) {
    loop {
        let status = match waitpid(
            Pid::from_raw(-1),
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
        ) {
            Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) | Err(Errno::EINTR) => break,
            Ok(status) => status,
            Err(errno) => output::fatal_os("waitpid error", errno),
        };
        match apply_status(jobs, status) {
            Some(event @ ChildEvent::Exited { jid, pid, .. }) => {
                if verbose() {
                    sig_println!("sigchld_handler: Job [{jid}] ({pid}) deleted");
                    sig_println!("sigchld_handler: {event}");
                }
            }
            Some(event @ ChildEvent::Terminated { jid, pid, .. }) => {
                if verbose() {
                    sig_println!("sigchld_handler: Job [{jid}] ({pid}) deleted");
                }
                sig_println!("{event}");
            }
            Some(event) => sig_println!("{event}"),
            None => {}
        }
    }
}

extern "C" fn sigchld_handler(_sig: libc::c_int) {
    let _errno = SavedErrno::save();
    if verbose() {
        sig_println!("sigchld_handler: entering");
    }
    // SAFETY: installed with the job-control set in sa_mask.
    reap_children(unsafe { jobs_in_handler() });
    if verbose() {
        sig_println!("sigchld_handler: exiting");
    }
}

/// Forward `signal` to the foreground job's group, if there is one. The
/// resulting state change arrives later through SIGCHLD.
fn relay_to_foreground(signal: Signal, handler: &str, verb: &str) {
    if verbose() {
        sig_println!("{handler}: entering");
    }
    // SAFETY: installed with the job-control set in sa_mask.
    let jobs = unsafe { jobs_in_handler() };
    if let Some(pid) = jobs.foreground_pid() {
        if let Err(errno) = signal_group(pid, signal) {
            output::fatal_os("Kill error", errno);
        }
        if verbose() {
            let jid = jobs.pid_to_jid(pid).unwrap_or(0);
            sig_println!("{handler}: Job [{jid}] ({pid}) {verb}");
        }
    }
    if verbose() {
        sig_println!("{handler}: exiting");
    }
}

extern "C" fn sigint_handler(_sig: libc::c_int) {
    let _errno = SavedErrno::save();
    relay_to_foreground(Signal::SIGINT, "sigint_handler", "killed");
}

extern "C" fn sigtstp_handler(_sig: libc::c_int) {
    let _errno = SavedErrno::save();
    relay_to_foreground(Signal::SIGTSTP, "sigtstp_handler", "stopped");
}

extern "C" fn sigquit_handler(_sig: libc::c_int) {
    output::exit_with(1, format_args!("Terminating after receipt of SIGQUIT signal"));
}

/// Restores errno when a handler returns, so the interrupted code never
/// sees a value the handler's own syscalls left behind.
struct SavedErrno(libc::c_int);

impl SavedErrno {
    fn save() -> Self {
        // SAFETY: errno_location points at this thread's errno.
        SavedErrno(unsafe { *errno_location() })
    }
}

impl Drop for SavedErrno {
    fn drop(&mut self) {
        // SAFETY: as in save.
        unsafe { *errno_location() = self.0 }
    }
}

#[cfg(any(target_os = "linux", target_os = "emscripten", target_os = "redox"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(target_os = "android")]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno()
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__error()
}

#[cfg(any(target_os = "openbsd", target_os = "netbsd"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(pid: i32, state: JobState) -> JobTable {
        let mut t = JobTable::new();
        t.insert(Pid::from_raw(pid), state, "sleep 10").unwrap();
        t
    }

    #[test]
    fn stop_marks_job_stopped() {
        let mut t = table_with(500, JobState::Foreground);
        let pid = Pid::from_raw(500);
        let event = apply_status(&mut t, WaitStatus::Stopped(pid, Signal::SIGTSTP)).unwrap();
        assert_eq!(
            event,
            ChildEvent::Stopped {
                jid: 1,
                pid,
                signal: Signal::SIGTSTP as i32
            }
        );
        assert_eq!(t.find_by_pid(pid).unwrap().state, JobState::Stopped);
        assert_eq!(t.foreground_pid(), None);
        assert_eq!(
            event.to_string(),
            format!("Job [1] (500) stopped by signal {}", Signal::SIGTSTP as i32)
        );
    }

    #[test]
    fn kill_removes_job() {
        let mut t = table_with(501, JobState::Foreground);
        let pid = Pid::from_raw(501);
        let event =
            apply_status(&mut t, WaitStatus::Signaled(pid, Signal::SIGINT, false)).unwrap();
        assert_eq!(event.to_string(), "Job [1] (501) terminated by signal 2");
        assert!(t.is_empty());
        assert_eq!(t.next_jid(), 1);
    }

    #[test]
    fn normal_exit_removes_job() {
        let mut t = table_with(502, JobState::Background);
        let pid = Pid::from_raw(502);
        let event = apply_status(&mut t, WaitStatus::Exited(pid, 0)).unwrap();
        assert!(matches!(event, ChildEvent::Exited { jid: 1, status: 0, .. }));
        assert!(t.find_by_pid(pid).is_none());
    }

    #[test]
    fn untracked_children_are_ignored() {
        let mut t = table_with(503, JobState::Background);
        let stray = Pid::from_raw(9999);
        assert_eq!(apply_status(&mut t, WaitStatus::Exited(stray, 1)), None);
        assert_eq!(apply_status(&mut t, WaitStatus::Continued(stray)), None);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn signal_group_tolerates_missing_group() {
        // no process group has this id
        assert_eq!(signal_group(Pid::from_raw(999_999_998), Signal::SIGCONT), Ok(()));
    }

    #[test]
    fn block_masks_and_restores() {
        let before = SigSet::thread_get_mask().unwrap();
        {
            let _block = SignalBlock::job_control();
            let during = SigSet::thread_get_mask().unwrap();
            assert!(during.contains(Signal::SIGCHLD));
            assert!(during.contains(Signal::SIGINT));
            assert!(during.contains(Signal::SIGTSTP));
        }
        let after = SigSet::thread_get_mask().unwrap();
        assert_eq!(
            after.contains(Signal::SIGCHLD),
            before.contains(Signal::SIGCHLD)
        );
    }
}
