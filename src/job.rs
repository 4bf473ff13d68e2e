use std::cell::UnsafeCell;
use std::fmt;

use nix::unistd::Pid;

use crate::error::JobTableError;
use crate::signals::SignalBlock;

/// Maximum jobs tracked at any point in time.
pub const MAX_JOBS: usize = 16;
/// Bytes of command line kept per job.
pub const MAX_LINE: usize = 1024;

/// Run state of a tracked job.
///
/// Transitions:
///     Foreground -> Stopped     : ctrl-z
///     Stopped    -> Foreground  : fg
///     Stopped    -> Background  : bg
///     Background -> Foreground  : fg
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Foreground,
    Background,
    Stopped,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobState::Foreground => "Foreground",
            JobState::Background => "Running",
            JobState::Stopped => "Stopped",
        })
    }
}

/// One child process and its bookkeeping.
///
/// The command line is stored inline so clearing a slot from handler
/// context never frees heap memory.
#[derive(Clone, Copy)]
pub struct Job {
    pub pid: Pid,
    pub jid: i32,
    pub state: JobState,
    cmdline: [u8; MAX_LINE],
    cmdline_len: usize,
}

impl Job {
    fn new(pid: Pid, jid: i32, state: JobState, cmdline: &str) -> Self {
        let mut end = cmdline.len().min(MAX_LINE);
        while !cmdline.is_char_boundary(end) {
            end -= 1;
        }
        let mut buf = [0u8; MAX_LINE];
        buf[..end].copy_from_slice(&cmdline.as_bytes()[..end]);
        Job {
            pid,
            jid,
            state,
            cmdline: buf,
            cmdline_len: end,
        }
    }

    pub fn command_line(&self) -> &str {
        std::str::from_utf8(&self.cmdline[..self.cmdline_len]).unwrap_or("")
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("pid", &self.pid)
            .field("jid", &self.jid)
            .field("state", &self.state)
            .field("cmdline", &self.command_line())
            .finish()
    }
}

/// Fixed-capacity table of active jobs. A slot is occupied iff it holds
/// `Some`, and every stored pid is positive.
pub struct JobTable {
    slots: [Option<Job>; MAX_JOBS],
    next_jid: i32,
}

impl JobTable {
    pub const fn new() -> Self {
        JobTable {
            slots: [None; MAX_JOBS],
            next_jid: 1,
        }
    }

    /// Register a job in the first free slot and return its job id.
    pub fn insert(
        &mut self,
        pid: Pid,
        state: JobState,
        cmdline: &str,
    ) -> Result<i32, JobTableError> {
        if pid.as_raw() < 1 {
            return Err(JobTableError::InvalidPid(pid.as_raw()));
        }
        if state == JobState::Foreground && self.foreground_pid().is_some() {
            return Err(JobTableError::ForegroundOccupied(pid.as_raw()));
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(JobTableError::TableFull)?;
        let jid = self.allocate_jid();
        self.slots[slot] = Some(Job::new(pid, jid, state, cmdline));
        Ok(jid)
    }

    /// Clear the slot holding `pid`. The id counter drops back to one past
    /// the largest id still in use.
    pub fn remove(&mut self, pid: Pid) -> bool {
        if pid.as_raw() < 1 {
            return false;
        }
        match self.slots.iter_mut().find(|s| matches!(s, Some(j) if j.pid == pid)) {
            Some(slot) => {
                *slot = None;
                self.next_jid = self.max_jid() + 1;
                true
            }
            None => false,
        }
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        if pid.as_raw() < 1 {
            return None;
        }
        self.iter().find(|j| j.pid == pid)
    }

    pub fn find_by_jid(&self, jid: i32) -> Option<&Job> {
        if jid < 1 {
            return None;
        }
        self.iter().find(|j| j.jid == jid)
    }

    pub fn foreground_pid(&self) -> Option<Pid> {
        self.iter()
            .find(|j| j.state == JobState::Foreground)
            .map(|j| j.pid)
    }

    pub fn pid_to_jid(&self, pid: Pid) -> Option<i32> {
        self.find_by_pid(pid).map(|j| j.jid)
    }

    /// Move the job holding `pid` to `state`.
    pub fn set_state(&mut self, pid: Pid, state: JobState) -> Result<(), JobTableError> {
        if state == JobState::Foreground {
            if let Some(fg) = self.foreground_pid() {
                if fg != pid {
                    return Err(JobTableError::ForegroundOccupied(pid.as_raw()));
                }
            }
        }
        let job = self
            .slots
            .iter_mut()
            .flatten()
            .find(|j| pid.as_raw() > 0 && j.pid == pid)
            .ok_or(JobTableError::NoSuchPid(pid.as_raw()))?;
        job.state = state;
        Ok(())
    }

    /// Occupied slots, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().flatten()
    }

    /// Snapshots of every job, in slot order.
    pub fn list(&self) -> Vec<Job> {
        self.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// The id the next insert starts its search from.
    pub fn next_jid(&self) -> i32 {
        self.next_jid
    }

    fn max_jid(&self) -> i32 {
        self.iter().map(|j| j.jid).max().unwrap_or(0)
    }

    // Ids stay within 1..=MAX_JOBS: a counter past capacity (possible after
    // `remove` sets it to max+1) restarts at 1. Ids still held by active
    // jobs are skipped, so a long-lived low id is never handed out twice.
    fn allocate_jid(&mut self) -> i32 {
        let cap = MAX_JOBS as i32;
        let mut jid = self.next_jid;
        if !(1..=cap).contains(&jid) {
            jid = 1;
        }
        while self.find_by_jid(jid).is_some() {
            jid = if jid >= cap { 1 } else { jid + 1 };
        }
        self.next_jid = if jid + 1 > cap { 1 } else { jid + 1 };
        jid
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

struct SharedJobs(UnsafeCell<JobTable>);

// SAFETY: the process has one main thread; handler context is serialized
// against it through the signal mask (see `with_jobs`).
unsafe impl Sync for SharedJobs {}

static JOBS: SharedJobs = SharedJobs(UnsafeCell::new(JobTable::new()));

/// Run `f` against the process-wide table with the job-control signals
/// blocked, so no handler can observe or mutate the table meanwhile.
pub fn with_jobs<R>(f: impl FnOnce(&mut JobTable) -> R) -> R {
    let block = SignalBlock::job_control();
    with_jobs_under(&block, f)
}

/// Like [`with_jobs`], for callers that already hold a block spanning more
/// than one table access.
///
/// Must not be nested inside another table access.
pub fn with_jobs_under<R>(_block: &SignalBlock, f: impl FnOnce(&mut JobTable) -> R) -> R {
    // SAFETY: every handler that touches JOBS is masked while `_block`
    // lives, and the main flow never holds two table borrows at once.
    f(unsafe { &mut *JOBS.0.get() })
}

/// Table access for signal handlers.
///
/// # Safety
/// Only call from a handler installed with the job-control signals in its
/// `sa_mask`. The main flow cannot be inside `with_jobs` at that point,
/// because those signals are blocked there.
pub(crate) unsafe fn jobs_in_handler() -> &'static mut JobTable {
    &mut *JOBS.0.get()
}
