use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::error::{fatal, JobControlError, ShellError};
use crate::executor::wait_foreground;
use crate::job::{with_jobs, Job, JobState, JobTable};
use crate::parser::JobRef;
use crate::signals::signal_group;

pub enum BuiltinResult {
    Handled,
    NotHandled,
}

/// Run `tokens` as a builtin if it names one. Builtins never fork.
pub fn try_builtin(tokens: &[String]) -> BuiltinResult {
    let Some(cmd) = tokens.first() else {
        return BuiltinResult::NotHandled;
    };
    match cmd.as_str() {
        "quit" => builtin_quit(),
        "jobs" => {
            builtin_jobs();
            BuiltinResult::Handled
        }
        "bg" | "fg" => {
            if let Err(err) = do_bgfg(tokens) {
                println!("{err}");
            }
            BuiltinResult::Handled
        }
        _ => BuiltinResult::NotHandled,
    }
}

/// Leave immediately. Jobs still running are neither waited for nor
/// signalled.
fn builtin_quit() -> ! {
    tracing::debug!("quit");
    std::process::exit(0);
}

fn builtin_jobs() {
    let listing = with_jobs(|jobs| jobs_listing(jobs));
    for line in listing {
        println!("{line}");
    }
}

/// One `[jid] (pid) State cmdline` line per job, in slot order.
pub fn jobs_listing(jobs: &JobTable) -> Vec<String> {
    jobs.iter()
        .map(|job| {
            format!(
                "[{}] ({}) {} {}",
                job.jid,
                job.pid,
                job.state,
                job.command_line()
            )
        })
        .collect()
}

/// Find the job a `bg`/`fg` argument refers to.
pub fn resolve(jobs: &JobTable, target: JobRef) -> Result<&Job, JobControlError> {
    match target {
        JobRef::ByJobId(jid) => jobs.find_by_jid(jid).ok_or(JobControlError::NoSuchJob(jid)),
        JobRef::ByProcessId(pid) => jobs
            .find_by_pid(pid)
            .ok_or(JobControlError::NoSuchProcess(pid.as_raw())),
    }
}

/// `bg <job>` / `fg <job>`: move the job to the background or foreground
/// and send its group SIGCONT. `fg` then waits for it.
pub fn do_bgfg(argv: &[String]) -> Result<(), JobControlError> {
    let cmd = match argv.first().map(String::as_str) {
        Some("bg") => "bg",
        _ => "fg",
    };
    let arg = argv
        .get(1)
        .ok_or(JobControlError::MissingArgument { cmd })?;
    let target = JobRef::parse(arg).ok_or(JobControlError::BadArgument { cmd })?;
    let state = if cmd == "bg" {
        JobState::Background
    } else {
        JobState::Foreground
    };

    let (jid, pid, cmdline) = with_jobs(|jobs| -> Result<(i32, Pid, String), JobControlError> {
        let job = resolve(jobs, target)?;
        let (jid, pid, cmdline) = (job.jid, job.pid, job.command_line().to_string());
        jobs.set_state(pid, state)?;
        if let Err(errno) = signal_group(pid, Signal::SIGCONT) {
            fatal(&ShellError::os("Kill error", errno));
        }
        Ok((jid, pid, cmdline))
    })?;
    tracing::debug!(cmd, jid, pid = pid.as_raw(), "job continued");

    if state == JobState::Background {
        println!("[{jid}] ({pid}) {cmdline}");
    } else {
        wait_foreground(pid);
    }
    Ok(())
}
