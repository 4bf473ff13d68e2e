use std::ffi::CString;

use nix::errno::Errno;
use nix::unistd::{execv, fork, setpgid, ForkResult, Pid};

use crate::builtins::{try_builtin, BuiltinResult};
use crate::error::{fatal, LaunchError, ShellError};
use crate::job::{with_jobs_under, JobState};
use crate::parser::{parse, resolve_path};
use crate::signals::SignalBlock;

/// Evaluate one command line.
///
/// Builtins run here and now. Anything else is forked into its own process
/// group and registered as a job; a foreground job is waited for, a
/// background job is announced and left running.
pub fn dispatch(cmdline: &str) {
    let parsed = parse(cmdline);
    if parsed.argv.is_empty() {
        return;
    }
    if let BuiltinResult::Handled = try_builtin(&parsed.argv) {
        return;
    }
    let cmdline = cmdline.trim_end_matches(&['\n', '\r'][..]);
    launch(&parsed.argv, parsed.background, cmdline);
}

/// Convert `argv` for execv(2). A word with an interior NUL cannot be
/// passed to exec intact, so the whole command is refused.
pub fn exec_args(argv: &[String]) -> Result<Vec<CString>, LaunchError> {
    argv.iter()
        .map(|a| CString::new(a.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| LaunchError::NulByte {
            cmd: argv.first().cloned().unwrap_or_default(),
        })
}

fn launch(argv: &[String], background: bool, cmdline: &str) {
    // Resolve and convert before forking so the child only has to exec.
    let args = match exec_args(argv) {
        Ok(args) => args,
        Err(err) => {
            println!("{err}");
            return;
        }
    };
    let program = resolve_path(&argv[0]);

    // SIGCHLD stays blocked until the job is in the table; otherwise a
    // fast child could be reaped before it is registered.
    let block = SignalBlock::job_control();

    // SAFETY: the shell is single-threaded, so the child may run arbitrary
    // code before exec.
    let pid = match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(block);
            exec_child(&argv[0], program.as_deref(), &args)
        }
        Ok(ForkResult::Parent { child }) => {
            // Set the group from both sides so a signal relayed before the
            // child runs still reaches its group. EACCES means the child
            // already exec'd, ESRCH that it is already gone; either way the
            // child's own call settled it.
            match setpgid(child, child) {
                Ok(()) | Err(Errno::EACCES) | Err(Errno::ESRCH) => {}
                Err(errno) => tracing::debug!(pid = child.as_raw(), %errno, "setpgid failed"),
            }
            child
        }
        Err(errno) => fatal(&ShellError::os("Fork error", errno)),
    };

    let state = if background {
        JobState::Background
    } else {
        JobState::Foreground
    };
    let registered = with_jobs_under(&block, |jobs| jobs.insert(pid, state, cmdline));
    drop(block);

    let jid = match registered {
        Ok(jid) => jid,
        Err(err) => {
            println!("{err}");
            return;
        }
    };
    tracing::debug!(jid, pid = pid.as_raw(), cmdline, "Added job");

    if background {
        println!("[{jid}] ({pid}) {cmdline}");
    } else {
        wait_foreground(pid);
    }
}

/// Child side of the fork: new process group, then exec. Never returns.
fn exec_child(name: &str, program: Option<&std::ffi::CStr>, args: &[CString]) -> ! {
    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
    if let Some(program) = program {
        let _ = execv(program, args);
    }
    println!("{name}: Command not found.");
    std::process::exit(1);
}

/// Block until `pid` no longer holds the foreground.
///
/// Returns once no job is in the foreground or `pid` has stopped. The
/// SIGCHLD handler makes the actual transition; this side only sleeps in
/// sigsuspend(2) between checks.
pub fn wait_foreground(pid: Pid) {
    let block = SignalBlock::job_control();
    while with_jobs_under(&block, |jobs| {
        jobs.foreground_pid().is_some()
            && jobs
                .find_by_pid(pid)
                .is_some_and(|job| job.state != JobState::Stopped)
    }) {
        block.suspend();
    }
    drop(block);
    tracing::debug!(
        pid = pid.as_raw(),
        "waitfg: process is no longer the foreground process"
    );
}
