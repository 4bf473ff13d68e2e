use nix::errno::Errno;

/// Failures that end the shell process.
///
/// - `Os`: an OS primitive failed with something other than an expected,
///   benign code (fork, sigprocmask, waitpid, kill)
/// - `App`: an application-level failure with no errno attached
#[derive(thiserror::Error, Debug)]
pub enum ShellError {
    #[error("{context}: {}", .errno.desc())]
    Os { context: &'static str, errno: Errno },

    #[error("{0}")]
    App(String),
}

impl ShellError {
    pub fn os(context: &'static str, errno: Errno) -> Self {
        Self::Os { context, errno }
    }
}

/// Report a fatal error and exit with status 1.
///
/// Main flow only. Handler context goes through
/// [`crate::output::fatal_os`] instead.
pub fn fatal(err: &ShellError) -> ! {
    tracing::debug!(error = %err, "fatal shell error");
    println!("{err}");
    std::process::exit(1);
}

/// Job Table rejections.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTableError {
    #[error("Tried to create too many jobs")]
    TableFull,

    #[error("invalid process id {0}")]
    InvalidPid(i32),

    #[error("job ({0}) cannot enter the foreground while another job holds it")]
    ForegroundOccupied(i32),

    #[error("({0}): No such process")]
    NoSuchPid(i32),
}

/// User errors from the `bg` and `fg` builtins. Display texts are the
/// exact lines the shell prints.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum JobControlError {
    #[error("{cmd} command requires PID or %jobid argument")]
    MissingArgument { cmd: &'static str },

    #[error("{cmd}: argument must be a PID or %jobid")]
    BadArgument { cmd: &'static str },

    #[error("%{0}: No such job")]
    NoSuchJob(i32),

    #[error("({0}): No such process")]
    NoSuchProcess(i32),

    #[error(transparent)]
    Table(#[from] JobTableError),
}

/// Reasons a command line is refused before anything is forked.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("{cmd}: argument contains a NUL byte")]
    NulByte { cmd: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_control_messages_match_shell_output() {
        assert_eq!(
            JobControlError::MissingArgument { cmd: "bg" }.to_string(),
            "bg command requires PID or %jobid argument"
        );
        assert_eq!(
            JobControlError::BadArgument { cmd: "fg" }.to_string(),
            "fg: argument must be a PID or %jobid"
        );
        assert_eq!(JobControlError::NoSuchJob(99).to_string(), "%99: No such job");
        assert_eq!(
            JobControlError::NoSuchProcess(1234).to_string(),
            "(1234): No such process"
        );
    }

    #[test]
    fn table_full_message() {
        assert_eq!(
            JobTableError::TableFull.to_string(),
            "Tried to create too many jobs"
        );
    }

    #[test]
    fn nul_byte_message_names_the_command() {
        let err = LaunchError::NulByte {
            cmd: "/bin/echo".to_string(),
        };
        assert_eq!(err.to_string(), "/bin/echo: argument contains a NUL byte");
    }

    #[test]
    fn os_error_renders_context_and_description() {
        let err = ShellError::os("Fork error", Errno::EAGAIN);
        assert_eq!(err.to_string(), format!("Fork error: {}", Errno::EAGAIN.desc()));
    }
}
