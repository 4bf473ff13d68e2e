use clap::Parser;
use tracing_subscriber::EnvFilter;

pub const PROMPT: &str = "tsh> ";

/// A tiny shell with job control.
#[derive(Parser, Debug)]
#[command(name = "tsh", version, about)]
pub struct Cli {
    /// Print additional diagnostic information.
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not emit a command prompt (handy for automated testing).
    #[arg(short = 'p', long = "no-prompt")]
    pub no_prompt: bool,
}

impl Cli {
    pub fn emit_prompt(&self) -> bool {
        !self.no_prompt
    }

    /// `RUST_LOG` wins; otherwise warnings only, or debug for this crate
    /// under `--verbose`.
    pub fn log_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if self.verbose { "tsh=debug" } else { "warn" })
        })
    }
}

/// Install the global tracing subscriber. Output goes to stderr, which
/// the shell points at stdout at startup.
pub fn init_logging(cli: &Cli) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(cli.log_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
