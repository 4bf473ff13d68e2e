use std::io::{self, Write};

use clap::Parser;

use tsh::cli::{init_logging, Cli, PROMPT};
use tsh::error::{fatal, ShellError};
use tsh::executor::dispatch;
use tsh::signals;

fn main() {
    let cli = Cli::parse();

    // Merge stderr into stdout so a driver reading one pipe sees everything.
    // SAFETY: both descriptors are the process's standard streams.
    unsafe {
        libc::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO);
    }
    init_logging(&cli);
    signals::set_verbose(cli.verbose);
    if let Err(err) = signals::install() {
        fatal(&err);
    }

    let mut line = String::new();
    loop {
        if cli.emit_prompt() {
            create_prompt();
        }

        line.clear();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                let _ = io::stdout().flush();
                std::process::exit(0);
            }
            Ok(_) => dispatch(&line),
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                println!("input is not valid UTF-8");
            }
            Err(_) => fatal(&ShellError::App("fgets error".to_string())),
        }
        let _ = io::stdout().flush();
    }
}

fn create_prompt() {
    print!("{PROMPT}");
    if io::stdout().flush().is_err() {
        fatal(&ShellError::App("stdout flush error".to_string()));
    }
}
