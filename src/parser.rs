use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::{env, fs};

use nix::unistd::Pid;

/// A command line split into arguments.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedLine {
    pub argv: Vec<String>,
    /// The line ended in an `&` argument, which has been removed.
    pub background: bool,
}

/// Split a command line into arguments.
///
/// Arguments are separated by whitespace. An argument that starts with a
/// single quote runs to the next single quote and may contain spaces; if
/// that quote is never closed the rest of the line is dropped.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('\'') {
            let Some(end) = quoted.find('\'') else {
                break;
            };
            args.push(quoted[..end].to_string());
            rest = quoted[end + 1..].trim_start();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            args.push(rest[..end].to_string());
            rest = rest[end..].trim_start();
        }
    }
    args
}

/// Tokenize a line and pull off the background marker: a final argument
/// beginning with `&`.
pub fn parse(line: &str) -> ParsedLine {
    let mut argv = tokenize(line);
    let background = argv.last().is_some_and(|a| a.starts_with('&'));
    if background {
        argv.pop();
    }
    ParsedLine { argv, background }
}

/// Target of a `bg`/`fg` command: `%N` names a job id, a bare number a
/// process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRef {
    ByJobId(i32),
    ByProcessId(Pid),
}

impl JobRef {
    /// `None` unless the argument is a non-zero integer, optionally
    /// `%`-prefixed.
    pub fn parse(arg: &str) -> Option<JobRef> {
        let (digits, by_jid) = match arg.strip_prefix('%') {
            Some(rest) => (rest, true),
            None => (arg, false),
        };
        let n: i32 = digits.parse().ok().filter(|&n| n != 0)?;
        Some(if by_jid {
            JobRef::ByJobId(n)
        } else {
            JobRef::ByProcessId(Pid::from_raw(n))
        })
    }
}

/// Resolve a program name to the path handed to execv(2).
///
/// Names containing `/` are used as given; otherwise each `PATH` entry is
/// tried for an executable regular file. Falls back to the bare name so
/// the exec fails and the child reports it.
pub fn resolve_path(program: &str) -> Option<CString> {
    if program.contains('/') {
        return CString::new(program).ok();
    }
    if let Ok(path) = env::var("PATH") {
        for dir in path.split(':').filter(|d| !d.is_empty()) {
            let full = Path::new(dir).join(program);
            if is_executable(&full) {
                return CString::new(full.as_os_str().as_bytes()).ok();
            }
        }
    }
    CString::new(program).ok()
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
