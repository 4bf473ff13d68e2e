//! tsh: a tiny shell with job control.
//!
//! | module       | role                                                        |
//! |--------------|-------------------------------------------------------------|
//! | [`parser`]   | command-line tokenizing, `bg`/`fg` job references            |
//! | [`job`]      | the fixed-capacity job table and its process-wide instance   |
//! | [`executor`] | dispatch, fork/exec into a new process group, foreground wait |
//! | [`builtins`] | `quit`, `jobs`, `bg`, `fg`                                   |
//! | [`signals`]  | signal-mask critical sections, SIGCHLD reaping, ctrl-c/ctrl-z relay |
//! | [`output`]   | line output that is safe from signal handlers                |
//! | [`error`]    | error types and fatal reporting                              |
//! | [`cli`]      | flags and logging setup                                      |

pub mod builtins;
pub mod cli;
pub mod error;
pub mod executor;
pub mod job;
pub mod output;
pub mod parser;
pub mod signals;
