//! Output usable from signal-handler context.
//!
//! `println!` takes the stdout lock and may allocate, neither of which is
//! allowed while a handler has interrupted the main flow. Lines are
//! formatted into a fixed stack buffer with `core::fmt` and handed to
//! write(2) directly.

use std::fmt::{self, Write};

use nix::errno::Errno;

/// Longest line a handler can emit, newline included.
pub const LINE_MAX: usize = 256;

/// Fixed-capacity line buffer. Text past the capacity is dropped; the
/// trailing newline always fits.
pub struct LineBuf {
    buf: [u8; LINE_MAX],
    len: usize,
}

impl LineBuf {
    pub const fn new() -> Self {
        Self {
            buf: [0; LINE_MAX],
            len: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn finish_line(&mut self) {
        let end = self.len.min(LINE_MAX - 1);
        self.buf[end] = b'\n';
        self.len = end + 1;
    }
}

impl Default for LineBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // one byte stays reserved for the newline
        let room = (LINE_MAX - 1).saturating_sub(self.len);
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

/// Format one line and write it to stdout without locking or allocating.
pub fn write_line(args: fmt::Arguments<'_>) {
    let mut line = LineBuf::new();
    let _ = line.write_fmt(args);
    line.finish_line();
    write_all(libc::STDOUT_FILENO, line.as_bytes());
}

fn write_all(fd: libc::c_int, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        // SAFETY: the pointer and length describe a live slice.
        let n = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        if n < 0 {
            if Errno::last() == Errno::EINTR {
                continue;
            }
            return;
        }
        bytes = &bytes[n as usize..];
    }
}

/// `println!` for handler context.
#[macro_export]
macro_rules! sig_println {
    ($($arg:tt)*) => {
        $crate::output::write_line(format_args!($($arg)*))
    };
}

/// Fatal OS error raised from handler context: same text as
/// [`crate::error::fatal`], but ends the process with _exit(2).
pub fn fatal_os(context: &str, errno: Errno) -> ! {
    write_line(format_args!("{}: {}", context, errno.desc()));
    // SAFETY: _exit is async-signal-safe and never returns.
    unsafe { libc::_exit(1) }
}

/// Print a message and end the process with _exit(2) and `status`.
pub fn exit_with(status: i32, args: fmt::Arguments<'_>) -> ! {
    write_line(args);
    // SAFETY: see fatal_os.
    unsafe { libc::_exit(status) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_job_report_line() {
        let mut line = LineBuf::new();
        write!(line, "Job [{}] ({}) stopped by signal {}", 2, 4711, 20).unwrap();
        line.finish_line();
        assert_eq!(line.as_bytes(), b"Job [2] (4711) stopped by signal 20\n");
    }

    #[test]
    fn overlong_text_is_cut_but_keeps_newline() {
        let mut line = LineBuf::new();
        let long = "x".repeat(LINE_MAX * 2);
        line.write_str(&long).unwrap();
        line.finish_line();
        let bytes = line.as_bytes();
        assert_eq!(bytes.len(), LINE_MAX);
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert!(bytes[..LINE_MAX - 1].iter().all(|&b| b == b'x'));
    }

    #[test]
    fn empty_line_is_just_newline() {
        let mut line = LineBuf::new();
        line.finish_line();
        assert_eq!(line.as_bytes(), b"\n");
    }
}
