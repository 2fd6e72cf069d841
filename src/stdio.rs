//! Standard-I/O bootstrap.
//!
//! A parent process is responsible for handing us fds 0, 1, 2 — but nothing
//! forces it to. If one of them is unbound, the next file this process opens
//! is assigned a stdio fd, and anything that writes to stdout or stderr then
//! scribbles over that file (say, the database). So before any output: check
//! each stdio fd and alias `/dev/null` over the ones that are missing.

use std::io;

/// Ensure fds 0, 1 and 2 are bound to something. Call first thing in main.
pub fn bind_stdio() -> io::Result<()> {
    let mut devnull = -1;

    for fd in 0..=2 {
        // SAFETY: fstat on a numeric fd; the stat buffer is plain old data.
        let mut sb = unsafe { std::mem::zeroed::<libc::stat>() };
        if unsafe { libc::fstat(fd, &mut sb) } == 0 {
            continue;
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EBADF) {
            return Err(err);
        }

        if devnull == -1 {
            devnull = unsafe { libc::open(c"/dev/null".as_ptr(), libc::O_RDWR) };
            if devnull == -1 {
                return Err(io::Error::last_os_error());
            }
        }

        // dup2(x, x) is a no-op, so devnull landing on `fd` is fine
        if unsafe { libc::dup2(devnull, fd) } == -1 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}
