//! Non-blocking I/O wrappers (grounded on `qthread_read`/`qthread_write`/
//! `io_wait` in `examples/original_source/hw1/qthread.c`).
//!
//! Each wrapper puts its file descriptor in non-blocking mode, attempts
//! the syscall, and — on `EAGAIN`/`EWOULDBLOCK` — parks the calling thread
//! on the scheduler's I/O-waiters queue until `poll(2)` reports the
//! descriptor ready, instead of blocking the whole process the way a
//! plain blocking syscall would. `poll` is used rather than the original's
//! `select` so descriptor numbers aren't bounded by `FD_SETSIZE`
//! (SPEC_FULL.md §4.1).

use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use super::runtime::Runtime;
use super::thread::IoWait;

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn would_block(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == libc::EAGAIN || code == libc::EWOULDBLOCK
    )
}

/// Read into `buf`, parking the calling QT thread (not the OS) while `fd`
/// has nothing available.
pub fn read(rt: &Arc<Runtime>, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    set_nonblocking(fd)?;
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if would_block(&err) {
            rt.wait_for_io(IoWait::Read(fd));
            continue;
        }
        return Err(err);
    }
}

/// Write `buf`, parking the calling QT thread while `fd` can't accept more.
pub fn write(rt: &Arc<Runtime>, fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    set_nonblocking(fd)?;
    loop {
        let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if would_block(&err) {
            rt.wait_for_io(IoWait::Write(fd));
            continue;
        }
        return Err(err);
    }
}

/// `recv(2)` with no flags; same readiness-wait behavior as [`read`].
pub fn recv(rt: &Arc<Runtime>, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    set_nonblocking(fd)?;
    loop {
        let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if would_block(&err) {
            rt.wait_for_io(IoWait::Read(fd));
            continue;
        }
        return Err(err);
    }
}

/// `send(2)` with no flags; same readiness-wait behavior as [`write`].
pub fn send(rt: &Arc<Runtime>, fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    set_nonblocking(fd)?;
    loop {
        let n = unsafe { libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), 0) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if would_block(&err) {
            rt.wait_for_io(IoWait::Write(fd));
            continue;
        }
        return Err(err);
    }
}

/// `accept(2)`; waits for readability the same way a blocking `read`
/// would (a pending connection makes the listening socket readable).
pub fn accept(rt: &Arc<Runtime>, fd: RawFd) -> io::Result<RawFd> {
    set_nonblocking(fd)?;
    loop {
        let n = unsafe { libc::accept(fd, std::ptr::null_mut(), std::ptr::null_mut()) };
        if n >= 0 {
            return Ok(n);
        }
        let err = io::Error::last_os_error();
        if would_block(&err) {
            rt.wait_for_io(IoWait::Read(fd));
            continue;
        }
        return Err(err);
    }
}
