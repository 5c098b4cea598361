use std::io;
use libc::{self, size_t, c_void, off_t};
use std::os::unix::io::RawFd;

use super::cvt_r;

/// Positioned write that leaves the descriptor's file offset alone.
pub fn pwrite(fd: RawFd, buf: &[u8], offset: off_t) -> io::Result<usize> {
    let rc = cvt_r(|| unsafe { libc::pwrite(fd, buf.as_ptr() as *const c_void, buf.len() as size_t, offset) })?;
    Ok(rc as usize)
}
