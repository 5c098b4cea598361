use std::io;
use libc::{self, size_t, c_void, off_t};
use std::os::unix::io::RawFd;

use super::cvt_r;

/// Positioned read that leaves the descriptor's file offset alone.
pub fn pread(fd: RawFd, buf: &mut [u8], offset: off_t) -> io::Result<usize> {
    let rc = cvt_r(|| unsafe { libc::pread(fd, buf.as_mut_ptr() as *mut c_void, buf.len() as size_t, offset) })?;
    Ok(rc as usize)
}
