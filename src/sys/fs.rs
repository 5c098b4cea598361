use std::ffi::CStr;
use std::io;
use libc::{self, c_int, mode_t, off_t};
use std::os::unix::io::RawFd;

use super::cvt_r;

/// Open (and possibly create) a file, returning the raw descriptor.
///
/// The descriptor is always opened close-on-exec.
pub fn open(path: &CStr, flags: c_int, mode: mode_t) -> io::Result<RawFd> {
    cvt_r(|| unsafe { libc::open(path.as_ptr(), flags | libc::O_CLOEXEC, mode as libc::c_uint) })
}

pub fn close(fd: RawFd) -> io::Result<()> {
    // Retrying close after EINTR may close an unrelated, freshly reused descriptor.
    if unsafe { libc::close(fd) } < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

pub fn rename(from: &CStr, to: &CStr) -> io::Result<()> {
    cvt_r(|| unsafe { libc::rename(from.as_ptr(), to.as_ptr()) })?;
    Ok(())
}

/// Remove an empty directory. Never recurses.
pub fn rmdir(path: &CStr) -> io::Result<()> {
    cvt_r(|| unsafe { libc::rmdir(path.as_ptr()) })?;
    Ok(())
}

/// Create a hard link `to` referring to the same inode as `from`.
pub fn link(from: &CStr, to: &CStr) -> io::Result<()> {
    cvt_r(|| unsafe { libc::link(from.as_ptr(), to.as_ptr()) })?;
    Ok(())
}

pub fn truncate(path: &CStr, length: off_t) -> io::Result<()> {
    cvt_r(|| unsafe { libc::truncate(path.as_ptr(), length) })?;
    Ok(())
}

pub fn fstat(fd: RawFd) -> io::Result<libc::stat> {
    let mut st = unsafe { std::mem::zeroed::<libc::stat>() };
    cvt_r(|| unsafe { libc::fstat(fd, &mut st) })?;
    Ok(st)
}

pub fn statvfs(path: &CStr) -> io::Result<libc::statvfs> {
    let mut st = unsafe { std::mem::zeroed::<libc::statvfs>() };
    cvt_r(|| unsafe { libc::statvfs(path.as_ptr(), &mut st) })?;
    Ok(st)
}
