use std::ffi::CStr;
use std::io;

#[allow(unused_imports)]
use super::{cvt_r, unsupported};

/// Set BSD file flags (see chflags(2)).
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn chflags(path: &CStr, flags: u32) -> io::Result<()> {
    cvt_r(|| unsafe { libc::chflags(path.as_ptr(), flags as _) })?;
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub fn chflags(_path: &CStr, _flags: u32) -> io::Result<()> {
    Err(unsupported())
}

/// Ask the volume holding `path` whether names are case sensitive.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn case_sensitive(path: &CStr) -> io::Result<bool> {
    const _PC_CASE_SENSITIVE: libc::c_int = 11;

    let rc = cvt_r(|| unsafe { libc::pathconf(path.as_ptr(), _PC_CASE_SENSITIVE) })?;
    Ok(rc != 0)
}

/// There's no portable way to query case sensitivity here.
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub fn case_sensitive(_path: &CStr) -> io::Result<bool> {
    Err(unsupported())
}
