use std::ffi::CStr;
use std::io;

#[allow(unused_imports)]
use super::{cvt_r, unsupported};

#[cfg(target_os = "macos")]
extern "C" {
    fn exchangedata(path1: *const libc::c_char, path2: *const libc::c_char, options: libc::c_uint) -> libc::c_int;
}

/// Atomically swap two files in place.
#[cfg(target_os = "macos")]
pub fn exchange(path1: &CStr, path2: &CStr) -> io::Result<()> {
    cvt_r(|| unsafe { exchangedata(path1.as_ptr(), path2.as_ptr(), 0) })?;
    Ok(())
}

/// Atomically swap two files in place.
///
/// Linux has no `exchangedata`, but `renameat2` with `RENAME_EXCHANGE` swaps both directory
/// entries in one step, which gives callers the same view of both paths.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn exchange(path1: &CStr, path2: &CStr) -> io::Result<()> {
    const RENAME_EXCHANGE: libc::c_uint = 1 << 1;

    let rc = cvt_r(|| unsafe {
        libc::syscall(
            libc::SYS_renameat2,
            libc::AT_FDCWD,
            path1.as_ptr(),
            libc::AT_FDCWD,
            path2.as_ptr(),
            RENAME_EXCHANGE,
        )
    });
    match rc {
        Ok(_) => Ok(()),
        // Kernel too old for renameat2
        Err(ref err) if err.raw_os_error() == Some(libc::ENOSYS) => Err(unsupported()),
        Err(err) => Err(err),
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "android")))]
pub fn exchange(_path1: &CStr, _path2: &CStr) -> io::Result<()> {
    Err(unsupported())
}
