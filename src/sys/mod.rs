//! Raw system calls.
//!
//! Thin wrappers around `libc` that turn the C convention of returning `-1` and setting `errno`
//! into `io::Result`. Calls interrupted by a signal are restarted here, so nothing above this
//! module ever sees `EINTR`.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

mod exchange;
mod fcntl;
mod flags;
mod fs;
mod read;
mod signal;
mod stat;
mod strerror;
mod write;
mod xattr;

pub use self::exchange::*;
pub use self::fcntl::*;
pub use self::flags::*;
pub use self::fs::*;
pub use self::read::*;
pub use self::signal::*;
pub use self::stat::*;
pub use self::strerror::*;
pub use self::write::*;
pub use self::xattr::*;

/// Run a raw libc call, restarting it as long as it fails with `EINTR`.
///
/// Any negative return value is treated as failure and turned into the current `errno`.
pub(crate) fn cvt_r<T, F>(mut f: F) -> io::Result<T>
where
    T: Copy + Default + PartialOrd,
    F: FnMut() -> T,
{
    loop {
        let rc = f();
        if rc < T::default() {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
        return Ok(rc);
    }
}

/// Convert a path to a NUL terminated C string.
///
/// Paths with interior NUL bytes can't be passed to the kernel and fail with `EINVAL`.
pub fn cstr(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))
}

/// Error for primitives the host platform doesn't have.
pub(crate) fn unsupported() -> io::Error {
    io::Error::from_raw_os_error(libc::EOPNOTSUPP)
}
