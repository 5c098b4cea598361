use std::ffi::CStr;
use std::io;
use std::ptr;
use libc::{self, c_int, c_void, size_t};

#[allow(unused_imports)]
use super::{cvt_r, unsupported};

/// Split a buffer into pointer and length, using NULL for a zero-length size query.
#[allow(dead_code)]
fn buf_parts(buf: &mut [u8]) -> (*mut c_void, size_t) {
    if buf.is_empty() {
        (ptr::null_mut(), 0)
    } else {
        (buf.as_mut_ptr() as *mut c_void, buf.len() as size_t)
    }
}

#[cfg(target_os = "macos")]
mod imp {
    use super::*;

    pub const XATTR_NOFOLLOW: c_int = libc::XATTR_NOFOLLOW;
    pub const XATTR_CREATE: c_int = libc::XATTR_CREATE;
    pub const XATTR_REPLACE: c_int = libc::XATTR_REPLACE;
    pub const XATTR_NOSECURITY: c_int = 0x0008;
    pub const XATTR_NODEFAULT: c_int = 0x0010;

    pub fn listxattr(path: &CStr, buf: &mut [u8], options: c_int) -> io::Result<usize> {
        let (data, len) = buf_parts(buf);
        let rc = cvt_r(|| unsafe { libc::listxattr(path.as_ptr(), data as *mut libc::c_char, len, options) })?;
        Ok(rc as usize)
    }

    pub fn getxattr(path: &CStr, name: &CStr, buf: &mut [u8], position: u32, options: c_int) -> io::Result<usize> {
        let (data, len) = buf_parts(buf);
        let rc = cvt_r(|| unsafe { libc::getxattr(path.as_ptr(), name.as_ptr(), data, len, position, options) })?;
        Ok(rc as usize)
    }

    pub fn setxattr(path: &CStr, name: &CStr, value: &[u8], position: u32, options: c_int) -> io::Result<()> {
        cvt_r(|| unsafe {
            libc::setxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_ptr() as *const c_void,
                value.len() as size_t,
                position,
                options,
            )
        })?;
        Ok(())
    }

    pub fn removexattr(path: &CStr, name: &CStr, options: c_int) -> io::Result<()> {
        cvt_r(|| unsafe { libc::removexattr(path.as_ptr(), name.as_ptr(), options) })?;
        Ok(())
    }
}

// Linux has no options argument. The flags it does know (create/replace) share libc's values;
// the others are private bits that select the l*xattr variants or are dropped before the call.
#[cfg(any(target_os = "linux", target_os = "android"))]
mod imp {
    use super::*;

    pub const XATTR_CREATE: c_int = libc::XATTR_CREATE;
    pub const XATTR_REPLACE: c_int = libc::XATTR_REPLACE;
    pub const XATTR_NOFOLLOW: c_int = 0x0100;
    pub const XATTR_NOSECURITY: c_int = 0x0200;
    pub const XATTR_NODEFAULT: c_int = 0x0400;

    // Positions address resource forks, which Linux doesn't have
    fn check_position(position: u32) -> io::Result<()> {
        if position != 0 {
            Err(io::Error::from_raw_os_error(libc::EINVAL))
        } else {
            Ok(())
        }
    }

    pub fn listxattr(path: &CStr, buf: &mut [u8], options: c_int) -> io::Result<usize> {
        let (data, len) = buf_parts(buf);
        let rc = cvt_r(|| unsafe {
            if options & XATTR_NOFOLLOW != 0 {
                libc::llistxattr(path.as_ptr(), data as *mut libc::c_char, len)
            } else {
                libc::listxattr(path.as_ptr(), data as *mut libc::c_char, len)
            }
        })?;
        Ok(rc as usize)
    }

    pub fn getxattr(path: &CStr, name: &CStr, buf: &mut [u8], position: u32, options: c_int) -> io::Result<usize> {
        check_position(position)?;
        let (data, len) = buf_parts(buf);
        let rc = cvt_r(|| unsafe {
            if options & XATTR_NOFOLLOW != 0 {
                libc::lgetxattr(path.as_ptr(), name.as_ptr(), data, len)
            } else {
                libc::getxattr(path.as_ptr(), name.as_ptr(), data, len)
            }
        })?;
        Ok(rc as usize)
    }

    pub fn setxattr(path: &CStr, name: &CStr, value: &[u8], position: u32, options: c_int) -> io::Result<()> {
        check_position(position)?;
        let flags = options & (XATTR_CREATE | XATTR_REPLACE);
        cvt_r(|| unsafe {
            if options & XATTR_NOFOLLOW != 0 {
                libc::lsetxattr(path.as_ptr(), name.as_ptr(), value.as_ptr() as *const c_void, value.len() as size_t, flags)
            } else {
                libc::setxattr(path.as_ptr(), name.as_ptr(), value.as_ptr() as *const c_void, value.len() as size_t, flags)
            }
        })?;
        Ok(())
    }

    pub fn removexattr(path: &CStr, name: &CStr, options: c_int) -> io::Result<()> {
        cvt_r(|| unsafe {
            if options & XATTR_NOFOLLOW != 0 {
                libc::lremovexattr(path.as_ptr(), name.as_ptr())
            } else {
                libc::removexattr(path.as_ptr(), name.as_ptr())
            }
        })?;
        Ok(())
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "android")))]
mod imp {
    use super::*;

    pub const XATTR_CREATE: c_int = 0x0002;
    pub const XATTR_REPLACE: c_int = 0x0004;
    pub const XATTR_NOFOLLOW: c_int = 0x0001;
    pub const XATTR_NOSECURITY: c_int = 0x0008;
    pub const XATTR_NODEFAULT: c_int = 0x0010;

    pub fn listxattr(_path: &CStr, _buf: &mut [u8], _options: c_int) -> io::Result<usize> {
        Err(unsupported())
    }

    pub fn getxattr(_path: &CStr, _name: &CStr, _buf: &mut [u8], _position: u32, _options: c_int) -> io::Result<usize> {
        Err(unsupported())
    }

    pub fn setxattr(_path: &CStr, _name: &CStr, _value: &[u8], _position: u32, _options: c_int) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn removexattr(_path: &CStr, _name: &CStr, _options: c_int) -> io::Result<()> {
        Err(unsupported())
    }
}

pub use self::imp::*;
