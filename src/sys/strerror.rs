use std::ffi::CStr;
use libc::{self, c_char, c_int};

/// Look up the platform's message for an error number.
pub fn strerror(errno: c_int) -> String {
    let mut buf = [0 as c_char; 256];
    let rc = unsafe { libc::strerror_r(errno, buf.as_mut_ptr(), buf.len()) };
    if rc != 0 {
        return format!("Unknown error {}", errno);
    }
    unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy().into_owned()
}
