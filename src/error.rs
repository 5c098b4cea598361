//! Filesystem errors.
//!
//! Every operation of the loopback filesystem fails with a POSIX error number, exactly the way
//! the failing system call reported it. The host framework hands that number straight back to
//! the kernel request that caused it.

use std::io;
use std::os::raw::c_int;
use std::{error, fmt};

use crate::sys;


/// Result type of filesystem operations.
pub type Result<T> = std::result::Result<T, Error>;


/// A POSIX error, as reported by the real filesystem or raised by the translation layer.
///
/// The human readable message is taken from the platform's error string table (`strerror`).
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Error {
    errno: c_int,
}

impl Error {
    /// Create an error from an `errno` value as defined in the `libc` crate, e.g. `ENOENT`.
    pub fn new(errno: c_int) -> Self {
        Self { errno }
    }

    /// Capture the calling thread's current `errno`.
    pub fn last_os_error() -> Self {
        io::Error::last_os_error().into()
    }

    /// "Bad file descriptor", for handles that don't resolve to an open file.
    pub fn bad_descriptor() -> Self {
        Self::new(libc::EBADF)
    }

    /// "Invalid argument", for malformed input.
    pub fn invalid_argument() -> Self {
        Self::new(libc::EINVAL)
    }

    /// "Operation not permitted".
    pub fn not_permitted() -> Self {
        Self::new(libc::EPERM)
    }

    /// "Operation not supported", for primitives the host platform lacks.
    pub fn not_supported() -> Self {
        Self::new(libc::EOPNOTSUPP)
    }

    /// The POSIX error number.
    pub fn errno(&self) -> c_int {
        self.errno
    }

    /// The platform's description of the error number.
    pub fn message(&self) -> String {
        sys::strerror(self.errno)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("errno", &self.errno)
            .field("message", &self.message())
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (errno {})", self.message(), self.errno)
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    /// Keeps the raw OS error if there is one. Errors synthesized by the standard library
    /// without an OS error are mapped by kind.
    fn from(err: io::Error) -> Self {
        if let Some(errno) = err.raw_os_error() {
            return Self::new(errno);
        }
        let errno = match err.kind() {
            io::ErrorKind::NotFound => libc::ENOENT,
            io::ErrorKind::PermissionDenied => libc::EACCES,
            io::ErrorKind::AlreadyExists => libc::EEXIST,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => libc::EINVAL,
            io::ErrorKind::Interrupted => libc::EINTR,
            io::ErrorKind::WouldBlock => libc::EAGAIN,
            io::ErrorKind::Unsupported => libc::EOPNOTSUPP,
            _ => libc::EIO,
        };
        Self::new(errno)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        io::Error::from_raw_os_error(err.errno)
    }
}
