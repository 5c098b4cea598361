use std::io;
use std::mem;
use std::ptr;
use libc::{self, c_int, sigset_t};

/// A set of signals that is blocked for normal delivery and collected with `sigwait` instead.
#[derive(Clone, Copy)]
pub struct SignalSet {
    set: sigset_t,
}

impl std::fmt::Debug for SignalSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalSet").finish()
    }
}

impl SignalSet {
    /// Block the given signals in the calling thread.
    ///
    /// Threads spawned afterwards inherit the mask, so calling this on the main thread before
    /// spawning anything routes these signals to whoever calls `wait`.
    pub fn block(signals: &[c_int]) -> io::Result<SignalSet> {
        let mut set = unsafe { mem::zeroed::<sigset_t>() };
        unsafe { libc::sigemptyset(&mut set) };
        for &sig in signals {
            if unsafe { libc::sigaddset(&mut set, sig) } < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        // pthread functions return the error number instead of setting errno
        match unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut()) } {
            0 => Ok(SignalSet { set }),
            err => Err(io::Error::from_raw_os_error(err)),
        }
    }

    /// Wait until one of the blocked signals is pending and return it.
    pub fn wait(&self) -> io::Result<c_int> {
        let mut sig: c_int = 0;
        match unsafe { libc::sigwait(&self.set, &mut sig) } {
            0 => Ok(sig),
            err => Err(io::Error::from_raw_os_error(err)),
        }
    }
}
