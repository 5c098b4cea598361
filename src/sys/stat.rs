use std::ffi::CStr;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};
use libc::{self, c_long, timespec};

use super::cvt_r;

fn to_timespec(time: Option<SystemTime>) -> timespec {
    match time {
        None => timespec { tv_sec: 0, tv_nsec: libc::UTIME_OMIT as c_long },
        Some(time) => match time.duration_since(UNIX_EPOCH) {
            Ok(d) => timespec { tv_sec: d.as_secs() as libc::time_t, tv_nsec: d.subsec_nanos() as c_long },
            // Before the epoch: negative seconds with a positive nanosecond part
            Err(e) => {
                let d = e.duration();
                let (secs, nanos) = match d.subsec_nanos() {
                    0 => (-(d.as_secs() as i64), 0),
                    n => (-(d.as_secs() as i64) - 1, 1_000_000_000 - n),
                };
                timespec { tv_sec: secs as libc::time_t, tv_nsec: nanos as c_long }
            }
        },
    }
}

/// Set access and modification times without following a trailing symlink.
///
/// A `None` leaves the corresponding timestamp unchanged.
pub fn set_times_nofollow(path: &CStr, atime: Option<SystemTime>, mtime: Option<SystemTime>) -> io::Result<()> {
    let times = [to_timespec(atime), to_timespec(mtime)];
    cvt_r(|| unsafe { libc::utimensat(libc::AT_FDCWD, path.as_ptr(), times.as_ptr(), libc::AT_SYMLINK_NOFOLLOW) })?;
    Ok(())
}

/// Change ownership without following a trailing symlink.
///
/// A `None` leaves the corresponding id unchanged.
pub fn lchown(path: &CStr, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    // (uid_t)-1 / (gid_t)-1 mean "don't change"
    let uid = uid.map(|u| u as libc::uid_t).unwrap_or(libc::uid_t::MAX);
    let gid = gid.map(|g| g as libc::gid_t).unwrap_or(libc::gid_t::MAX);
    cvt_r(|| unsafe { libc::lchown(path.as_ptr(), uid, gid) })?;
    Ok(())
}

pub fn chmod(path: &CStr, mode: libc::mode_t) -> io::Result<()> {
    cvt_r(|| unsafe { libc::chmod(path.as_ptr(), mode) })?;
    Ok(())
}
