use std::io;
use libc::{self, off_t};
use std::os::unix::io::RawFd;

#[allow(unused_imports)]
use super::{cvt_r, unsupported};

/// Reference point of a preallocation request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AllocatePosition {
    /// Offset is an absolute file offset.
    File,
    /// Offset counts from the physical end of the file.
    EndOfFile,
    /// Offset is a volume offset.
    Volume,
}

/// A single space reservation request for an open file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AllocateRequest {
    /// Require the reserved space to be contiguous.
    pub contiguous: bool,
    /// Reserve everything or nothing.
    pub all_or_nothing: bool,
    pub position: AllocatePosition,
    pub offset: off_t,
    pub length: off_t,
}

#[cfg(target_os = "macos")]
pub fn preallocate(fd: RawFd, req: &AllocateRequest) -> io::Result<()> {
    let mut fstore = unsafe { std::mem::zeroed::<libc::fstore_t>() };
    if req.contiguous {
        fstore.fst_flags |= libc::F_ALLOCATECONTIG as libc::c_uint;
    }
    if req.all_or_nothing {
        fstore.fst_flags |= libc::F_ALLOCATEALL as libc::c_uint;
    }
    fstore.fst_posmode = match req.position {
        AllocatePosition::File => 0,
        AllocatePosition::EndOfFile => libc::F_PEOFPOSMODE as libc::c_int,
        AllocatePosition::Volume => libc::F_VOLPOSMODE as libc::c_int,
    };
    fstore.fst_offset = req.offset;
    fstore.fst_length = req.length;
    cvt_r(|| unsafe { libc::fcntl(fd, libc::F_PREALLOCATE, &mut fstore as *mut libc::fstore_t) })?;
    Ok(())
}

// fallocate(2) always reserves all or nothing. It can neither promise contiguous extents nor
// address the volume directly.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn preallocate(fd: RawFd, req: &AllocateRequest) -> io::Result<()> {
    if req.contiguous {
        return Err(unsupported());
    }
    let offset = match req.position {
        AllocatePosition::File => req.offset,
        AllocatePosition::EndOfFile => super::fstat(fd)?
            .st_size
            .checked_add(req.offset)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EFBIG))?,
        AllocatePosition::Volume => return Err(unsupported()),
    };
    cvt_r(|| unsafe { libc::fallocate(fd, 0, offset, req.length) })?;
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "android")))]
pub fn preallocate(_fd: RawFd, _req: &AllocateRequest) -> io::Result<()> {
    Err(unsupported())
}
