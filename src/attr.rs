//! Filesystem attributes.
//!
//! Typed attribute sets exchanged with the host framework: what an item looks like
//! (`ItemAttributes`), what a volume looks like (`VolumeAttributes`), which attributes a caller
//! wants to change (`SetAttributes`) and option bits for extended attributes and preallocation.

use std::convert::TryFrom;
use std::os::raw::c_int;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use std::{error, fmt, fs, ops};

use crate::error::{Error, Result};
use crate::sys;


/// Error type returned when a `FileType` conversion fails.
#[derive(Debug)]
pub struct FileTypeTryFromError;

impl fmt::Display for FileTypeTryFromError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not convert unknown file type")
    }
}

impl error::Error for FileTypeTryFromError {}

impl From<FileTypeTryFromError> for Error {
    fn from(_: FileTypeTryFromError) -> Self {
        Error::new(libc::EIO)
    }
}


/// File type.
///
/// Determines the type of a file (e.g. wether it's a regular file or a
/// symlink).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FileType {
    /// Named pipe (FIFO).
    ///
    /// Also known as `S_IFIFO` in libc.
    NamedPipe,
    /// Character device.
    ///
    /// Also known as `S_IFCHR` in libc.
    CharDevice,
    /// Directory.
    ///
    /// Also known as `S_IFDIR` in libc.
    Directory,
    /// Block device.
    ///
    /// Also known as `S_IFBLK` in libc.
    BlockDevice,
    /// Regular file.
    ///
    /// Also known as `S_IFREG` in libc.
    RegularFile,
    /// Symbolic link.
    ///
    /// Also known as `S_IFLNK` in libc.
    Symlink,
    /// Unix domain socket.
    ///
    /// Also known as `S_IFSOCK` in libc.
    Socket,
}

impl TryFrom<fs::FileType> for FileType {
    type Error = FileTypeTryFromError;

    fn try_from(ft: fs::FileType) -> std::result::Result<Self, Self::Error> {
        if ft.is_fifo() {
            Ok(FileType::NamedPipe)
        } else if ft.is_char_device() {
            Ok(FileType::CharDevice)
        } else if ft.is_dir() {
            Ok(FileType::Directory)
        } else if ft.is_block_device() {
            Ok(FileType::BlockDevice)
        } else if ft.is_file() {
            Ok(FileType::RegularFile)
        } else if ft.is_symlink() {
            Ok(FileType::Symlink)
        } else if ft.is_socket() {
            Ok(FileType::Socket)
        } else {
            Err(FileTypeTryFromError)
        }
    }
}


/// Attributes of a file, directory or symlink.
///
/// Taken verbatim from the real filesystem. The link itself is described when the item is a
/// symlink; it is never followed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ItemAttributes {
    /// Device holding the item on the real filesystem.
    pub dev: u64,
    /// Inode number on the real filesystem.
    pub ino: u64,
    /// Size in bytes.
    pub size: u64,
    /// Size in 512-byte blocks.
    pub blocks: u64,
    /// Time of last access.
    pub atime: SystemTime,
    /// Time of last modification.
    pub mtime: SystemTime,
    /// Time of last status change.
    pub ctime: SystemTime,
    /// Time of creation, if the real filesystem records it.
    pub crtime: Option<SystemTime>,
    /// Type of the file (e.g. regular file, directory, pipe, etc).
    pub kind: FileType,
    /// Permission bits, including setuid/setgid/sticky.
    pub perm: u16,
    /// Number of hard links.
    pub nlink: u32,
    /// User id of file owner.
    pub uid: u32,
    /// Group id of file owner.
    pub gid: u32,
    /// Device id, for device files.
    pub rdev: u32,
    /// Preferred I/O block size.
    pub blksize: u32,
    /// BSD file flags (see chflags(2)), zero where the platform has none.
    pub flags: u32,
}

fn system_time(secs: i64, nsecs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs as u32)
    } else {
        UNIX_EPOCH - Duration::new(secs.unsigned_abs(), 0) + Duration::new(0, nsecs as u32)
    }
}

#[cfg(target_os = "macos")]
fn file_flags(m: &fs::Metadata) -> u32 {
    use std::os::macos::fs::MetadataExt as _;
    m.st_flags()
}

#[cfg(not(target_os = "macos"))]
fn file_flags(_m: &fs::Metadata) -> u32 {
    0
}

impl TryFrom<&fs::Metadata> for ItemAttributes {
    type Error = FileTypeTryFromError;

    fn try_from(m: &fs::Metadata) -> std::result::Result<Self, Self::Error> {
        Ok(ItemAttributes {
            dev: m.dev(),
            ino: m.ino(),
            size: m.size(),
            blocks: m.blocks(),
            atime: system_time(m.atime(), m.atime_nsec()),
            mtime: system_time(m.mtime(), m.mtime_nsec()),
            ctime: system_time(m.ctime(), m.ctime_nsec()),
            crtime: m.created().ok(),
            kind: FileType::try_from(m.file_type())?,
            perm: (m.mode() & 0o7777) as u16,
            nlink: m.nlink() as u32,
            uid: m.uid(),
            gid: m.gid(),
            rdev: m.rdev() as u32,
            blksize: m.blksize() as u32,
            flags: file_flags(m),
        })
    }
}


/// Attributes of the volume holding the root directory.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VolumeAttributes {
    /// Total data blocks, in units of `fragment_size`.
    pub blocks: u64,
    /// Free blocks.
    pub blocks_free: u64,
    /// Free blocks available to unprivileged users.
    pub blocks_available: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub files_free: u64,
    /// Preferred block size.
    pub block_size: u32,
    /// Fundamental block size.
    pub fragment_size: u32,
    /// Maximum length of a file name.
    pub name_max: u32,
    /// Whether creation and backup dates beyond the POSIX set are supported. Always true.
    pub supports_extended_dates: bool,
    /// Whether file names are case sensitive.
    pub supports_case_sensitive_names: bool,
}

impl VolumeAttributes {
    /// Size of the volume in bytes.
    pub fn size(&self) -> u64 {
        self.blocks.saturating_mul(u64::from(self.fragment_size))
    }

    /// Free space in bytes.
    pub fn free_size(&self) -> u64 {
        self.blocks_available.saturating_mul(u64::from(self.fragment_size))
    }
}

impl From<&libc::statvfs> for VolumeAttributes {
    #[allow(clippy::unnecessary_cast)]
    fn from(st: &libc::statvfs) -> Self {
        VolumeAttributes {
            blocks: st.f_blocks as u64,
            blocks_free: st.f_bfree as u64,
            blocks_available: st.f_bavail as u64,
            files: st.f_files as u64,
            files_free: st.f_ffree as u64,
            block_size: st.f_bsize as u32,
            fragment_size: st.f_frsize as u32,
            name_max: st.f_namemax as u32,
            supports_extended_dates: true,
            supports_case_sensitive_names: true,
        }
    }
}


/// Attributes a caller wants to set on an item, or to give a newly created item.
///
/// Every field is optional; `None` leaves the attribute alone. Validation happens once, at the
/// boundary, with `validate`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SetAttributes {
    /// Permission bits (`0o7777` at most).
    pub permissions: Option<u32>,
    /// New owner.
    pub uid: Option<u32>,
    /// New group.
    pub gid: Option<u32>,
    /// New length in bytes; the file is truncated or extended with zeros.
    pub size: Option<u64>,
    /// New access time.
    pub atime: Option<SystemTime>,
    /// New modification time.
    pub mtime: Option<SystemTime>,
    /// New BSD file flags (see chflags(2)).
    pub flags: Option<u32>,
}

impl SetAttributes {
    /// Attributes consisting of just a permission mode, as used for creating items.
    pub fn with_permissions(permissions: u32) -> Self {
        Self { permissions: Some(permissions), ..Self::default() }
    }

    /// Check that every present attribute has a value the real filesystem can take.
    ///
    /// Fails with `EINVAL` for permission bits outside `0o7777` or a size that doesn't fit
    /// into `off_t`.
    pub fn validate(&self) -> Result<()> {
        if let Some(perm) = self.permissions {
            if perm & !0o7777 != 0 {
                return Err(Error::invalid_argument());
            }
        }
        if let Some(size) = self.size {
            if size > i64::MAX as u64 {
                return Err(Error::invalid_argument());
            }
        }
        Ok(())
    }

    /// True if no attribute is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}


/// Options for setting and getting extended attributes.
///
/// Bit values are those of the host platform, so option words coming from the kernel can be
/// used as is.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct XattrOptions(c_int);

impl XattrOptions {
    /// Don't follow a trailing symlink.
    pub const NOFOLLOW: XattrOptions = XattrOptions(sys::XATTR_NOFOLLOW);
    /// Fail if the attribute already exists.
    pub const CREATE: XattrOptions = XattrOptions(sys::XATTR_CREATE);
    /// Fail if the attribute doesn't exist.
    pub const REPLACE: XattrOptions = XattrOptions(sys::XATTR_REPLACE);
    /// Bypass authorization checks (set by the kernel for some attributes).
    pub const NOSECURITY: XattrOptions = XattrOptions(sys::XATTR_NOSECURITY);
    /// Bypass default extended attribute handlers (set by the kernel for some attributes).
    pub const NODEFAULT: XattrOptions = XattrOptions(sys::XATTR_NODEFAULT);

    pub const fn empty() -> Self {
        XattrOptions(0)
    }

    pub const fn from_bits(bits: c_int) -> Self {
        XattrOptions(bits)
    }

    pub const fn bits(self) -> c_int {
        self.0
    }

    pub fn contains(self, other: XattrOptions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn remove(self, other: XattrOptions) -> Self {
        XattrOptions(self.0 & !other.0)
    }
}

impl ops::BitOr for XattrOptions {
    type Output = XattrOptions;

    fn bitor(self, rhs: XattrOptions) -> XattrOptions {
        XattrOptions(self.0 | rhs.0)
    }
}


/// Options of a space preallocation request.
///
/// Bits follow the `ALLOCATE*` constants of the macOS FUSE interface. `CONTIG` and `ALL` may
/// be combined; at most one of `FROM_PEOF` and `FROM_VOL` may be given. With neither, the
/// offset is an absolute file offset.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct PreallocateOptions(u32);

impl PreallocateOptions {
    /// Allocate contiguous space.
    pub const CONTIG: PreallocateOptions = PreallocateOptions(0x0000_0002);
    /// Allocate all requested space or none at all.
    pub const ALL: PreallocateOptions = PreallocateOptions(0x0000_0004);
    /// Offset counts from the physical end of the file.
    pub const FROM_PEOF: PreallocateOptions = PreallocateOptions(0x0000_0010);
    /// Offset is a volume offset.
    pub const FROM_VOL: PreallocateOptions = PreallocateOptions(0x0000_0020);

    const KNOWN: u32 = 0x0000_0036;

    pub const fn empty() -> Self {
        PreallocateOptions(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        PreallocateOptions(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: PreallocateOptions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Turn the options into a request for the system call layer.
    ///
    /// Fails with `EINVAL` on unknown bits, both position modes at once, or a negative range.
    pub(crate) fn to_request(self, offset: i64, length: i64) -> Result<sys::AllocateRequest> {
        if self.0 & !Self::KNOWN != 0 || offset < 0 || length < 0 {
            return Err(Error::invalid_argument());
        }
        let position = match (self.contains(Self::FROM_PEOF), self.contains(Self::FROM_VOL)) {
            (true, true) => return Err(Error::invalid_argument()),
            (true, false) => sys::AllocatePosition::EndOfFile,
            (false, true) => sys::AllocatePosition::Volume,
            (false, false) => sys::AllocatePosition::File,
        };
        Ok(sys::AllocateRequest {
            contiguous: self.contains(Self::CONTIG),
            all_or_nothing: self.contains(Self::ALL),
            position,
            offset,
            length,
        })
    }
}

impl ops::BitOr for PreallocateOptions {
    type Output = PreallocateOptions;

    fn bitor(self, rhs: PreallocateOptions) -> PreallocateOptions {
        PreallocateOptions(self.0 | rhs.0)
    }
}
