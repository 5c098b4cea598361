//! Loopback filesystem.
//!
//! Mirrors a directory of the real filesystem (the root) by forwarding every operation to the
//! real path below it. A virtual path maps to the real path by plain concatenation with the
//! root: no normalization, no symlink resolution. Keeping virtual paths clean is the host
//! framework's job.
//!
//! Failures are reported with the error number of the failing system call.

use log::{debug, warn};
use std::convert::TryFrom;
use std::ffi::{CString, OsStr, OsString};
use std::io;
use std::os::raw::c_int;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::fs;

use crate::attr::{ItemAttributes, PreallocateOptions, SetAttributes, VolumeAttributes, XattrOptions};
use crate::error::{Error, Result};
use crate::filesystem::Filesystem;
use crate::handle::{FileHandle, Handle, HandleTable};
use crate::sys;


/// How often a value that keeps growing between size query and fetch is queried again.
const XATTR_FETCH_ATTEMPTS: usize = 4;


/// Filesystem that mirrors a directory of the real filesystem.
#[derive(Debug)]
pub struct LoopbackFs {
    root: PathBuf,
    handles: HandleTable,
}

impl LoopbackFs {
    /// Create a loopback filesystem for the given root directory.
    ///
    /// The root is used as given. Callers that accept user input should canonicalize it first.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into(), handles: HandleTable::new() }
    }

    /// The directory being mirrored.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of currently open files.
    pub fn open_files(&self) -> usize {
        self.handles.len()
    }

    /// Map a virtual path to the real path below the root.
    ///
    /// Bytes are concatenated as is; `Path::join` would discard the root for absolute paths.
    pub fn real_path(&self, path: &Path) -> PathBuf {
        let root = self.root.as_os_str().as_bytes();
        let path = path.as_os_str().as_bytes();
        let mut real = Vec::with_capacity(root.len() + path.len());
        real.extend_from_slice(root);
        real.extend_from_slice(path);
        PathBuf::from(OsString::from_vec(real))
    }

    fn real_cpath(&self, path: &Path) -> Result<CString> {
        Ok(sys::cstr(&self.real_path(path))?)
    }

    fn open_handle(&self, path: &Path, flags: c_int, mode: libc::mode_t) -> Result<Handle> {
        let real = self.real_path(path);
        let fd = sys::open(&sys::cstr(&real)?, flags, mode)?;
        let fh = self.handles.insert(FileHandle::new(fd, real));
        debug!("open {:?} as fh {}, fd {}", path, fh, fd);
        Ok(fh)
    }
}

fn xattr_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| Error::invalid_argument())
}

/// Fetch a variable length value with the two-step protocol of the xattr calls.
///
/// `fetch` is called with an empty buffer to learn the size, then with a buffer of that size.
/// If the value grew in between (`ERANGE`), the size is queried again.
fn fetch_sized<F>(mut fetch: F) -> io::Result<Vec<u8>>
where
    F: FnMut(&mut [u8]) -> io::Result<usize>,
{
    let mut attempts = 0;
    loop {
        let size = fetch(&mut [])?;
        let mut buf = vec![0; size];
        let grew = match fetch(&mut buf) {
            Ok(len) if len <= buf.len() => {
                buf.truncate(len);
                return Ok(buf);
            }
            // An empty buffer asks for the size again, so a value that appeared answers with it
            Ok(_) => io::Error::from_raw_os_error(libc::ERANGE),
            Err(err) if err.raw_os_error() == Some(libc::ERANGE) => err,
            Err(err) => return Err(err),
        };
        attempts += 1;
        if attempts >= XATTR_FETCH_ATTEMPTS {
            return Err(grew);
        }
    }
}

/// Split a NUL delimited name list. Names that aren't valid UTF-8 are skipped.
fn split_names(list: &[u8]) -> Vec<String> {
    list.split(|&b| b == 0)
        .filter(|name| !name.is_empty())
        .filter_map(|name| match std::str::from_utf8(name) {
            Ok(name) => Some(name.to_owned()),
            Err(_) => {
                warn!("Skipping extended attribute with undecodable name {:?}", OsStr::from_bytes(name));
                None
            }
        })
        .collect()
}

impl Filesystem for LoopbackFs {
    fn move_item(&self, from: &Path, to: &Path) -> Result<()> {
        debug!("MOVE({:?}) to {:?}", from, to);
        sys::rename(&self.real_cpath(from)?, &self.real_cpath(to)?)?;
        Ok(())
    }

    fn remove_directory(&self, path: &Path) -> Result<()> {
        debug!("RMDIR({:?})", path);
        sys::rmdir(&self.real_cpath(path)?)?;
        Ok(())
    }

    fn remove_item(&self, path: &Path) -> Result<()> {
        debug!("REMOVE({:?})", path);
        fs::remove_file(self.real_path(path))?;
        Ok(())
    }

    fn create_directory(&self, path: &Path, attrs: &SetAttributes) -> Result<()> {
        debug!("MKDIR({:?}) mode {:?}", path, attrs.permissions.map(|m| format!("{:#05o}", m)));
        attrs.validate()?;
        let mut builder = fs::DirBuilder::new();
        if let Some(mode) = attrs.permissions {
            builder.mode(mode);
        }
        builder.create(self.real_path(path))?;
        Ok(())
    }

    fn create_file(&self, path: &Path, attrs: &SetAttributes, flags: c_int) -> Result<Handle> {
        debug!("CREATE({:?}) flags {:#x}, mode {:?}", path, flags, attrs.permissions.map(|m| format!("{:#05o}", m)));
        let mode = attrs.permissions.ok_or_else(Error::not_permitted)?;
        attrs.validate()?;
        self.open_handle(path, flags | libc::O_CREAT, mode as libc::mode_t)
    }

    fn link_item(&self, from: &Path, to: &Path) -> Result<()> {
        debug!("LINK({:?}) to {:?}", from, to);
        sys::link(&self.real_cpath(from)?, &self.real_cpath(to)?)?;
        Ok(())
    }

    fn create_symbolic_link(&self, path: &Path, destination: &Path) -> Result<()> {
        debug!("SYMLINK({:?}) to {:?}", path, destination);
        std::os::unix::fs::symlink(destination, self.real_path(path))?;
        Ok(())
    }

    fn read_symbolic_link(&self, path: &Path) -> Result<PathBuf> {
        debug!("READLINK({:?})", path);
        Ok(fs::read_link(self.real_path(path))?)
    }

    fn open_file(&self, path: &Path, flags: c_int) -> Result<Handle> {
        debug!("OPEN({:?}) flags {:#x}", path, flags);
        self.open_handle(path, flags & !libc::O_CREAT, 0)
    }

    fn release_file(&self, path: &Path, fh: Handle) {
        debug!("RELEASE({:?}) fh {}", path, fh);
        if !self.handles.remove(fh) {
            debug!("release of unknown fh {} ignored", fh);
        }
    }

    fn read_file(&self, path: &Path, fh: Handle, buf: &mut [u8], offset: i64) -> Result<usize> {
        debug!("READ({:?}) fh {}, offset {}, size {}", path, fh, offset, buf.len());
        let file = self.handles.get(fh)?;
        Ok(file.read_at(buf, offset)?)
    }

    fn write_file(&self, path: &Path, fh: Handle, data: &[u8], offset: i64) -> Result<usize> {
        debug!("WRITE({:?}) fh {}, offset {}, size {}", path, fh, offset, data.len());
        let file = self.handles.get(fh)?;
        Ok(file.write_at(data, offset)?)
    }

    fn preallocate_file(
        &self,
        path: &Path,
        fh: Handle,
        options: PreallocateOptions,
        offset: i64,
        length: i64,
    ) -> Result<()> {
        debug!("PREALLOCATE({:?}) fh {}, options {:#x}, offset {}, length {}", path, fh, options.bits(), offset, length);
        let file = self.handles.get(fh)?;
        let req = options.to_request(offset, length)?;
        file.preallocate(&req)?;
        Ok(())
    }

    fn exchange_data(&self, path1: &Path, path2: &Path) -> Result<()> {
        debug!("EXCHANGE({:?}) with {:?}", path1, path2);
        sys::exchange(&self.real_cpath(path1)?, &self.real_cpath(path2)?)?;
        Ok(())
    }

    fn list_directory(&self, path: &Path) -> Result<Vec<OsString>> {
        debug!("READDIR({:?})", path);
        let mut names = Vec::new();
        for entry in fs::read_dir(self.real_path(path))? {
            names.push(entry?.file_name());
        }
        Ok(names)
    }

    fn item_attributes(&self, path: &Path) -> Result<ItemAttributes> {
        debug!("GETATTR({:?})", path);
        let meta = fs::symlink_metadata(self.real_path(path))?;
        Ok(ItemAttributes::try_from(&meta)?)
    }

    fn filesystem_attributes(&self, path: &Path) -> Result<VolumeAttributes> {
        debug!("STATFS({:?})", path);
        let real = self.real_cpath(path)?;
        let mut attrs = VolumeAttributes::from(&sys::statvfs(&real)?);
        attrs.supports_case_sensitive_names = match sys::case_sensitive(&real) {
            Ok(sensitive) => sensitive,
            Err(err) => {
                debug!("case sensitivity query failed ({}), assuming case sensitive", err);
                true
            }
        };
        Ok(attrs)
    }

    fn set_attributes(&self, attrs: &SetAttributes, path: &Path) -> Result<()> {
        debug!("SETATTR({:?}) {:?}", path, attrs);
        attrs.validate()?;
        let real = self.real_cpath(path)?;
        if let Some(size) = attrs.size {
            sys::truncate(&real, size as libc::off_t)?;
        }
        if let Some(flags) = attrs.flags {
            sys::chflags(&real, flags)?;
        }
        if let Some(mode) = attrs.permissions {
            sys::chmod(&real, mode as libc::mode_t)?;
        }
        if attrs.uid.is_some() || attrs.gid.is_some() {
            sys::lchown(&real, attrs.uid, attrs.gid)?;
        }
        if attrs.atime.is_some() || attrs.mtime.is_some() {
            sys::set_times_nofollow(&real, attrs.atime, attrs.mtime)?;
        }
        Ok(())
    }

    fn list_extended_attributes(&self, path: &Path) -> Result<Vec<String>> {
        debug!("LISTXATTR({:?})", path);
        let real = self.real_cpath(path)?;
        let options = XattrOptions::NOFOLLOW.bits();
        let list = fetch_sized(|buf| sys::listxattr(&real, buf, options))?;
        Ok(split_names(&list))
    }

    fn get_extended_attribute(&self, name: &str, path: &Path, position: u32) -> Result<Vec<u8>> {
        debug!("GETXATTR({:?}) name {:?}, position {}", path, name, position);
        let real = self.real_cpath(path)?;
        let name = xattr_name(name)?;
        let options = XattrOptions::NOFOLLOW.bits();
        Ok(fetch_sized(|buf| sys::getxattr(&real, &name, buf, position, options))?)
    }

    fn set_extended_attribute(
        &self,
        name: &str,
        path: &Path,
        value: &[u8],
        position: u32,
        options: XattrOptions,
    ) -> Result<()> {
        debug!("SETXATTR({:?}) name {:?}, size {}, position {}, options {:#x}", path, name, value.len(), position, options.bits());
        let real = self.real_cpath(path)?;
        let name = xattr_name(name)?;
        // The kernel adds these for some attributes (Finder info) and the call rejects them
        let options = options.remove(XattrOptions::NOSECURITY | XattrOptions::NODEFAULT) | XattrOptions::NOFOLLOW;
        sys::setxattr(&real, &name, value, position, options.bits())?;
        Ok(())
    }

    fn remove_extended_attribute(&self, name: &str, path: &Path) -> Result<()> {
        debug!("REMOVEXATTR({:?}) name {:?}", path, name);
        let real = self.real_cpath(path)?;
        let name = xattr_name(name)?;
        sys::removexattr(&real, &name, XattrOptions::NOFOLLOW.bits())?;
        Ok(())
    }
}
