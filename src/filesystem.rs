//! Path-based filesystem interface.
//!
//! Interface between a host framework (which receives requests from the kernel) and a
//! filesystem implementation. Every request names its target by virtual path, an absolute,
//! already normalized path relative to the mount point.

use std::ffi::OsString;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};

use crate::attr::{ItemAttributes, PreallocateOptions, SetAttributes, VolumeAttributes, XattrOptions};
use crate::error::{Error, Result};
use crate::handle::Handle;


/// Path-based filesystem implementation trait.
///
/// Default implementations fail with `ENOSYS`, so a filesystem only needs to implement the
/// operations it supports. Methods take `&self`: the host framework may call them concurrently
/// from several threads, for different paths and different handles.
pub trait Filesystem: Send + Sync {
    /// Rename an item. Replaces `to` if it exists and the real filesystem allows it.
    fn move_item(&self, _from: &Path, _to: &Path) -> Result<()> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Remove an empty directory.
    fn remove_directory(&self, _path: &Path) -> Result<()> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Remove a file or symlink.
    fn remove_item(&self, _path: &Path) -> Result<()> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Create a single directory. Parents must exist.
    fn create_directory(&self, _path: &Path, _attrs: &SetAttributes) -> Result<()> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Create and open a file. `attrs` must carry permission bits.
    fn create_file(&self, _path: &Path, _attrs: &SetAttributes, _flags: c_int) -> Result<Handle> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Create a hard link `to` for the existing item `from`.
    fn link_item(&self, _from: &Path, _to: &Path) -> Result<()> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Create a symlink at `path` pointing to `destination`, stored literally.
    fn create_symbolic_link(&self, _path: &Path, _destination: &Path) -> Result<()> {
        Err(Error::new(libc::ENOSYS))
    }

    fn read_symbolic_link(&self, _path: &Path) -> Result<PathBuf> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Open an existing file.
    fn open_file(&self, _path: &Path, _flags: c_int) -> Result<Handle> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Release an open file.
    ///
    /// Never fails. Unknown handles are ignored.
    fn release_file(&self, _path: &Path, _fh: Handle) {}

    /// Read up to `buf.len()` bytes at `offset`. Returns 0 at or past end of file.
    fn read_file(&self, _path: &Path, _fh: Handle, _buf: &mut [u8], _offset: i64) -> Result<usize> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Write `data` at `offset`, returning the number of bytes written.
    fn write_file(&self, _path: &Path, _fh: Handle, _data: &[u8], _offset: i64) -> Result<usize> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Reserve space for an open file.
    ///
    /// `EOPNOTSUPP` means the platform can't honor the request and is not a hard failure.
    fn preallocate_file(
        &self,
        _path: &Path,
        _fh: Handle,
        _options: PreallocateOptions,
        _offset: i64,
        _length: i64,
    ) -> Result<()> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Atomically swap two files.
    fn exchange_data(&self, _path1: &Path, _path2: &Path) -> Result<()> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Names of all entries in a directory, in the order the real filesystem returns them.
    fn list_directory(&self, _path: &Path) -> Result<Vec<OsString>> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Attributes of an item. Symlinks are not followed.
    fn item_attributes(&self, _path: &Path) -> Result<ItemAttributes> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Attributes of the volume holding `path`.
    fn filesystem_attributes(&self, _path: &Path) -> Result<VolumeAttributes> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Change attributes of an item. Only attributes that are set are changed.
    fn set_attributes(&self, _attrs: &SetAttributes, _path: &Path) -> Result<()> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Names of all extended attributes of an item.
    fn list_extended_attributes(&self, _path: &Path) -> Result<Vec<String>> {
        Err(Error::new(libc::ENOSYS))
    }

    /// Value of an extended attribute, starting at `position`.
    fn get_extended_attribute(&self, _name: &str, _path: &Path, _position: u32) -> Result<Vec<u8>> {
        Err(Error::new(libc::ENOSYS))
    }

    fn set_extended_attribute(
        &self,
        _name: &str,
        _path: &Path,
        _value: &[u8],
        _position: u32,
        _options: XattrOptions,
    ) -> Result<()> {
        Err(Error::new(libc::ENOSYS))
    }

    fn remove_extended_attribute(&self, _name: &str, _path: &Path) -> Result<()> {
        Err(Error::new(libc::ENOSYS))
    }
}
