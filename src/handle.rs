//! Open file handles.
//!
//! Opening a file hands out a numeric handle that refers to a real file descriptor. Handles are
//! unique for the lifetime of the filesystem and are never reused. Looking up a handle clones a
//! reference to it, so I/O runs without holding the table lock and a release racing with an
//! in-flight read can't close the descriptor underneath it.

use log::{debug, warn};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::sys;


/// Opaque identifier of an open file, as handed to the host framework.
pub type Handle = u64;


/// A real file descriptor together with the real path it was opened from.
///
/// The descriptor is closed when the last reference goes away.
#[derive(Debug)]
pub struct FileHandle {
    fd: RawFd,
    path: PathBuf,
}

impl FileHandle {
    pub(crate) fn new(fd: RawFd, path: PathBuf) -> Self {
        Self { fd, path }
    }

    /// Real path the descriptor was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read at an absolute offset. Returns 0 at or past end of file.
    pub fn read_at(&self, buf: &mut [u8], offset: i64) -> io::Result<usize> {
        sys::pread(self.fd, buf, offset as libc::off_t)
    }

    /// Write at an absolute offset. May write less than `buf`.
    pub fn write_at(&self, buf: &[u8], offset: i64) -> io::Result<usize> {
        sys::pwrite(self.fd, buf, offset as libc::off_t)
    }

    pub fn preallocate(&self, req: &sys::AllocateRequest) -> io::Result<()> {
        sys::preallocate(self.fd, req)
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        debug!("close fd {} ({})", self.fd, self.path.display());
        if let Err(err) = sys::close(self.fd) {
            warn!("Failed to close {}: {}", self.path.display(), err);
        }
    }
}


/// Table of open files, shared by all request threads.
#[derive(Debug)]
pub struct HandleTable {
    next: AtomicU64,
    files: RwLock<HashMap<Handle, Arc<FileHandle>>>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            // 0 is never handed out; some hosts use it for "no handle"
            next: AtomicU64::new(1),
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Take ownership of an open descriptor and return a fresh handle for it.
    pub fn insert(&self, file: FileHandle) -> Handle {
        let fh = self.next.fetch_add(1, Ordering::Relaxed);
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        files.insert(fh, Arc::new(file));
        fh
    }

    /// Look up an open file. Fails with `EBADF` if the handle is unknown or already released.
    pub fn get(&self, fh: Handle) -> Result<Arc<FileHandle>> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        files.get(&fh).cloned().ok_or_else(Error::bad_descriptor)
    }

    /// Forget a handle. Returns false if it was unknown, which callers treat as a no-op.
    ///
    /// The descriptor closes as soon as no in-flight operation holds it anymore.
    pub fn remove(&self, fh: Handle) -> bool {
        let removed = {
            let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
            files.remove(&fh)
        };
        removed.is_some()
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.files.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
