//! FUSE host binding.
//!
//! Serves a path-based `Filesystem` through the kernel's FUSE interface, using the `fuser`
//! crate. The kernel addresses items by inode number, so the adapter keeps a table of the
//! virtual paths it has handed out inode numbers for.

use crossbeam_channel::{self as channel, Receiver};
use fuser::{
    FileAttr, MountOption, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, SessionUnmounter, TimeOrNow,
};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::attr::{FileType, ItemAttributes, PreallocateOptions, SetAttributes, XattrOptions};
use crate::error::{Error, Result};
use crate::filesystem::Filesystem;
use crate::session::{MountHandle, MountOptions, Mounter};


/// How long the kernel may cache attributes and entries.
const TTL: Duration = Duration::from_secs(1);

/// Inode number of the root directory.
const ROOT_INO: u64 = 1;

// renameat2(2) flags as passed through by the kernel
const RENAME_NOREPLACE: u32 = 1 << 0;
const RENAME_EXCHANGE: u32 = 1 << 1;


impl From<FileType> for fuser::FileType {
    fn from(kind: FileType) -> Self {
        match kind {
            FileType::NamedPipe => fuser::FileType::NamedPipe,
            FileType::CharDevice => fuser::FileType::CharDevice,
            FileType::Directory => fuser::FileType::Directory,
            FileType::BlockDevice => fuser::FileType::BlockDevice,
            FileType::RegularFile => fuser::FileType::RegularFile,
            FileType::Symlink => fuser::FileType::Symlink,
            FileType::Socket => fuser::FileType::Socket,
        }
    }
}

fn file_attr(ino: u64, attrs: &ItemAttributes) -> FileAttr {
    FileAttr {
        ino,
        size: attrs.size,
        blocks: attrs.blocks,
        atime: attrs.atime,
        mtime: attrs.mtime,
        ctime: attrs.ctime,
        crtime: attrs.crtime.unwrap_or(UNIX_EPOCH),
        kind: attrs.kind.into(),
        perm: attrs.perm,
        nlink: attrs.nlink,
        uid: attrs.uid,
        gid: attrs.gid,
        rdev: attrs.rdev,
        blksize: attrs.blksize,
        flags: attrs.flags,
    }
}

fn system_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(time) => time,
        TimeOrNow::Now => SystemTime::now(),
    }
}

fn is_write_open(flags: i32) -> bool {
    flags & libc::O_ACCMODE != libc::O_RDONLY || flags & libc::O_TRUNC != 0
}


/// Identity of an item on the real filesystem.
type NodeKey = (u64, u64);

fn node_key(attrs: &ItemAttributes) -> NodeKey {
    (attrs.dev, attrs.ino)
}

#[derive(Debug)]
struct Node {
    /// Last known virtual path. `None` once the name is gone (unlinked or replaced).
    path: Option<PathBuf>,
    key: Option<NodeKey>,
    /// Lookups the kernel holds on this inode.
    lookups: u64,
}

/// Inode numbers handed to the kernel.
///
/// An inode number stands for one real item, identified by device and inode, so hard links
/// share it. Numbers live until the kernel forgets all lookups of them, even when the item's
/// name is gone in the meantime.
#[derive(Debug)]
struct InodeTable {
    nodes: HashMap<u64, Node>,
    keys: HashMap<NodeKey, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_INO, Node { path: Some(PathBuf::from("/")), key: None, lookups: 1 });
        Self { nodes, keys: HashMap::new(), next: ROOT_INO + 1 }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Current virtual path of an inode. `ENOENT` if unknown or its name is gone.
    fn path(&self, ino: u64) -> Result<PathBuf> {
        self.nodes.get(&ino).and_then(|node| node.path.clone()).ok_or_else(|| Error::new(libc::ENOENT))
    }

    fn child(&self, parent: u64, name: &OsStr) -> Result<PathBuf> {
        Ok(self.path(parent)?.join(name))
    }

    /// Inode number already handed out for a real item, if any.
    fn known(&self, key: NodeKey) -> Option<u64> {
        self.keys.get(&key).copied()
    }

    /// Record a lookup of the item at `path`, returning its inode number.
    fn lookup(&mut self, path: &Path, key: NodeKey) -> u64 {
        if path == Path::new("/") {
            if let Some(root) = self.nodes.get_mut(&ROOT_INO) {
                root.key = Some(key);
            }
            self.keys.insert(key, ROOT_INO);
            return ROOT_INO;
        }
        if let Some(ino) = self.known(key) {
            if let Some(node) = self.nodes.get_mut(&ino) {
                // A detached node whose inode number was reused by the real filesystem is a
                // different item
                if node.path.is_some() {
                    node.path = Some(path.to_owned());
                    node.lookups += 1;
                    return ino;
                }
            }
        }
        let ino = self.next;
        self.next += 1;
        self.nodes.insert(ino, Node { path: Some(path.to_owned()), key: Some(key), lookups: 1 });
        self.keys.insert(key, ino);
        ino
    }

    /// Drop `nlookup` lookups. The inode number is released once none are left.
    fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }
        let gone = match self.nodes.get_mut(&ino) {
            Some(node) => {
                node.lookups = node.lookups.saturating_sub(nlookup);
                node.lookups == 0
            }
            None => false,
        };
        if gone {
            if let Some(Node { key: Some(key), .. }) = self.nodes.remove(&ino) {
                if self.keys.get(&key) == Some(&ino) {
                    self.keys.remove(&key);
                }
            }
        }
    }

    /// The name at `path` (and everything below it) is gone.
    fn detach(&mut self, path: &Path) {
        for (&ino, node) in self.nodes.iter_mut() {
            if ino != ROOT_INO && node.path.as_ref().map_or(false, |p| p.starts_with(path)) {
                node.path = None;
            }
        }
    }

    fn rebase(path: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
        match path.strip_prefix(from) {
            Ok(rest) if rest.as_os_str().is_empty() => Some(to.to_owned()),
            Ok(rest) => Some(to.join(rest)),
            Err(_) => None,
        }
    }

    fn remap<M: Fn(&Path) -> Option<PathBuf>>(&mut self, map: M) {
        for node in self.nodes.values_mut() {
            if let Some(new) = node.path.as_deref().and_then(|p| map(p)) {
                node.path = Some(new);
            }
        }
    }

    /// Move a path and everything below it. Whatever was at the destination loses its name.
    fn rename(&mut self, from: &Path, to: &Path) {
        if from == to {
            return;
        }
        self.detach(to);
        self.remap(|p| Self::rebase(p, from, to));
    }

    /// Swap two paths (and everything below them).
    fn exchange(&mut self, a: &Path, b: &Path) {
        self.remap(|p| Self::rebase(p, a, b).or_else(|| Self::rebase(p, b, a)));
    }
}

/// A directory listing, captured when the directory is opened.
type Listing = Vec<(u64, fuser::FileType, OsString)>;

/// Adapter that serves a path-based `Filesystem` to the FUSE kernel driver.
#[derive(Debug)]
pub struct FuseAdapter<F: Filesystem> {
    fs: F,
    read_only: bool,
    inodes: InodeTable,
    dirs: HashMap<u64, Listing>,
    next_dh: u64,
}

impl<F: Filesystem> FuseAdapter<F> {
    pub fn new(fs: F, read_only: bool) -> Self {
        Self { fs, read_only, inodes: InodeTable::new(), dirs: HashMap::new(), next_dh: 1 }
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            Err(Error::new(libc::EROFS))
        } else {
            Ok(())
        }
    }

    /// Attributes for an entry reply. The kernel holds one more lookup on the inode afterwards.
    fn entry(&mut self, path: &Path) -> Result<FileAttr> {
        let attrs = self.fs.item_attributes(path)?;
        let ino = self.inodes.lookup(path, node_key(&attrs));
        Ok(file_attr(ino, &attrs))
    }

    fn attr(&mut self, ino: u64) -> Result<FileAttr> {
        let path = self.inodes.path(ino)?;
        let attrs = self.fs.item_attributes(&path)?;
        Ok(file_attr(ino, &attrs))
    }

    fn do_lookup(&mut self, parent: u64, name: &OsStr) -> Result<FileAttr> {
        let path = self.inodes.child(parent, name)?;
        self.entry(&path)
    }

    fn do_forget(&mut self, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
        debug!("FORGET({}) {} lookups, {} inodes in use", ino, nlookup, self.inodes.len());
    }

    #[allow(clippy::too_many_arguments)]
    fn do_setattr(
        &mut self,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        flags: Option<u32>,
    ) -> Result<FileAttr> {
        self.check_writable()?;
        let path = self.inodes.path(ino)?;
        let attrs = SetAttributes {
            permissions: mode.map(|m| m & 0o7777),
            uid,
            gid,
            size,
            atime: atime.map(system_time),
            mtime: mtime.map(system_time),
            flags,
        };
        if !attrs.is_empty() {
            self.fs.set_attributes(&attrs, &path)?;
        }
        self.attr(ino)
    }

    fn do_mkdir(&mut self, parent: u64, name: &OsStr, mode: u32) -> Result<FileAttr> {
        self.check_writable()?;
        let path = self.inodes.child(parent, name)?;
        self.fs.create_directory(&path, &SetAttributes::with_permissions(mode & 0o7777))?;
        self.entry(&path)
    }

    fn do_remove(&mut self, parent: u64, name: &OsStr, dir: bool) -> Result<()> {
        self.check_writable()?;
        let path = self.inodes.child(parent, name)?;
        if dir {
            self.fs.remove_directory(&path)?;
        } else {
            self.fs.remove_item(&path)?;
        }
        // Open handles keep working; the inode number lives on until forgotten
        self.inodes.detach(&path);
        Ok(())
    }

    fn do_symlink(&mut self, parent: u64, name: &OsStr, target: &Path) -> Result<FileAttr> {
        self.check_writable()?;
        let path = self.inodes.child(parent, name)?;
        self.fs.create_symbolic_link(&path, target)?;
        self.entry(&path)
    }

    fn do_rename(&mut self, parent: u64, name: &OsStr, newparent: u64, newname: &OsStr, flags: u32) -> Result<()> {
        self.check_writable()?;
        let from = self.inodes.child(parent, name)?;
        let to = self.inodes.child(newparent, newname)?;
        match flags {
            0 => {}
            RENAME_EXCHANGE => {
                self.fs.exchange_data(&from, &to)?;
                self.inodes.exchange(&from, &to);
                return Ok(());
            }
            RENAME_NOREPLACE => {
                if self.fs.item_attributes(&to).is_ok() {
                    return Err(Error::new(libc::EEXIST));
                }
            }
            _ => return Err(Error::invalid_argument()),
        }
        self.fs.move_item(&from, &to)?;
        self.inodes.rename(&from, &to);
        Ok(())
    }

    fn do_link(&mut self, ino: u64, newparent: u64, newname: &OsStr) -> Result<FileAttr> {
        self.check_writable()?;
        let from = self.inodes.path(ino)?;
        let to = self.inodes.child(newparent, newname)?;
        self.fs.link_item(&from, &to)?;
        self.entry(&to)
    }

    fn do_open(&mut self, ino: u64, flags: i32) -> Result<u64> {
        if is_write_open(flags) {
            self.check_writable()?;
        }
        let path = self.inodes.path(ino)?;
        self.fs.open_file(&path, flags)
    }

    fn do_create(&mut self, parent: u64, name: &OsStr, mode: u32, flags: i32) -> Result<(FileAttr, u64)> {
        self.check_writable()?;
        let path = self.inodes.child(parent, name)?;
        let fh = self.fs.create_file(&path, &SetAttributes::with_permissions(mode & 0o7777), flags)?;
        match self.entry(&path) {
            Ok(attr) => Ok((attr, fh)),
            Err(err) => {
                self.fs.release_file(&path, fh);
                Err(err)
            }
        }
    }

    fn do_opendir(&mut self, ino: u64) -> Result<u64> {
        let path = self.inodes.path(ino)?;
        // Entries the kernel never looked up get the real inode number
        let parent = match path.parent() {
            Some(parent) if parent == Path::new("/") => ROOT_INO,
            Some(parent) => match self.fs.item_attributes(parent) {
                Ok(attrs) => self.inodes.known(node_key(&attrs)).unwrap_or(attrs.ino),
                Err(_) => ROOT_INO,
            },
            None => ROOT_INO,
        };
        let mut listing: Listing = vec![
            (ino, fuser::FileType::Directory, OsString::from(".")),
            (parent, fuser::FileType::Directory, OsString::from("..")),
        ];
        for name in self.fs.list_directory(&path)? {
            let child = path.join(&name);
            match self.fs.item_attributes(&child) {
                Ok(attrs) => {
                    let ino = self.inodes.known(node_key(&attrs)).unwrap_or(attrs.ino);
                    listing.push((ino, attrs.kind.into(), name))
                }
                // Removed since it was listed
                Err(err) => debug!("Skipping {:?} in listing: {}", child, err),
            }
        }
        let dh = self.next_dh;
        self.next_dh += 1;
        self.dirs.insert(dh, listing);
        Ok(dh)
    }

    /// Path of an open item, for logging only. I/O goes through the handle.
    fn handle_path(&self, ino: u64) -> PathBuf {
        self.inodes.path(ino).unwrap_or_default()
    }

    fn do_read(&mut self, ino: u64, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>> {
        let path = self.handle_path(ino);
        let mut buf = vec![0; size as usize];
        let len = read_full(&self.fs, &path, fh, &mut buf, offset)?;
        buf.truncate(len);
        Ok(buf)
    }

    fn do_write(&mut self, ino: u64, fh: u64, offset: i64, data: &[u8]) -> Result<u32> {
        self.check_writable()?;
        let path = self.handle_path(ino);
        let len = write_full(&self.fs, &path, fh, data, offset)?;
        Ok(len as u32)
    }

    fn do_fallocate(&mut self, ino: u64, fh: u64, offset: i64, length: i64, mode: i32) -> Result<()> {
        self.check_writable()?;
        // Hole punching and friends have no counterpart
        if mode != 0 {
            return Err(Error::not_supported());
        }
        let path = self.handle_path(ino);
        self.fs.preallocate_file(&path, fh, PreallocateOptions::empty(), offset, length)
    }

    fn xattr_name(name: &OsStr) -> Result<&str> {
        name.to_str().ok_or_else(Error::invalid_argument)
    }

    fn do_setxattr(&mut self, ino: u64, name: &OsStr, value: &[u8], flags: i32, position: u32) -> Result<()> {
        self.check_writable()?;
        let path = self.inodes.path(ino)?;
        let name = Self::xattr_name(name)?;
        self.fs.set_extended_attribute(name, &path, value, position, XattrOptions::from_bits(flags))
    }

    fn do_getxattr(&mut self, ino: u64, name: &OsStr) -> Result<Vec<u8>> {
        let path = self.inodes.path(ino)?;
        let name = Self::xattr_name(name)?;
        self.fs.get_extended_attribute(name, &path, 0)
    }

    fn do_listxattr(&mut self, ino: u64) -> Result<Vec<u8>> {
        let path = self.inodes.path(ino)?;
        let mut list = Vec::new();
        for name in self.fs.list_extended_attributes(&path)? {
            list.extend_from_slice(name.as_bytes());
            list.push(0);
        }
        Ok(list)
    }

    fn do_removexattr(&mut self, ino: u64, name: &OsStr) -> Result<()> {
        self.check_writable()?;
        let path = self.inodes.path(ino)?;
        let name = Self::xattr_name(name)?;
        self.fs.remove_extended_attribute(name, &path)
    }
}

/// Read until `buf` is full or end of file is reached.
fn read_full<F: Filesystem>(fs: &F, path: &Path, fh: u64, buf: &mut [u8], offset: i64) -> Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match fs.read_file(path, fh, &mut buf[done..], offset + done as i64)? {
            0 => break,
            n => done += n,
        }
    }
    Ok(done)
}

/// Write all of `data`; FUSE treats short writes as errors.
fn write_full<F: Filesystem>(fs: &F, path: &Path, fh: u64, data: &[u8], offset: i64) -> Result<usize> {
    let mut done = 0;
    while done < data.len() {
        match fs.write_file(path, fh, &data[done..], offset + done as i64)? {
            0 => return Err(Error::new(libc::EIO)),
            n => done += n,
        }
    }
    Ok(done)
}

/// Answer the kernel's xattr size protocol from a fully fetched value.
fn reply_xattr(reply: ReplyXattr, size: u32, value: Result<Vec<u8>>) {
    match value {
        Ok(value) if size == 0 => reply.size(value.len() as u32),
        Ok(value) if value.len() <= size as usize => reply.data(&value),
        Ok(_) => reply.error(libc::ERANGE),
        Err(err) => reply.error(err.errno()),
    }
}

impl<F: Filesystem> fuser::Filesystem for FuseAdapter<F> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut fuser::KernelConfig) -> std::result::Result<(), libc::c_int> {
        info!("Filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        info!("Filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.do_lookup(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.do_forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.attr(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.do_setattr(ino, mode, uid, gid, size, atime, mtime, flags) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        use std::os::unix::ffi::OsStrExt;

        match self.inodes.path(ino).and_then(|path| self.fs.read_symbolic_link(&path)) {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
        match self.do_mkdir(parent, name, mode) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.do_remove(parent, name, false) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.do_remove(parent, name, true) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn symlink(&mut self, _req: &Request<'_>, parent: u64, link_name: &OsStr, target: &Path, reply: ReplyEntry) {
        match self.do_symlink(parent, link_name, target) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        match self.do_rename(parent, name, newparent, newname, flags) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn link(&mut self, _req: &Request<'_>, ino: u64, newparent: u64, newname: &OsStr, reply: ReplyEntry) {
        match self.do_link(ino, newparent, newname) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.do_open(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.do_read(ino, fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.do_write(ino, fh, offset, data) {
            Ok(len) => reply.written(len),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let path = self.handle_path(ino);
        self.fs.release_file(&path, fh);
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.do_opendir(ino) {
            Ok(dh) => reply.opened(dh, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let listing = match self.dirs.get(&fh) {
            Some(listing) => listing,
            None => return reply.error(libc::EBADF),
        };
        for (i, (ino, kind, name)) in listing.iter().enumerate().skip(offset as usize) {
            // true means the reply buffer is full
            if reply.add(*ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.dirs.remove(&fh);
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let path = self.inodes.path(ino).unwrap_or_else(|_| PathBuf::from("/"));
        match self.fs.filesystem_attributes(&path) {
            Ok(vol) => reply.statfs(
                vol.blocks,
                vol.blocks_free,
                vol.blocks_available,
                vol.files,
                vol.files_free,
                vol.block_size,
                vol.name_max,
                vol.fragment_size,
            ),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        position: u32,
        reply: ReplyEmpty,
    ) {
        match self.do_setxattr(ino, name, value, flags, position) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn getxattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let value = self.do_getxattr(ino, name);
        reply_xattr(reply, size, value);
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let list = self.do_listxattr(ino);
        reply_xattr(reply, size, list);
    }

    fn removexattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.do_removexattr(ino, name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        match self.do_create(parent, name, mode, flags) {
            Ok((attr, fh)) => reply.created(&TTL, &attr, 0, fh, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn fallocate(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        length: i64,
        mode: i32,
        reply: ReplyEmpty,
    ) {
        match self.do_fallocate(ino, fh, offset, length, mode) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }

    #[cfg(target_os = "macos")]
    fn exchange(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _options: u64,
        reply: ReplyEmpty,
    ) {
        match self.do_rename(parent, name, newparent, newname, RENAME_EXCHANGE) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }
}


/// Translate mount options for `fuser`.
///
/// Volume name, icon and native xattr handling only mean something to macFUSE and are dropped
/// elsewhere.
fn mount_options(options: &MountOptions) -> Vec<MountOption> {
    let mut opts = vec![
        MountOption::FSName(options.volume_name.clone()),
        MountOption::Subtype(String::from("loopbackfs")),
        MountOption::DefaultPermissions,
    ];
    for arg in options.to_args() {
        if arg == "ro" {
            opts.push(MountOption::RO);
        } else if cfg!(target_os = "macos") {
            opts.push(MountOption::CUSTOM(arg));
        } else {
            debug!("Ignoring mount option {} on this platform", arg);
        }
    }
    opts
}

/// Mounts filesystems through the FUSE kernel driver.
#[derive(Debug, Default)]
pub struct FuseMounter;

/// A mounted FUSE session running on a background thread.
pub struct FuseHandle {
    unmounter: SessionUnmounter,
    finished: Receiver<io::Result<()>>,
}

impl std::fmt::Debug for FuseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuseHandle").finish()
    }
}

impl MountHandle for FuseHandle {
    fn unmount(&mut self) -> io::Result<()> {
        self.unmounter.unmount()
    }

    fn finished(&self) -> Receiver<io::Result<()>> {
        self.finished.clone()
    }
}

impl Mounter for FuseMounter {
    type Handle = FuseHandle;

    fn mount<F: Filesystem + 'static>(&mut self, fs: F, mountpoint: &Path, options: &MountOptions) -> io::Result<FuseHandle> {
        let adapter = FuseAdapter::new(fs, options.read_only);
        let mut session = fuser::Session::new(adapter, mountpoint, &mount_options(options))?;
        let unmounter = session.unmount_callable();
        let (tx, finished) = channel::bounded(1);
        thread::Builder::new().name(String::from("loopbackfs-session")).spawn(move || {
            let result = session.run();
            if let Err(ref err) = result {
                warn!("FUSE session ended with error: {}", err);
            }
            let _ = tx.send(result);
        })?;
        Ok(FuseHandle { unmounter, finished })
    }
}
