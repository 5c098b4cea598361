//! Mount session.
//!
//! A session mounts a loopback filesystem for a root directory on a mount point and tracks the
//! mount through its lifecycle. The session begins unmounted, is mounted by `mount` and ends
//! either by `unmount` (or being dropped) or by the volume being unmounted from outside, e.g.
//! with `umount`. A failed mount is final.
//!
//! Lifecycle transitions are broadcast as `MountEvent`s to every subscriber. Actually talking to
//! the kernel is left to a `Mounter`, so sessions can run against any host framework.

use crossbeam_channel::{self as channel, select, Receiver, Sender};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use crate::error::{Error, Result};
use crate::filesystem::Filesystem;
use crate::loopback::LoopbackFs;

pub use crate::sys::SignalSet;


/// Time to wait for the host framework to wind down after an unmount.
const UNMOUNT_TIMEOUT: Duration = Duration::from_secs(5);


/// Options for mounting the volume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountOptions {
    /// Name of the volume as shown by the system.
    pub volume_name: String,
    /// Icon file for the volume (macOS only).
    pub volume_icon: Option<PathBuf>,
    /// Use the platform's native extended attribute handling (macOS only).
    pub native_xattr: bool,
    /// Mount read-only.
    pub read_only: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            volume_name: String::from("LoopbackFS"),
            volume_icon: None,
            native_xattr: true,
            read_only: false,
        }
    }
}

impl MountOptions {
    /// Render the options as `-o` option strings understood by FUSE mount helpers.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ref icon) = self.volume_icon {
            args.push(format!("volicon={}", icon.display()));
        }
        if self.native_xattr {
            args.push(String::from("native_xattr"));
        }
        args.push(format!("volname={}", self.volume_name));
        if self.read_only {
            args.push(String::from("ro"));
        }
        args
    }
}


/// State of a mount session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MountState {
    Unmounted,
    Mounted,
    /// Mounting failed. The session can't be used anymore.
    Failed,
}

/// Lifecycle notification of a mount session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MountEvent {
    /// The volume was mounted at the given mount point.
    Mounted(PathBuf),
    /// The volume at the given mount point is gone.
    Unmounted(PathBuf),
    /// Mounting failed.
    Failed(Error),
}


/// A running mount, as returned by a `Mounter`.
pub trait MountHandle: Send {
    /// Ask the host framework to unmount the volume.
    fn unmount(&mut self) -> io::Result<()>;

    /// Channel that receives the result of the host framework's request loop once it ends,
    /// for whatever reason.
    fn finished(&self) -> Receiver<io::Result<()>>;
}

/// Host framework seam: mounts a filesystem on a mount point.
pub trait Mounter {
    type Handle: MountHandle;

    /// Mount `fs` on `mountpoint` and start serving requests in the background.
    fn mount<F: Filesystem + 'static>(
        &mut self,
        fs: F,
        mountpoint: &Path,
        options: &MountOptions,
    ) -> io::Result<Self::Handle>;
}


/// A loopback mount of `root` on `mountpoint`.
pub struct Session<M: Mounter> {
    mounter: M,
    root: PathBuf,
    mountpoint: PathBuf,
    options: MountOptions,
    state: MountState,
    handle: Option<M::Handle>,
    subscribers: Vec<Sender<MountEvent>>,
}

impl<M: Mounter> std::fmt::Debug for Session<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.root)
            .field("mountpoint", &self.mountpoint)
            .field("options", &self.options)
            .field("state", &self.state)
            .finish()
    }
}

impl<M: Mounter> Session<M> {
    /// Create an unmounted session.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(mounter: M, root: P, mountpoint: Q, options: MountOptions) -> Self {
        Self {
            mounter,
            root: root.into(),
            mountpoint: mountpoint.into(),
            options,
            state: MountState::Unmounted,
            handle: None,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> MountState {
        self.state
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Receive all lifecycle events from now on.
    pub fn subscribe(&mut self) -> Receiver<MountEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self, event: MountEvent) {
        debug!("Mount event {:?}", event);
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Mount the volume.
    ///
    /// The root directory is canonicalized first. Any failure moves the session to the final
    /// `Failed` state. Mounting an already mounted session fails with `EBUSY`.
    pub fn mount(&mut self) -> Result<()> {
        match self.state {
            MountState::Unmounted => {}
            MountState::Mounted => return Err(Error::new(libc::EBUSY)),
            MountState::Failed => return Err(Error::invalid_argument()),
        }
        info!("Mounting {} on {}", self.root.display(), self.mountpoint.display());
        let result = fs::canonicalize(&self.root).and_then(|root| {
            let fs = LoopbackFs::new(root);
            self.mounter.mount(fs, &self.mountpoint, &self.options)
        });
        match result {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = MountState::Mounted;
                let mountpoint = self.mountpoint.clone();
                self.notify(MountEvent::Mounted(mountpoint));
                Ok(())
            }
            Err(err) => {
                error!("Failed to mount {}: {}", self.mountpoint.display(), err);
                let err = Error::from(err);
                self.state = MountState::Failed;
                self.notify(MountEvent::Failed(err));
                Err(err)
            }
        }
    }

    fn unmounted(&mut self) {
        info!("Unmounted {}", self.mountpoint.display());
        self.handle = None;
        self.state = MountState::Unmounted;
        let mountpoint = self.mountpoint.clone();
        self.notify(MountEvent::Unmounted(mountpoint));
    }

    /// Unmount the volume. Does nothing unless mounted.
    pub fn unmount(&mut self) -> Result<()> {
        let handle = match self.handle.as_mut() {
            Some(handle) => handle,
            None => return Ok(()),
        };
        info!("Unmounting {}", self.mountpoint.display());
        let finished = handle.finished();
        handle.unmount()?;
        match finished.recv_timeout(UNMOUNT_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Filesystem session ended with error: {}", err),
            Err(err) => warn!("Filesystem session didn't end after unmount: {}", err),
        }
        self.unmounted();
        Ok(())
    }

    /// Block until the volume is unmounted from outside, or until `shutdown` receives a message
    /// (or disconnects), in which case the volume is unmounted.
    pub fn run_until<T>(&mut self, shutdown: &Receiver<T>) -> Result<()> {
        let finished = match self.handle.as_ref() {
            Some(handle) => handle.finished(),
            None => return Err(Error::invalid_argument()),
        };
        select! {
            recv(finished) -> res => {
                self.unmounted();
                match res {
                    Ok(Err(err)) => Err(err.into()),
                    _ => Ok(()),
                }
            }
            recv(shutdown) -> _ => self.unmount(),
        }
    }
}

impl<M: Mounter> Drop for Session<M> {
    fn drop(&mut self) {
        if self.state == MountState::Mounted {
            if let Err(err) = self.unmount() {
                warn!("Failed to unmount {}: {}", self.mountpoint.display(), err);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeMounter {
        fail: bool,
        unmounts: Arc<AtomicUsize>,
        mounted_at: Option<PathBuf>,
    }

    struct FakeHandle {
        unmounts: Arc<AtomicUsize>,
        tx: Sender<io::Result<()>>,
        rx: Receiver<io::Result<()>>,
    }

    impl MountHandle for FakeHandle {
        fn unmount(&mut self) -> io::Result<()> {
            self.unmounts.fetch_add(1, Ordering::SeqCst);
            let _ = self.tx.send(Ok(()));
            Ok(())
        }

        fn finished(&self) -> Receiver<io::Result<()>> {
            self.rx.clone()
        }
    }

    impl Mounter for FakeMounter {
        type Handle = FakeHandle;

        fn mount<F: Filesystem + 'static>(&mut self, _fs: F, mountpoint: &Path, _options: &MountOptions) -> io::Result<FakeHandle> {
            if self.fail {
                return Err(io::Error::from_raw_os_error(libc::ENOENT));
            }
            self.mounted_at = Some(mountpoint.to_owned());
            let (tx, rx) = channel::bounded(1);
            Ok(FakeHandle { unmounts: self.unmounts.clone(), tx, rx })
        }
    }

    fn session(mounter: FakeMounter) -> (tempfile::TempDir, Session<FakeMounter>) {
        let root = tempfile::tempdir().unwrap();
        let session = Session::new(mounter, root.path(), "/mnt/loop", MountOptions::default());
        (root, session)
    }

    #[test]
    fn default_options() {
        let opts = MountOptions::default();
        assert_eq!(opts.to_args(), vec!["native_xattr".to_owned(), "volname=LoopbackFS".to_owned()]);
    }

    #[test]
    fn icon_comes_first() {
        let opts = MountOptions {
            volume_name: String::from("Data"),
            volume_icon: Some(PathBuf::from("/tmp/icon.icns")),
            native_xattr: false,
            read_only: true,
        };
        assert_eq!(opts.to_args(), vec!["volicon=/tmp/icon.icns", "volname=Data", "ro"]);
    }

    #[test]
    fn mount_and_unmount() {
        let (_root, mut session) = session(FakeMounter::default());
        let events = session.subscribe();
        assert_eq!(session.state(), MountState::Unmounted);

        session.mount().unwrap();
        assert_eq!(session.state(), MountState::Mounted);
        assert_eq!(session.mounter.mounted_at.as_deref(), Some(Path::new("/mnt/loop")));
        assert_eq!(session.mount().unwrap_err().errno(), libc::EBUSY);

        session.unmount().unwrap();
        assert_eq!(session.state(), MountState::Unmounted);
        assert_eq!(events.try_recv().unwrap(), MountEvent::Mounted(PathBuf::from("/mnt/loop")));
        assert_eq!(events.try_recv().unwrap(), MountEvent::Unmounted(PathBuf::from("/mnt/loop")));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn failed_mount_is_final() {
        let (_root, mut session) = session(FakeMounter { fail: true, ..FakeMounter::default() });
        let events = session.subscribe();
        assert_eq!(session.mount().unwrap_err().errno(), libc::ENOENT);
        assert_eq!(session.state(), MountState::Failed);
        assert_eq!(events.try_recv().unwrap(), MountEvent::Failed(Error::new(libc::ENOENT)));
        assert!(session.mount().is_err());
        assert_eq!(session.state(), MountState::Failed);
    }

    #[test]
    fn missing_root_fails_mount() {
        let mut session = Session::new(FakeMounter::default(), "/nonexistent/loopback/root", "/mnt/loop", MountOptions::default());
        assert_eq!(session.mount().unwrap_err().errno(), libc::ENOENT);
        assert!(session.mounter.mounted_at.is_none());
    }

    #[test]
    fn shutdown_unmounts() {
        let (_root, mut session) = session(FakeMounter::default());
        let unmounts = session.mounter.unmounts.clone();
        session.mount().unwrap();
        let (tx, rx) = channel::bounded::<()>(1);
        tx.send(()).unwrap();
        session.run_until(&rx).unwrap();
        assert_eq!(session.state(), MountState::Unmounted);
        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn external_unmount_ends_run() {
        let (_root, mut session) = session(FakeMounter::default());
        let unmounts = session.mounter.unmounts.clone();
        session.mount().unwrap();
        let events = session.subscribe();
        if let Some(ref handle) = session.handle {
            handle.tx.send(Ok(())).unwrap();
        }
        let (_tx, rx) = channel::bounded::<()>(1);
        session.run_until(&rx).unwrap();
        assert_eq!(session.state(), MountState::Unmounted);
        assert_eq!(unmounts.load(Ordering::SeqCst), 0);
        assert_eq!(events.try_recv().unwrap(), MountEvent::Unmounted(PathBuf::from("/mnt/loop")));
    }

    #[test]
    fn drop_unmounts() {
        let (_root, mut session) = session(FakeMounter::default());
        let unmounts = session.mounter.unmounts.clone();
        session.mount().unwrap();
        drop(session);
        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_requires_mount() {
        let (_root, mut session) = session(FakeMounter::default());
        let (_tx, rx) = channel::bounded::<()>(1);
        assert_eq!(session.run_until(&rx).unwrap_err().errno(), libc::EINVAL);
    }
}
