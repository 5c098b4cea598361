//! Loopback filesystem in userspace.
//!
//! Mirrors a directory of the real filesystem on a second mount point by translating every
//! filesystem operation into the same operation on the real path below the mirrored directory.
//! `LoopbackFs` implements the translation behind the path-based `Filesystem` trait; a
//! `Session` mounts it through a host framework (FUSE, with the `fuse` feature) and tracks the
//! mount's lifecycle.

#![warn(missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/loopbackfs/0.1.0")]

mod attr;
pub use attr::{
    FileType, FileTypeTryFromError, ItemAttributes, PreallocateOptions, SetAttributes, VolumeAttributes,
    XattrOptions,
};

mod error;
pub use error::{Error, Result};

mod filesystem;
pub use filesystem::Filesystem;

mod handle;
pub use handle::{FileHandle, Handle, HandleTable};

mod loopback;
pub use loopback::LoopbackFs;

pub mod session;
pub use session::{MountEvent, MountOptions, MountState, Session};

#[cfg(feature = "fuse")]
pub mod fuse;

mod sys;
