//! Mount a loopback mirror of a directory.
//!
//! Usage:
//!   loopbackfs [ROOT] [--mountpoint DIR] [--volname NAME] [--volicon FILE] [--read-only]
//!
//! Without ROOT, the directory to mirror is asked for on stdin. The volume stays mounted until
//! it's unmounted from outside or the process receives SIGINT/SIGTERM.

use clap::Parser;
use crossbeam_channel as channel;
use log::{error, info};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::{process, thread};

use loopbackfs::fuse::FuseMounter;
use loopbackfs::session::SignalSet;
use loopbackfs::{MountEvent, MountOptions, Session};

#[cfg(target_os = "macos")]
const DEFAULT_MOUNTPOINT: &str = "/Volumes/loop";
#[cfg(not(target_os = "macos"))]
const DEFAULT_MOUNTPOINT: &str = "/tmp/loop";

/// Mirror a directory on a second mount point.
#[derive(Parser, Debug)]
#[command(name = "loopbackfs", version)]
struct Args {
    /// Directory to mirror (asked for interactively if omitted)
    root: Option<PathBuf>,

    /// Where to mount the mirror
    #[arg(long, default_value = DEFAULT_MOUNTPOINT)]
    mountpoint: PathBuf,

    /// Volume name shown by the system
    #[arg(long, default_value = "LoopbackFS")]
    volname: String,

    /// Volume icon (macOS)
    #[arg(long)]
    volicon: Option<PathBuf>,

    /// Don't use native extended attribute handling (macOS)
    #[arg(long)]
    no_native_xattr: bool,

    /// Mount read-only
    #[arg(long)]
    read_only: bool,
}

/// Ask for the directory to mirror. `None` if the user gave no answer.
fn prompt_root() -> io::Result<Option<PathBuf>> {
    print!("Directory to mirror: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();
    if line.is_empty() {
        Ok(None)
    } else {
        Ok(Some(PathBuf::from(line)))
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    // Block before any thread exists so that every thread inherits the mask
    let signals = match SignalSet::block(&[libc::SIGINT, libc::SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            eprintln!("Failed to block signals: {}", err);
            process::exit(1);
        }
    };

    let root = match args.root {
        Some(root) => root,
        None => match prompt_root() {
            Ok(Some(root)) => root,
            Ok(None) => process::exit(0),
            Err(err) => {
                eprintln!("Failed to read directory: {}", err);
                process::exit(1);
            }
        },
    };

    let options = MountOptions {
        volume_name: args.volname,
        volume_icon: args.volicon,
        native_xattr: !args.no_native_xattr,
        read_only: args.read_only,
    };
    let mut session = Session::new(FuseMounter, root, args.mountpoint, options);

    let events = session.subscribe();
    let printer = thread::spawn(move || {
        for event in events {
            match event {
                MountEvent::Mounted(path) => println!("Mounted on {}", path.display()),
                MountEvent::Unmounted(path) => println!("Unmounted {}", path.display()),
                MountEvent::Failed(err) => eprintln!("Mount failed: {}", err),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = channel::bounded(1);
    thread::spawn(move || match signals.wait() {
        Ok(sig) => {
            info!("Received signal {}, unmounting", sig);
            let _ = shutdown_tx.send(());
        }
        Err(err) => error!("Waiting for signals failed: {}", err),
    });

    let result = session.mount().and_then(|()| session.run_until(&shutdown_rx));
    // Dropping the session closes the event channel and lets the printer finish
    drop(session);
    let _ = printer.join();
    if let Err(err) = result {
        error!("{}", err);
        process::exit(1);
    }
}
