//! Loopback filesystem operations against a scratch directory.

use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use loopbackfs::{Error, FileType, Filesystem, LoopbackFs, PreallocateOptions, SetAttributes, XattrOptions};
use tempfile::TempDir;

fn setup() -> (TempDir, LoopbackFs) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let fs = LoopbackFs::new(dir.path());
    (dir, fs)
}

fn create(fs: &LoopbackFs, path: &str) -> u64 {
    fs.create_file(Path::new(path), &SetAttributes::with_permissions(0o644), libc::O_CREAT | libc::O_RDWR).unwrap()
}

fn xattr_unsupported(err: &Error) -> bool {
    err.errno() == libc::ENOTSUP || err.errno() == libc::EOPNOTSUPP
}

#[test]
fn create_write_read_release() {
    let (dir, fs) = setup();
    let fh = create(&fs, "/f.txt");
    assert_eq!(fs.write_file(Path::new("/f.txt"), fh, b"hello", 0).unwrap(), 5);
    let mut buf = [0; 5];
    assert_eq!(fs.read_file(Path::new("/f.txt"), fh, &mut buf, 0).unwrap(), 5);
    assert_eq!(&buf, b"hello");
    fs.release_file(Path::new("/f.txt"), fh);
    assert_eq!(fs.open_files(), 0);
    assert_eq!(fs::read(dir.path().join("f.txt")).unwrap(), b"hello");
}

#[test]
fn write_then_read_at_offset() {
    let (_dir, fs) = setup();
    let fh = create(&fs, "/data");
    let bytes = b"\x00\x01binary\xffdata";
    assert_eq!(fs.write_file(Path::new("/data"), fh, bytes, 4096).unwrap(), bytes.len());
    let mut buf = vec![0; bytes.len()];
    assert_eq!(fs.read_file(Path::new("/data"), fh, &mut buf, 4096).unwrap(), bytes.len());
    assert_eq!(&buf[..], &bytes[..]);
    // The gap reads as zeros
    let mut gap = [0xaa; 16];
    assert_eq!(fs.read_file(Path::new("/data"), fh, &mut gap, 0).unwrap(), 16);
    assert_eq!(gap, [0; 16]);
    fs.release_file(Path::new("/data"), fh);
}

#[test]
fn read_at_or_past_end_of_file_returns_nothing() {
    let (_dir, fs) = setup();
    let fh = create(&fs, "/short");
    fs.write_file(Path::new("/short"), fh, b"abc", 0).unwrap();
    let mut buf = [0; 8];
    assert_eq!(fs.read_file(Path::new("/short"), fh, &mut buf, 3).unwrap(), 0);
    assert_eq!(fs.read_file(Path::new("/short"), fh, &mut buf, 100).unwrap(), 0);
    assert_eq!(fs.read_file(Path::new("/short"), fh, &mut buf, 1).unwrap(), 2);
    fs.release_file(Path::new("/short"), fh);
}

#[test]
fn double_release_is_harmless() {
    let (_dir, fs) = setup();
    let first = create(&fs, "/a");
    let second = create(&fs, "/b");
    fs.release_file(Path::new("/a"), first);
    fs.release_file(Path::new("/a"), first);
    assert_eq!(fs.write_file(Path::new("/b"), second, b"ok", 0).unwrap(), 2);
    fs.release_file(Path::new("/b"), second);
}

#[test]
fn unknown_handle_is_bad_descriptor() {
    let (_dir, fs) = setup();
    let fh = create(&fs, "/f");
    fs.release_file(Path::new("/f"), fh);
    let mut buf = [0; 1];
    assert_eq!(fs.read_file(Path::new("/f"), fh, &mut buf, 0).unwrap_err().errno(), libc::EBADF);
    assert_eq!(fs.write_file(Path::new("/f"), fh, b"x", 0).unwrap_err().errno(), libc::EBADF);
    assert_eq!(fs.read_file(Path::new("/f"), 9999, &mut buf, 0).unwrap_err().errno(), libc::EBADF);
}

#[test]
fn create_requires_permissions() {
    let (dir, fs) = setup();
    let err = fs.create_file(Path::new("/f"), &SetAttributes::default(), libc::O_RDWR).unwrap_err();
    assert_eq!(err.errno(), libc::EPERM);
    assert!(!dir.path().join("f").exists());
}

#[test]
fn create_rejects_invalid_permissions() {
    let (_dir, fs) = setup();
    let err = fs.create_file(Path::new("/f"), &SetAttributes::with_permissions(0o170000), libc::O_RDWR).unwrap_err();
    assert_eq!(err.errno(), libc::EINVAL);
}

#[test]
fn open_missing_file_fails() {
    let (_dir, fs) = setup();
    assert_eq!(fs.open_file(Path::new("/missing"), libc::O_RDONLY).unwrap_err().errno(), libc::ENOENT);
}

#[test]
fn create_directory_and_list() {
    let (dir, fs) = setup();
    fs.create_directory(Path::new("/a"), &SetAttributes::with_permissions(0o755)).unwrap();
    let names = fs.list_directory(Path::new("/")).unwrap();
    assert!(names.contains(&OsString::from("a")));
    assert!(dir.path().join("a").is_dir());
}

#[test]
fn create_directory_is_not_recursive() {
    let (_dir, fs) = setup();
    let err = fs.create_directory(Path::new("/x/y"), &SetAttributes::with_permissions(0o755)).unwrap_err();
    assert_eq!(err.errno(), libc::ENOENT);
}

#[test]
fn list_directory_includes_dotfiles() {
    let (dir, fs) = setup();
    fs::write(dir.path().join(".hidden"), b"").unwrap();
    fs::write(dir.path().join("shown"), b"").unwrap();
    let mut names = fs.list_directory(Path::new("/")).unwrap();
    names.sort();
    assert_eq!(names, vec![OsString::from(".hidden"), OsString::from("shown")]);
}

#[test]
fn remove_non_empty_directory_fails() {
    let (dir, fs) = setup();
    fs::create_dir(dir.path().join("d")).unwrap();
    fs::write(dir.path().join("d/keep"), b"precious").unwrap();
    let err = fs.remove_directory(Path::new("/d")).unwrap_err();
    assert!(err.errno() == libc::ENOTEMPTY || err.errno() == libc::EEXIST);
    assert_eq!(fs::read(dir.path().join("d/keep")).unwrap(), b"precious");

    fs::remove_file(dir.path().join("d/keep")).unwrap();
    fs.remove_directory(Path::new("/d")).unwrap();
    assert!(!dir.path().join("d").exists());
}

#[test]
fn remove_item_and_move_item() {
    let (dir, fs) = setup();
    fs::write(dir.path().join("a"), b"1").unwrap();
    fs.move_item(Path::new("/a"), Path::new("/b")).unwrap();
    assert!(!dir.path().join("a").exists());
    assert_eq!(fs::read(dir.path().join("b")).unwrap(), b"1");
    fs.remove_item(Path::new("/b")).unwrap();
    assert!(!dir.path().join("b").exists());
    assert_eq!(fs.remove_item(Path::new("/b")).unwrap_err().errno(), libc::ENOENT);
}

#[test]
fn hard_link_shares_data() {
    let (_dir, fs) = setup();
    let fh = create(&fs, "/f.txt");
    fs.release_file(Path::new("/f.txt"), fh);
    fs.link_item(Path::new("/f.txt"), Path::new("/f2.txt")).unwrap();

    let fh2 = fs.open_file(Path::new("/f2.txt"), libc::O_RDWR).unwrap();
    fs.write_file(Path::new("/f2.txt"), fh2, b"shared", 0).unwrap();
    fs.release_file(Path::new("/f2.txt"), fh2);

    let fh = fs.open_file(Path::new("/f.txt"), libc::O_RDONLY).unwrap();
    let mut buf = [0; 6];
    assert_eq!(fs.read_file(Path::new("/f.txt"), fh, &mut buf, 0).unwrap(), 6);
    assert_eq!(&buf, b"shared");
    fs.release_file(Path::new("/f.txt"), fh);

    let a = fs.item_attributes(Path::new("/f.txt")).unwrap();
    let b = fs.item_attributes(Path::new("/f2.txt")).unwrap();
    assert_eq!(a.ino, b.ino);
    assert_eq!(a.nlink, 2);
}

#[test]
fn symlinks_are_stored_literally() {
    let (dir, fs) = setup();
    fs.create_symbolic_link(Path::new("/link"), Path::new("../nowhere/target")).unwrap();
    assert_eq!(fs.read_symbolic_link(Path::new("/link")).unwrap(), Path::new("../nowhere/target"));
    assert_eq!(fs::read_link(dir.path().join("link")).unwrap(), Path::new("../nowhere/target"));
    // Attributes describe the link, not its (missing) target
    assert_eq!(fs.item_attributes(Path::new("/link")).unwrap().kind, FileType::Symlink);
}

#[test]
fn item_attributes_mirror_real_metadata() {
    let (dir, fs) = setup();
    fs::write(dir.path().join("f"), b"12345").unwrap();
    let meta = fs::metadata(dir.path().join("f")).unwrap();
    let attrs = fs.item_attributes(Path::new("/f")).unwrap();
    assert_eq!(attrs.kind, FileType::RegularFile);
    assert_eq!(attrs.size, 5);
    assert_eq!(attrs.ino, meta.ino());
    assert_eq!(attrs.uid, meta.uid());
    assert_eq!(u32::from(attrs.perm), meta.mode() & 0o7777);
    assert_eq!(fs.item_attributes(Path::new("/missing")).unwrap_err().errno(), libc::ENOENT);
}

#[test]
fn filesystem_attributes_report_capabilities() {
    let (_dir, fs) = setup();
    let vol = fs.filesystem_attributes(Path::new("/")).unwrap();
    assert!(vol.supports_extended_dates);
    assert!(vol.block_size > 0);
    assert!(vol.name_max > 0);
    #[cfg(not(target_os = "macos"))]
    assert!(vol.supports_case_sensitive_names);
}

#[test]
fn set_attributes_truncates_and_changes_mode() {
    let (dir, fs) = setup();
    fs::write(dir.path().join("f"), b"0123456789").unwrap();
    let attrs = SetAttributes { size: Some(4), permissions: Some(0o600), ..SetAttributes::default() };
    fs.set_attributes(&attrs, Path::new("/f")).unwrap();
    assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"0123");
    let mode = fs::metadata(dir.path().join("f")).unwrap().permissions().mode();
    assert_eq!(mode & 0o7777, 0o600);
}

#[test]
fn set_attributes_changes_times() {
    use std::time::{Duration, UNIX_EPOCH};

    let (dir, fs) = setup();
    fs::write(dir.path().join("f"), b"").unwrap();
    let mtime = UNIX_EPOCH + Duration::from_secs(1_000_000_000);
    let attrs = SetAttributes { mtime: Some(mtime), ..SetAttributes::default() };
    fs.set_attributes(&attrs, Path::new("/f")).unwrap();
    assert_eq!(fs.item_attributes(Path::new("/f")).unwrap().mtime, mtime);
}

#[test]
fn set_attributes_rejects_invalid_input() {
    let (dir, fs) = setup();
    fs::write(dir.path().join("f"), b"keep").unwrap();
    let attrs = SetAttributes { size: Some(0), permissions: Some(0o200000), ..SetAttributes::default() };
    assert_eq!(fs.set_attributes(&attrs, Path::new("/f")).unwrap_err().errno(), libc::EINVAL);
    // Nothing was applied
    assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"keep");
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
#[test]
fn file_flags_are_unsupported() {
    let (dir, fs) = setup();
    fs::write(dir.path().join("f"), b"").unwrap();
    let attrs = SetAttributes { flags: Some(0), ..SetAttributes::default() };
    assert_eq!(fs.set_attributes(&attrs, Path::new("/f")).unwrap_err().errno(), libc::EOPNOTSUPP);
}

#[test]
fn extended_attributes_round_trip() {
    let (_dir, fs) = setup();
    let fh = create(&fs, "/f.txt");
    fs.release_file(Path::new("/f.txt"), fh);

    let path = Path::new("/f.txt");
    match fs.set_extended_attribute("user.tag", path, b"v1", 0, XattrOptions::empty()) {
        Err(ref err) if xattr_unsupported(err) => return,
        result => result.unwrap(),
    }
    assert_eq!(fs.get_extended_attribute("user.tag", path, 0).unwrap(), b"v1");
    assert!(fs.list_extended_attributes(path).unwrap().contains(&String::from("user.tag")));

    fs.remove_extended_attribute("user.tag", path).unwrap();
    assert!(!fs.list_extended_attributes(path).unwrap().contains(&String::from("user.tag")));
    assert!(fs.get_extended_attribute("user.tag", path, 0).is_err());
}

#[test]
fn extended_attribute_create_and_replace() {
    let (_dir, fs) = setup();
    let fh = create(&fs, "/f");
    fs.release_file(Path::new("/f"), fh);

    let path = Path::new("/f");
    match fs.set_extended_attribute("user.x", path, b"1", 0, XattrOptions::CREATE) {
        Err(ref err) if xattr_unsupported(err) => return,
        result => result.unwrap(),
    }
    let err = fs.set_extended_attribute("user.x", path, b"2", 0, XattrOptions::CREATE).unwrap_err();
    assert_eq!(err.errno(), libc::EEXIST);
    fs.set_extended_attribute("user.x", path, b"3", 0, XattrOptions::REPLACE).unwrap();
    assert_eq!(fs.get_extended_attribute("user.x", path, 0).unwrap(), b"3");
    // Kernel-added security bits are cleared before the call
    fs.set_extended_attribute("user.x", path, b"4", 0, XattrOptions::NOSECURITY | XattrOptions::NODEFAULT).unwrap();
    assert_eq!(fs.get_extended_attribute("user.x", path, 0).unwrap(), b"4");
}

#[test]
fn empty_extended_attribute_value() {
    let (_dir, fs) = setup();
    let fh = create(&fs, "/f");
    fs.release_file(Path::new("/f"), fh);
    match fs.set_extended_attribute("user.empty", Path::new("/f"), b"", 0, XattrOptions::empty()) {
        Err(ref err) if xattr_unsupported(err) => return,
        result => result.unwrap(),
    }
    assert!(fs.get_extended_attribute("user.empty", Path::new("/f"), 0).unwrap().is_empty());
}

#[test]
fn extended_attributes_of_missing_item() {
    let (_dir, fs) = setup();
    assert_eq!(fs.list_extended_attributes(Path::new("/missing")).unwrap_err().errno(), libc::ENOENT);
}

#[test]
fn preallocate_is_supported_or_reported() {
    let (_dir, fs) = setup();
    let fh = create(&fs, "/big");
    match fs.preallocate_file(Path::new("/big"), fh, PreallocateOptions::ALL, 0, 1 << 16) {
        Ok(()) => assert!(fs.item_attributes(Path::new("/big")).unwrap().blocks > 0),
        Err(err) => assert_eq!(err.errno(), libc::EOPNOTSUPP),
    }
    let both = PreallocateOptions::FROM_PEOF | PreallocateOptions::FROM_VOL;
    assert_eq!(fs.preallocate_file(Path::new("/big"), fh, both, 0, 1).unwrap_err().errno(), libc::EINVAL);
    fs.release_file(Path::new("/big"), fh);
}

#[cfg(target_os = "linux")]
#[test]
fn preallocate_past_end_of_file() {
    let (_dir, fs) = setup();
    let fh = create(&fs, "/tail");
    assert_eq!(fs.write_file(Path::new("/tail"), fh, b"hello", 0).unwrap(), 5);
    match fs.preallocate_file(Path::new("/tail"), fh, PreallocateOptions::FROM_PEOF, 0, 4096) {
        Ok(()) => assert_eq!(fs.item_attributes(Path::new("/tail")).unwrap().size, 5 + 4096),
        Err(err) => assert_eq!(err.errno(), libc::EOPNOTSUPP),
    }
    let err = fs.preallocate_file(Path::new("/tail"), fh, PreallocateOptions::FROM_PEOF, i64::MAX, 1).unwrap_err();
    assert_eq!(err.errno(), libc::EFBIG);
    fs.release_file(Path::new("/tail"), fh);
}

#[test]
fn exchange_swaps_contents() {
    let (dir, fs) = setup();
    fs::write(dir.path().join("a"), b"first").unwrap();
    fs::write(dir.path().join("b"), b"second").unwrap();
    match fs.exchange_data(Path::new("/a"), Path::new("/b")) {
        Ok(()) => {
            assert_eq!(fs::read(dir.path().join("a")).unwrap(), b"second");
            assert_eq!(fs::read(dir.path().join("b")).unwrap(), b"first");
        }
        // Some filesystems (and old kernels) can't swap entries
        Err(err) => assert!(err.errno() == libc::EOPNOTSUPP || err.errno() == libc::EINVAL),
    }
}

#[test]
fn concurrent_io_on_different_handles() {
    let (_dir, fs) = setup();
    let fs = Arc::new(fs);
    let workers: Vec<_> = (0..8)
        .map(|i| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                let name = format!("/file{}", i);
                let path = Path::new(&name);
                let fh = create(&fs, &name);
                let data = vec![i as u8; 4096];
                for block in 0..16 {
                    assert_eq!(fs.write_file(path, fh, &data, block * 4096).unwrap(), 4096);
                }
                let mut buf = vec![0; 4096];
                for block in 0..16 {
                    assert_eq!(fs.read_file(path, fh, &mut buf, block * 4096).unwrap(), 4096);
                    assert_eq!(buf, data);
                }
                fs.release_file(path, fh);
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(fs.open_files(), 0);
}

#[test]
fn concurrent_io_on_one_handle() {
    let (_dir, fs) = setup();
    let fs = Arc::new(fs);
    let fh = create(&fs, "/shared");
    let workers: Vec<_> = (0..4)
        .map(|i| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                let data = [i as u8 + 1; 512];
                fs.write_file(Path::new("/shared"), fh, &data, i * 512).unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    let mut buf = [0; 2048];
    assert_eq!(fs.read_file(Path::new("/shared"), fh, &mut buf, 0).unwrap(), 2048);
    for (i, chunk) in buf.chunks(512).enumerate() {
        assert!(chunk.iter().all(|&b| b == i as u8 + 1));
    }
    fs.release_file(Path::new("/shared"), fh);
}

#[test]
fn dot_dot_is_not_resolved() {
    let (dir, fs) = setup();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("top"), b"t").unwrap();
    // The real path is root + "/sub/../top", which the kernel resolves on its own
    assert_eq!(fs.real_path(Path::new("/sub/../top")), dir.path().join("sub/../top"));
    assert_eq!(fs.item_attributes(Path::new("/sub/../top")).unwrap().size, 1);
}
