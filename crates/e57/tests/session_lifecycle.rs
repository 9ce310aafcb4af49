//! Session open/close/cancel behavior over real files.

use e57::{ErrorKind, ImageFile, SessionOptions};
use tempfile::tempdir;

#[test]
fn successful_close_leaves_complete_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("done.e57");
    let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
    let v = imf.new_integer(5, 0, 10).unwrap();
    imf.root().unwrap().set("v", &v).unwrap();
    imf.close().unwrap();

    assert!(path.exists());
    // A complete file parses from scratch.
    let back = ImageFile::open(&path, SessionOptions::default()).unwrap();
    assert_eq!(back.root().unwrap().get("v").unwrap().integer_value().unwrap(), 5);
    back.close().unwrap();
}

#[test]
fn cancel_unlinks_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gone.e57");
    let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
    assert!(path.exists());
    imf.cancel();
    assert!(!path.exists());
    // cancel is a no-op afterwards, and close too.
    imf.cancel();
    imf.close().unwrap();
}

#[test]
fn drop_without_close_leaves_no_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("drop.e57");
    {
        let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
        let v = imf.new_integer(5, 0, 10).unwrap();
        imf.root().unwrap().set("v", &v).unwrap();
        assert!(path.exists());
        // No close, no cancel.
    }
    assert!(!path.exists());
}

#[test]
fn drop_after_bulk_write_leaves_no_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bulk.e57");
    {
        let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
        let proto = imf.new_structure().unwrap();
        let x = imf.new_integer(0, 0, 1 << 20).unwrap();
        proto.set("x", &x).unwrap();
        let cv = imf.new_compressed_vector(&proto, None).unwrap();
        imf.root().unwrap().set("points", &cv).unwrap();

        let values: Vec<i64> = (0..1_000_000).collect();
        let mut writer = cv
            .writer(vec![e57::SourceDestBuffer::source_i64("x", values)])
            .unwrap();
        writer.write(1_000_000).unwrap();
        // Neither the writer nor the session is closed.
    }
    assert!(!path.exists());
}

#[test]
fn cancel_on_read_mode_is_quiet_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("read.e57");
    let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
    imf.close().unwrap();

    let imf = ImageFile::open(&path, SessionOptions::default()).unwrap();
    imf.cancel();
    assert!(!imf.is_open());
    // Read-mode cancel never deletes the file.
    assert!(path.exists());
}

#[test]
fn close_with_live_writer_is_refused() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("busy.e57");
    let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
    let proto = imf.new_structure().unwrap();
    let x = imf.new_integer(0, 0, 255).unwrap();
    proto.set("x", &x).unwrap();
    let cv = imf.new_compressed_vector(&proto, None).unwrap();
    imf.root().unwrap().set("points", &cv).unwrap();

    let mut writer = cv
        .writer(vec![e57::SourceDestBuffer::source_i64("x", vec![1, 2, 3])])
        .unwrap();
    let err = imf.close().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadApiArgument);
    // The session survives the refused close.
    assert!(imf.is_open());

    writer.write(3).unwrap();
    writer.close().unwrap();
    imf.close().unwrap();
}

#[test]
fn duplicate_extension_errors() {
    let dir = tempdir().unwrap();
    let imf = ImageFile::create(dir.path().join("dup.e57"), SessionOptions::default()).unwrap();
    imf.extensions_add("x", "U1").unwrap();
    assert_eq!(
        imf.extensions_add("x", "U2").unwrap_err().kind(),
        ErrorKind::DuplicatePrefix
    );
    assert_eq!(
        imf.extensions_add("y", "U1").unwrap_err().kind(),
        ErrorKind::DuplicateUri
    );
    imf.cancel();
}

#[test]
fn node_handles_outlive_session_gracefully() {
    let dir = tempdir().unwrap();
    let node = {
        let imf = ImageFile::create(dir.path().join("weak.e57"), SessionOptions::default())
            .unwrap();
        let node = imf.new_integer(1, 0, 10).unwrap();
        imf.cancel();
        node
        // Session inner dropped here; node holds only a weak reference.
    };
    assert_eq!(
        node.integer_value().unwrap_err().kind(),
        ErrorKind::ImageFileNotOpen
    );
}

#[test]
fn open_of_missing_file_is_open_failed() {
    let dir = tempdir().unwrap();
    let err = ImageFile::open(dir.path().join("absent.e57"), SessionOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OpenFailed);
}

#[test]
fn attach_across_sessions_is_rejected() {
    let dir = tempdir().unwrap();
    let a = ImageFile::create(dir.path().join("a.e57"), SessionOptions::default()).unwrap();
    let b = ImageFile::create(dir.path().join("b.e57"), SessionOptions::default()).unwrap();
    let node = b.new_integer(1, 0, 10).unwrap();
    let err = a.root().unwrap().set("alien", &node).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadApiArgument);
    a.cancel();
    b.cancel();
}

#[test]
fn identity_semantics() {
    let dir = tempdir().unwrap();
    let a = ImageFile::create(dir.path().join("i1.e57"), SessionOptions::default()).unwrap();
    let b = ImageFile::create(dir.path().join("i2.e57"), SessionOptions::default()).unwrap();
    let a2 = a.clone();
    assert_eq!(a, a2);
    assert_ne!(a, b);

    let root1 = a.root().unwrap();
    let root2 = a2.root().unwrap();
    assert_eq!(root1, root2);
    assert_ne!(root1, b.root().unwrap());
    a.cancel();
    b.cancel();
}
