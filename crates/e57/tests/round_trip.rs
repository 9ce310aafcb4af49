//! Write-then-read round trips over real files.

use e57::{FloatPrecision, ImageFile, NodeKind, SessionOptions};
use tempfile::tempdir;

#[test]
fn writes_extension_and_integer_then_reads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.e57");

    let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
    imf.extensions_add("demo", "http://example.com/D").unwrap();
    let value = imf.new_integer(7, 0, 1023).unwrap();
    imf.root().unwrap().set("value", &value).unwrap();
    imf.close().unwrap();

    let imf = ImageFile::open(&path, SessionOptions::default()).unwrap();
    assert_eq!(imf.extensions_count().unwrap(), 1);
    assert_eq!(
        imf.extensions_lookup_prefix("demo").unwrap().as_deref(),
        Some("http://example.com/D")
    );
    let value = imf.root().unwrap().get("value").unwrap();
    assert_eq!(value.kind().unwrap(), NodeKind::Integer);
    assert_eq!(value.integer_value().unwrap(), 7);
    assert_eq!(value.integer_bounds().unwrap(), (0, 1023));
    imf.close().unwrap();
}

#[test]
fn every_leaf_variant_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("leaves.e57");

    let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
    let root = imf.root().unwrap();

    let i = imf.new_integer(-42, -100, 100).unwrap();
    root.set("int", &i).unwrap();

    let si = imf.new_scaled_integer(250, 0, 1000, 0.01, 2.0).unwrap();
    root.set("scaled", &si).unwrap();

    let fd = imf
        .new_float(std::f64::consts::E, FloatPrecision::Double, -10.0, 10.0)
        .unwrap();
    root.set("double", &fd).unwrap();

    let fs = imf
        .new_float(1.5, FloatPrecision::Single, -10.0, 10.0)
        .unwrap();
    root.set("single", &fs).unwrap();

    let s = imf.new_string("π ≈ 3.14159 <not xml>").unwrap();
    root.set("text", &s).unwrap();

    imf.close().unwrap();

    let imf = ImageFile::open(&path, SessionOptions::default()).unwrap();
    let root = imf.root().unwrap();

    let i = root.get("int").unwrap();
    assert_eq!(i.integer_value().unwrap(), -42);
    assert_eq!(i.integer_bounds().unwrap(), (-100, 100));

    let si = root.get("scaled").unwrap();
    assert_eq!(si.scaled_integer_raw().unwrap(), 250);
    assert_eq!(si.scaled_integer_bounds().unwrap(), (0, 1000));
    assert_eq!(si.scaled_integer_scale().unwrap(), 0.01);
    assert_eq!(si.scaled_integer_offset().unwrap(), 2.0);
    assert!((si.scaled_integer_value().unwrap() - 4.5).abs() < 1e-12);

    let fd = root.get("double").unwrap();
    assert_eq!(fd.float_value().unwrap(), std::f64::consts::E);
    assert_eq!(fd.float_precision().unwrap(), FloatPrecision::Double);

    let fs = root.get("single").unwrap();
    assert_eq!(fs.float_value().unwrap(), 1.5);
    assert_eq!(fs.float_precision().unwrap(), FloatPrecision::Single);

    assert_eq!(
        root.get("text").unwrap().string_value().unwrap(),
        "π ≈ 3.14159 <not xml>"
    );
    imf.close().unwrap();
}

#[test]
fn nested_containers_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested.e57");

    let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
    let root = imf.root().unwrap();

    let pose = imf.new_structure().unwrap();
    let x = imf.new_float(1.0, FloatPrecision::Double, -10.0, 10.0).unwrap();
    pose.set("x", &x).unwrap();
    let y = imf.new_float(2.0, FloatPrecision::Double, -10.0, 10.0).unwrap();
    pose.set("y", &y).unwrap();
    root.set("pose", &pose).unwrap();

    let list = imf.new_vector(true).unwrap();
    for n in 0..3 {
        let item = imf.new_integer(n, 0, 10).unwrap();
        list.append(&item).unwrap();
    }
    root.set("list", &list).unwrap();

    imf.close().unwrap();

    let imf = ImageFile::open(&path, SessionOptions::default()).unwrap();
    let root = imf.root().unwrap();
    assert_eq!(root.get("pose/x").unwrap().float_value().unwrap(), 1.0);
    assert_eq!(root.get("pose/y").unwrap().float_value().unwrap(), 2.0);

    let list = root.get("list").unwrap();
    assert!(list.vector_allows_heterogeneous().unwrap());
    assert_eq!(list.child_count().unwrap(), 3);
    for n in 0..3 {
        assert_eq!(
            list.child_at(n).unwrap().integer_value().unwrap(),
            n as i64
        );
    }
    // Structural invariants hold on the parsed tree.
    imf.check_invariant(true).unwrap();
    imf.close().unwrap();
}

#[test]
fn extension_subtrees_round_trip_unchanged() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ext.e57");

    let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
    imf.extensions_add("demo", "http://example.com/D").unwrap();
    imf.extensions_add("other", "http://example.com/O").unwrap();

    let sub = imf.new_structure().unwrap();
    let leaf = imf.new_integer(99, 0, 1000).unwrap();
    sub.set("demo:depth", &leaf).unwrap();
    let note = imf.new_string("opaque payload").unwrap();
    sub.set("other:note", &note).unwrap();
    imf.root().unwrap().set("demo:extra", &sub).unwrap();
    imf.close().unwrap();

    let imf = ImageFile::open(&path, SessionOptions::default()).unwrap();
    assert_eq!(imf.extensions_count().unwrap(), 2);
    let sub = imf.root().unwrap().get("demo:extra").unwrap();
    assert_eq!(sub.kind().unwrap(), NodeKind::Structure);
    assert_eq!(
        sub.get("demo:depth").unwrap().integer_value().unwrap(),
        99
    );
    assert_eq!(
        sub.get("other:note").unwrap().string_value().unwrap(),
        "opaque payload"
    );
    imf.close().unwrap();
}

#[test]
fn blob_round_trips_through_payload_area() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blob.e57");
    let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();

    let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
    let blob = imf.new_blob(payload.len() as u64).unwrap();
    blob.blob_write(&payload, 0).unwrap();
    imf.root().unwrap().set("raw", &blob).unwrap();
    imf.close().unwrap();

    let imf = ImageFile::open(&path, SessionOptions::default()).unwrap();
    let blob = imf.root().unwrap().get("raw").unwrap();
    assert_eq!(blob.blob_byte_count().unwrap(), payload.len() as u64);
    let mut back = vec![0u8; payload.len()];
    blob.blob_read(&mut back, 0).unwrap();
    assert_eq!(back, payload);

    // Partial reads at an offset.
    let mut tail = vec![0u8; 100];
    blob.blob_read(&mut tail, 2900).unwrap();
    assert_eq!(tail, payload[2900..]);
    imf.close().unwrap();
}

#[test]
fn memory_buffer_session_reads_a_written_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("buffered.e57");

    let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
    let value = imf.new_integer(123, 0, 1000).unwrap();
    imf.root().unwrap().set("value", &value).unwrap();
    imf.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let imf = ImageFile::from_buffer(&bytes, SessionOptions::default()).unwrap();
    assert_eq!(imf.file_name(), "<memory>");
    assert!(!imf.is_writable());
    assert_eq!(
        imf.root().unwrap().get("value").unwrap().integer_value().unwrap(),
        123
    );
    imf.close().unwrap();
}

#[test]
fn reopened_file_has_stable_extension_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("order.e57");

    let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
    imf.extensions_add("zulu", "http://z").unwrap();
    imf.extensions_add("alpha", "http://a").unwrap();
    imf.close().unwrap();

    let imf = ImageFile::open(&path, SessionOptions::default()).unwrap();
    assert_eq!(imf.extensions_prefix(0).unwrap(), "alpha");
    assert_eq!(imf.extensions_uri(0).unwrap(), "http://a");
    assert_eq!(imf.extensions_prefix(1).unwrap(), "zulu");
    assert_eq!(imf.extensions_uri(1).unwrap(), "http://z");
    imf.close().unwrap();
}
