//! Corruption detection under the checksum policy.

use e57::{ChecksumPolicy, ErrorKind, ImageFile, SessionOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::tempdir;

/// Build a file whose blob payload spans physical offset 2048 (page 2).
fn write_file_with_blob(path: &std::path::Path) -> Vec<u8> {
    let payload: Vec<u8> = (0..4000u32).map(|i| (i * 7 % 253) as u8).collect();
    let imf = ImageFile::create(path, SessionOptions::default()).unwrap();
    let blob = imf.new_blob(payload.len() as u64).unwrap();
    blob.blob_write(&payload, 0).unwrap();
    imf.root().unwrap().set("raw", &blob).unwrap();
    imf.close().unwrap();
    payload
}

fn flip_byte(path: &std::path::Path, physical_offset: u64) {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .unwrap();
    file.seek(SeekFrom::Start(physical_offset)).unwrap();
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte).unwrap();
    byte[0] ^= 0xFF;
    file.seek(SeekFrom::Start(physical_offset)).unwrap();
    file.write_all(&byte).unwrap();
}

#[test]
fn flipped_byte_detected_at_policy_100_and_ignored_at_0() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("corrupt.e57");
    let payload = write_file_with_blob(&path);

    // Corrupt one byte at physical offset 2048, the start of page 2.
    flip_byte(&path, 2048);

    let strict = ImageFile::open(
        &path,
        SessionOptions::with_checksum_policy(ChecksumPolicy::ALL),
    )
    .unwrap();
    let blob = strict.root().unwrap().get("raw").unwrap();
    let mut back = vec![0u8; payload.len()];
    let err = blob.blob_read(&mut back, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadChecksum);
    strict.close().unwrap();

    let lax = ImageFile::open(
        &path,
        SessionOptions::with_checksum_policy(ChecksumPolicy::NONE),
    )
    .unwrap();
    let blob = lax.root().unwrap().get("raw").unwrap();
    blob.blob_read(&mut back, 0).unwrap();
    // The read succeeds silently; one byte differs from what was written.
    assert_ne!(back, payload);
    lax.close().unwrap();
}

#[test]
fn corrupt_header_page_rejected_on_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hdr.e57");
    write_file_with_blob(&path);

    // Corrupt a byte inside the header page's payload.
    flip_byte(&path, 100);
    let err = ImageFile::open(
        &path,
        SessionOptions::with_checksum_policy(ChecksumPolicy::ALL),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadChecksum);
}

#[test]
fn bad_signature_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sig.e57");
    write_file_with_blob(&path);

    // Overwrite the signature and refresh that page's CRC so only the
    // signature check can complain.
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0..8].copy_from_slice(b"NOT-E57!");
    let crc = crc32c::crc32c(&bytes[0..1020]);
    bytes[1020..1024].copy_from_slice(&crc.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let err = ImageFile::open(&path, SessionOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadFileSignature);
}

#[test]
fn truncated_file_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trunc.e57");
    write_file_with_blob(&path);

    let len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    // Remove one whole page; the header's recorded length no longer
    // matches.
    file.set_len(len - 1024).unwrap();
    drop(file);

    let err = ImageFile::open(&path, SessionOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadFileLength);
}

#[test]
fn ragged_tail_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ragged.e57");
    write_file_with_blob(&path);

    let len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 17).unwrap();
    drop(file);

    let err = ImageFile::open(&path, SessionOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadFileLength);
}

#[test]
fn garbage_file_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.e57");
    std::fs::write(&path, vec![0xA5u8; 4096]).unwrap();

    let err = ImageFile::open(
        &path,
        SessionOptions::with_checksum_policy(ChecksumPolicy::NONE),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadFileSignature);
}
