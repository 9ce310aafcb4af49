//! Paged checksummed random-access stream.
//!
//! The underlying file is a sequence of fixed-size pages; each page is
//! `PAYLOAD_PER_PAGE` bytes of payload followed by a 4-byte CRC-32C of that
//! payload. Callers address the *logical* (unchecksummed) coordinate space;
//! every logical byte offset `L` lives at physical offset
//! `L + (L / PAYLOAD_PER_PAGE) * CHECKSUM_SIZE`.
//!
//! # Page Layout
//!
//! ```text
//! ┌───────────────────────────────┬──────────┐
//! │ payload (1020 bytes)          │ CRC32C(4)│
//! └───────────────────────────────┴──────────┘
//! ```
//!
//! Writes go through a dirty-page cache; `flush` writes dirty pages in
//! ascending physical order and fsyncs. Reads consult the cache first, then
//! the backing, verifying the CRC of the fraction of page reads selected by
//! the [`ChecksumPolicy`]. The same logical model also runs over an
//! in-memory buffer.

use crate::crc::{page_checksum, CHECKSUM_SIZE};
use e57_core::{ChecksumPolicy, Error, ErrorKind, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Physical page size in bytes.
pub const PAGE_SIZE: usize = 1024;

/// Useful bytes per page.
pub const PAYLOAD_PER_PAGE: usize = PAGE_SIZE - CHECKSUM_SIZE;

type PagePayload = Box<[u8; PAYLOAD_PER_PAGE]>;

#[derive(Debug)]
enum Backing {
    Disk {
        // The cursor is shared between concurrent page reads, so the raw
        // seek+read pair is serialized here even when the logical layer is
        // under a shared guard.
        file: Mutex<File>,
        path: PathBuf,
    },
    Memory {
        buf: Vec<u8>,
    },
}

/// Paged checksummed stream over a file or an in-memory buffer.
#[derive(Debug)]
pub struct PagedFile {
    backing: Backing,
    policy: ChecksumPolicy,
    dirty: BTreeMap<u64, PagePayload>,
    /// Pages present in the backing (everything beyond reads as zeros).
    committed_pages: u64,
    logical_length: u64,
    writable: bool,
}

impl PagedFile {
    /// Create a new file for writing, truncating anything already there.
    pub fn create(path: &Path, policy: ChecksumPolicy) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::io(ErrorKind::OpenFailed, &format!("create {}", path.display()), &e))?;
        Ok(PagedFile {
            backing: Backing::Disk {
                file: Mutex::new(file),
                path: path.to_path_buf(),
            },
            policy,
            dirty: BTreeMap::new(),
            committed_pages: 0,
            logical_length: 0,
            writable: true,
        })
    }

    /// Open an existing file for reading.
    pub fn open(path: &Path, policy: ChecksumPolicy) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| Error::io(ErrorKind::OpenFailed, &format!("open {}", path.display()), &e))?;
        let physical = file
            .metadata()
            .map_err(|e| Error::io(ErrorKind::OpenFailed, "stat", &e))?
            .len();
        Self::check_physical_length(physical)?;
        let committed_pages = physical / PAGE_SIZE as u64;
        Ok(PagedFile {
            backing: Backing::Disk {
                file: Mutex::new(file),
                path: path.to_path_buf(),
            },
            policy,
            dirty: BTreeMap::new(),
            committed_pages,
            logical_length: committed_pages * PAYLOAD_PER_PAGE as u64,
            writable: false,
        })
    }

    /// Read-only stream over a caller-supplied buffer.
    pub fn from_buffer(bytes: &[u8], policy: ChecksumPolicy) -> Result<Self> {
        Self::check_physical_length(bytes.len() as u64)?;
        let committed_pages = bytes.len() as u64 / PAGE_SIZE as u64;
        Ok(PagedFile {
            backing: Backing::Memory {
                buf: bytes.to_vec(),
            },
            policy,
            dirty: BTreeMap::new(),
            committed_pages,
            logical_length: committed_pages * PAYLOAD_PER_PAGE as u64,
            writable: false,
        })
    }

    /// Writable stream over a fresh in-memory buffer.
    pub fn in_memory(policy: ChecksumPolicy) -> Self {
        PagedFile {
            backing: Backing::Memory { buf: Vec::new() },
            policy,
            dirty: BTreeMap::new(),
            committed_pages: 0,
            logical_length: 0,
            writable: true,
        }
    }

    fn check_physical_length(physical: u64) -> Result<()> {
        if physical == 0 || physical % PAGE_SIZE as u64 != 0 {
            return Err(Error::new(
                ErrorKind::BadFileLength,
                format!("physical length {physical} is not a whole number of {PAGE_SIZE}-byte pages"),
            ));
        }
        Ok(())
    }

    /// Length of the logical byte space.
    pub fn logical_length(&self) -> u64 {
        self.logical_length
    }

    /// Physical length the file has (or will have after `flush`).
    pub fn physical_length(&self) -> u64 {
        let needed = self.logical_length.div_ceil(PAYLOAD_PER_PAGE as u64);
        self.committed_pages.max(needed) * PAGE_SIZE as u64
    }

    /// Path of the backing file, when disk-backed.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Disk { path, .. } => Some(path),
            Backing::Memory { .. } => None,
        }
    }

    /// Read `dst.len()` bytes starting at `logical_offset`.
    ///
    /// Shared-borrow on purpose: concurrent readers may drive this under a
    /// shared guard; the raw file cursor is serialized internally.
    pub fn read(&self, logical_offset: u64, dst: &mut [u8]) -> Result<()> {
        let end = logical_offset
            .checked_add(dst.len() as u64)
            .ok_or_else(|| Error::new(ErrorKind::ReadFailed, "read range overflows"))?;
        if end > self.logical_length {
            return Err(Error::new(
                ErrorKind::ReadFailed,
                format!(
                    "read [{logical_offset}, {end}) past logical end {}",
                    self.logical_length
                ),
            ));
        }
        let mut pos = logical_offset;
        let mut filled = 0usize;
        while filled < dst.len() {
            let page = pos / PAYLOAD_PER_PAGE as u64;
            let in_page = (pos % PAYLOAD_PER_PAGE as u64) as usize;
            let take = (PAYLOAD_PER_PAGE - in_page).min(dst.len() - filled);
            if let Some(payload) = self.dirty.get(&page) {
                dst[filled..filled + take].copy_from_slice(&payload[in_page..in_page + take]);
            } else {
                let payload = self.committed_payload(page)?;
                dst[filled..filled + take].copy_from_slice(&payload[in_page..in_page + take]);
            }
            filled += take;
            pos += take as u64;
        }
        Ok(())
    }

    /// Write `src` starting at `logical_offset`, growing the logical length
    /// as needed. Data lands in the dirty-page cache until `flush`.
    pub fn write(&mut self, logical_offset: u64, src: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(Error::internal("write on a read-only paged stream"));
        }
        let end = logical_offset
            .checked_add(src.len() as u64)
            .ok_or_else(|| Error::new(ErrorKind::WriteFailed, "write range overflows"))?;
        let mut pos = logical_offset;
        let mut taken = 0usize;
        while taken < src.len() {
            let page = pos / PAYLOAD_PER_PAGE as u64;
            let in_page = (pos % PAYLOAD_PER_PAGE as u64) as usize;
            let take = (PAYLOAD_PER_PAGE - in_page).min(src.len() - taken);
            let mut payload = match self.dirty.remove(&page) {
                Some(p) => p,
                None => Box::new(self.committed_payload(page)?),
            };
            payload[in_page..in_page + take].copy_from_slice(&src[taken..taken + take]);
            self.dirty.insert(page, payload);
            taken += take;
            pos += take as u64;
        }
        self.logical_length = self.logical_length.max(end);
        Ok(())
    }

    /// Grow the logical length to `new_logical_length`.
    ///
    /// The new space reads as zeros until written.
    pub fn extend(&mut self, new_logical_length: u64) -> Result<()> {
        if !self.writable {
            return Err(Error::internal("extend on a read-only paged stream"));
        }
        if new_logical_length < self.logical_length {
            return Err(Error::bad_api_argument(format!(
                "extend to {new_logical_length} would shrink logical length {}",
                self.logical_length
            )));
        }
        self.logical_length = new_logical_length;
        Ok(())
    }

    /// Write all dirty pages in ascending physical order, then fsync.
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty.is_empty() {
            return self.sync();
        }
        let highest = *self.dirty.keys().next_back().expect("dirty not empty");
        let mut indices: Vec<u64> = self.dirty.keys().copied().collect();
        // Pages between the committed frontier and the highest dirty page
        // that were never written must still land on disk as valid
        // (zero-payload) pages so the file stays contiguous.
        for idx in self.committed_pages..=highest {
            if !self.dirty.contains_key(&idx) {
                indices.push(idx);
            }
        }
        indices.sort_unstable();
        for idx in indices {
            let payload = self
                .dirty
                .remove(&idx)
                .unwrap_or_else(|| Box::new([0u8; PAYLOAD_PER_PAGE]));
            let mut page = [0u8; PAGE_SIZE];
            page[..PAYLOAD_PER_PAGE].copy_from_slice(&payload[..]);
            let crc = page_checksum(&payload[..]);
            page[PAYLOAD_PER_PAGE..].copy_from_slice(&crc.to_le_bytes());
            self.write_physical_page(idx, &page)?;
            self.committed_pages = self.committed_pages.max(idx + 1);
        }
        self.sync()
    }

    fn sync(&mut self) -> Result<()> {
        if let Backing::Disk { file, .. } = &self.backing {
            file.lock()
                .sync_all()
                .map_err(|e| Error::io(ErrorKind::CloseFailed, "fsync", &e))?;
        }
        Ok(())
    }

    fn write_physical_page(&mut self, idx: u64, page: &[u8; PAGE_SIZE]) -> Result<()> {
        match &mut self.backing {
            Backing::Disk { file, .. } => {
                let mut file = file.lock();
                file.seek(SeekFrom::Start(idx * PAGE_SIZE as u64))
                    .map_err(|e| Error::io(ErrorKind::LseekFailed, &format!("seek page {idx}"), &e))?;
                file.write_all(page)
                    .map_err(|e| Error::io(ErrorKind::WriteFailed, &format!("write page {idx}"), &e))?;
            }
            Backing::Memory { buf } => {
                let end = (idx + 1) as usize * PAGE_SIZE;
                if buf.len() < end {
                    buf.resize(end, 0);
                }
                buf[end - PAGE_SIZE..end].copy_from_slice(page);
            }
        }
        Ok(())
    }

    /// Payload of page `idx` as present in the backing; zeros beyond the
    /// committed frontier. Verifies the CRC per policy.
    fn committed_payload(&self, idx: u64) -> Result<[u8; PAYLOAD_PER_PAGE]> {
        if idx >= self.committed_pages {
            return Ok([0u8; PAYLOAD_PER_PAGE]);
        }
        let mut page = [0u8; PAGE_SIZE];
        match &self.backing {
            Backing::Disk { file, .. } => {
                let mut file = file.lock();
                file.seek(SeekFrom::Start(idx * PAGE_SIZE as u64))
                    .map_err(|e| Error::io(ErrorKind::LseekFailed, &format!("seek page {idx}"), &e))?;
                file.read_exact(&mut page)
                    .map_err(|e| Error::io(ErrorKind::ReadFailed, &format!("read page {idx}"), &e))?;
            }
            Backing::Memory { buf } => {
                let start = idx as usize * PAGE_SIZE;
                page.copy_from_slice(&buf[start..start + PAGE_SIZE]);
            }
        }
        if self.policy.should_verify(idx) {
            let stored = u32::from_le_bytes(page[PAYLOAD_PER_PAGE..].try_into().unwrap());
            let computed = page_checksum(&page[..PAYLOAD_PER_PAGE]);
            if stored != computed {
                tracing::debug!(page = idx, stored, computed, "page checksum mismatch");
                return Err(Error::new(
                    ErrorKind::BadChecksum,
                    format!("page {idx} failed CRC verification"),
                ));
            }
        }
        let mut payload = [0u8; PAYLOAD_PER_PAGE];
        payload.copy_from_slice(&page[..PAYLOAD_PER_PAGE]);
        Ok(payload)
    }

    /// Drop the backing file handle and unlink the file from disk.
    ///
    /// After this the stream reads as an empty in-memory buffer. No-op for
    /// memory backings.
    pub fn unlink(&mut self) -> std::io::Result<()> {
        self.dirty.clear();
        self.logical_length = 0;
        self.committed_pages = 0;
        let backing = std::mem::replace(&mut self.backing, Backing::Memory { buf: Vec::new() });
        if let Backing::Disk { file, path } = backing {
            drop(file);
            std::fs::remove_file(&path)
        } else {
            Ok(())
        }
    }

    /// Consume a memory-backed stream and return its buffer.
    ///
    /// Test helper; `None` for disk backings.
    pub fn into_memory(self) -> Option<Vec<u8>> {
        match self.backing {
            Backing::Memory { buf } => Some(buf),
            Backing::Disk { .. } => None,
        }
    }
}
