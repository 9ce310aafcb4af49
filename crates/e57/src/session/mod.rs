//! Session lifecycle: the image file open/close/cancel state machine.
//!
//! An [`ImageFile`] wraps one open E57 file for reading or writing. Public
//! handles share one inner session; node, writer, and reader handles hold
//! references counted against the session's invariants. In write mode a
//! successful `close` leaves a complete file on disk; every other
//! termination path (explicit `cancel`, or dropping the last handle while
//! still open) unlinks the file, including on unwind.

use crate::extensions::ExtensionRegistry;
use crate::node::{Node, NodeValue, Tree, ROOT};
use crate::xml;
use crate::FloatPrecision;
use e57_core::{name, ChecksumPolicy, Error, ErrorKind, Result};
use e57_format::paged::{PagedFile, PAYLOAD_PER_PAGE};
use e57_format::FileHeader;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options for opening or creating an image file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Fraction of page reads that verify their CRC.
    pub checksum_policy: ChecksumPolicy,
}

impl SessionOptions {
    /// Options with the given checksum policy.
    pub fn with_checksum_policy(policy: ChecksumPolicy) -> Self {
        SessionOptions {
            checksum_policy: policy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Read,
    Write,
}

pub(crate) struct SessionState {
    pub mode: Mode,
    pub open: bool,
    pub file_name: String,
    pub header: FileHeader,
    pub tree: Tree,
    pub extensions: ExtensionRegistry,
    /// Logical end of the payload area; grows as blobs and compressed
    /// vectors append.
    pub payload_end: u64,
    pub writer_count: usize,
    pub reader_count: usize,
}

pub(crate) struct ImageFileInner {
    pub(crate) state: RwLock<SessionState>,
    /// Shared-exclusive guard over the paged stream: concurrent readers
    /// share it, the writer and structural operations take it exclusively.
    pub(crate) store: RwLock<PagedFile>,
}

impl Drop for ImageFileInner {
    fn drop(&mut self) {
        let canceled = {
            let state = self.state.get_mut();
            if state.open && state.mode == Mode::Write {
                state.open = false;
                Some(state.file_name.clone())
            } else {
                None
            }
        };
        if let Some(file_name) = canceled {
            warn!(file = %file_name, "write session dropped while open; discarding file");
            if let Err(e) = self.store.get_mut().unlink() {
                warn!(file = %file_name, error = %e, "failed to unlink discarded file");
            }
        }
    }
}

/// An open ASTM E57 imaging data file.
///
/// Handles are cheap clones of one shared session; two handles compare
/// equal exactly when they refer to the same session.
#[derive(Clone)]
pub struct ImageFile {
    inner: Arc<ImageFileInner>,
}

impl ImageFile {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a new file at `path` for writing.
    ///
    /// The file is created immediately with a placeholder header; the tree
    /// is serialized into it on [`close`](ImageFile::close). If creation
    /// fails partway, no file is left on disk.
    pub fn create(path: impl AsRef<Path>, options: SessionOptions) -> Result<ImageFile> {
        let path = path.as_ref();
        let mut store = PagedFile::create(path, options.checksum_policy)?;
        let header = FileHeader::placeholder();
        if let Err(e) = Self::init_write_store(&mut store, &header) {
            let _ = store.unlink();
            return Err(e);
        }
        let file_name = path.display().to_string();
        info!(file = %file_name, "created write session");
        Ok(ImageFile {
            inner: Arc::new(ImageFileInner {
                state: RwLock::new(SessionState {
                    mode: Mode::Write,
                    open: true,
                    file_name,
                    header,
                    tree: Tree::new(),
                    extensions: ExtensionRegistry::new(),
                    payload_end: PAYLOAD_PER_PAGE as u64,
                    writer_count: 0,
                    reader_count: 0,
                }),
                store: RwLock::new(store),
            }),
        })
    }

    fn init_write_store(store: &mut PagedFile, header: &FileHeader) -> Result<()> {
        store.write(0, &header.to_bytes())?;
        // Payload area begins at the end of the first page's payload.
        store.extend(PAYLOAD_PER_PAGE as u64)
    }

    /// Open an existing file at `path` for reading.
    pub fn open(path: impl AsRef<Path>, options: SessionOptions) -> Result<ImageFile> {
        let path = path.as_ref();
        let store = PagedFile::open(path, options.checksum_policy)?;
        let file_name = path.display().to_string();
        Self::open_read(store, file_name)
    }

    /// Open an in-memory image of a file for reading.
    pub fn from_buffer(bytes: &[u8], options: SessionOptions) -> Result<ImageFile> {
        let store = PagedFile::from_buffer(bytes, options.checksum_policy)?;
        Self::open_read(store, "<memory>".to_owned())
    }

    fn open_read(store: PagedFile, file_name: String) -> Result<ImageFile> {
        let mut header_bytes = [0u8; e57_format::FILE_HEADER_SIZE];
        store.read(0, &mut header_bytes)?;
        let header = FileHeader::from_bytes(&header_bytes)?;
        header.validate(store.physical_length())?;

        let mut xml_bytes = vec![0u8; header.xml_logical_length as usize];
        store.read(header.xml_logical_offset, &mut xml_bytes)?;
        let (tree, extensions) = xml::parse(
            &xml_bytes,
            PAYLOAD_PER_PAGE as u64,
            header.xml_logical_offset,
        )?;

        debug!(file = %file_name, nodes = tree.len(), "opened read session");
        Ok(ImageFile {
            inner: Arc::new(ImageFileInner {
                state: RwLock::new(SessionState {
                    mode: Mode::Read,
                    open: true,
                    file_name,
                    header,
                    tree,
                    extensions,
                    payload_end: header.xml_logical_offset,
                    writer_count: 0,
                    reader_count: 0,
                }),
                store: RwLock::new(store),
            }),
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Complete a write session and close the file.
    ///
    /// In write mode this serializes the tree to XML, appends it, patches
    /// the header, and flushes. Live writers or readers make this an error
    /// and the session stays open; any failure *during* sealing still
    /// transitions the session to closed, leaving the on-disk file in an
    /// undefined state the caller must discard. Closing an already-closed
    /// or read-mode session is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.inner.state.write();
        if !state.open {
            return Ok(());
        }
        match state.mode {
            Mode::Read => {
                state.open = false;
                debug!(file = %state.file_name, "closed read session");
                Ok(())
            }
            Mode::Write => {
                if state.writer_count > 0 || state.reader_count > 0 {
                    return Err(Error::bad_api_argument(format!(
                        "cannot close with {} writer(s) and {} reader(s) open",
                        state.writer_count, state.reader_count
                    )));
                }
                let result = self.seal(&mut state);
                state.open = false;
                match &result {
                    Ok(()) => info!(file = %state.file_name, "closed write session"),
                    Err(e) => {
                        warn!(file = %state.file_name, error = %e, "close failed; file must be discarded")
                    }
                }
                result
            }
        }
    }

    fn seal(&self, state: &mut SessionState) -> Result<()> {
        let xml_bytes = xml::emit(&state.tree, &state.extensions)?;
        let xml_offset = state
            .payload_end
            .next_multiple_of(PAYLOAD_PER_PAGE as u64);
        let mut store = self.inner.store.write();
        if xml_offset > store.logical_length() {
            store.extend(xml_offset)?;
        }
        store.write(xml_offset, &xml_bytes)?;
        state.header.xml_logical_offset = xml_offset;
        state.header.xml_logical_length = xml_bytes.len() as u64;
        state.header.physical_length = store.physical_length();
        let header_bytes = state.header.to_bytes();
        store.write(0, &header_bytes)?;
        store.flush()
    }

    /// Stop all I/O and discard a partially written file.
    ///
    /// In write mode the file on disk is deleted; in read mode this equals
    /// [`close`](ImageFile::close). Never raises; failures on the way out
    /// are logged and swallowed. A no-op once closed.
    pub fn cancel(&self) {
        let mut state = self.inner.state.write();
        if !state.open {
            return;
        }
        state.open = false;
        match state.mode {
            Mode::Read => debug!(file = %state.file_name, "canceled read session"),
            Mode::Write => {
                info!(file = %state.file_name, "canceled write session; discarding file");
                if let Err(e) = self.inner.store.write().unlink() {
                    warn!(file = %state.file_name, error = %e, "failed to unlink canceled file");
                }
            }
        }
    }

    /// True while the session is open.
    pub fn is_open(&self) -> bool {
        self.inner.state.read().open
    }

    /// True when the session was opened in write mode.
    pub fn is_writable(&self) -> bool {
        self.inner.state.read().mode == Mode::Write
    }

    /// The file name the session was created with (`<memory>` for buffer
    /// sessions).
    pub fn file_name(&self) -> String {
        self.inner.state.read().file_name.clone()
    }

    /// Number of live compressed-vector writers.
    pub fn writer_count(&self) -> Result<usize> {
        self.with_open_state(|st| Ok(st.writer_count))
    }

    /// Number of live compressed-vector readers.
    pub fn reader_count(&self) -> Result<usize> {
        self.with_open_state(|st| Ok(st.reader_count))
    }

    // ------------------------------------------------------------------
    // Tree access and node factories
    // ------------------------------------------------------------------

    /// The pre-established root Structure of the file.
    pub fn root(&self) -> Result<Node> {
        self.with_open_state(|_| Ok(()))?;
        Ok(Node::new(&self.inner, ROOT))
    }

    /// New unattached Integer node; `value` must lie in `[min, max]`.
    pub fn new_integer(&self, value: i64, min: i64, max: i64) -> Result<Node> {
        self.alloc_node(|| {
            if min > max {
                return Err(Error::bad_api_argument(format!(
                    "integer bounds [{min}, {max}] are inverted"
                )));
            }
            if value < min || value > max {
                return Err(Error::new(
                    ErrorKind::ValueOutOfBounds,
                    format!("integer {value} outside [{min}, {max}]"),
                ));
            }
            Ok(NodeValue::Integer { value, min, max })
        })
    }

    /// New unattached ScaledInteger node carrying `raw` with the given raw
    /// bounds and scale/offset mapping.
    pub fn new_scaled_integer(
        &self,
        raw: i64,
        min: i64,
        max: i64,
        scale: f64,
        offset: f64,
    ) -> Result<Node> {
        self.alloc_node(|| {
            if min > max {
                return Err(Error::bad_api_argument(format!(
                    "scaled integer bounds [{min}, {max}] are inverted"
                )));
            }
            if scale == 0.0 || !scale.is_finite() || !offset.is_finite() {
                return Err(Error::bad_api_argument(
                    "scaled integer scale must be finite and nonzero",
                ));
            }
            if raw < min || raw > max {
                return Err(Error::new(
                    ErrorKind::ValueOutOfBounds,
                    format!("raw value {raw} outside [{min}, {max}]"),
                ));
            }
            Ok(NodeValue::ScaledInteger {
                raw,
                min,
                max,
                scale,
                offset,
            })
        })
    }

    /// New unattached Float node.
    pub fn new_float(
        &self,
        value: f64,
        precision: FloatPrecision,
        min: f64,
        max: f64,
    ) -> Result<Node> {
        self.alloc_node(|| {
            if min > max {
                return Err(Error::bad_api_argument(format!(
                    "float bounds [{min}, {max}] are inverted"
                )));
            }
            if value < min || value > max {
                return Err(Error::new(
                    ErrorKind::ValueOutOfBounds,
                    format!("float {value} outside [{min}, {max}]"),
                ));
            }
            let double = precision == FloatPrecision::Double;
            // Single precision rounds at creation so the stored value is
            // exactly what the file will carry.
            let value = if double { value } else { value as f32 as f64 };
            Ok(NodeValue::Float {
                value,
                double,
                min,
                max,
            })
        })
    }

    /// New unattached String node.
    pub fn new_string(&self, value: impl Into<String>) -> Result<Node> {
        let value = value.into();
        self.alloc_node(|| Ok(NodeValue::String { value }))
    }

    /// New unattached Structure node.
    pub fn new_structure(&self) -> Result<Node> {
        self.alloc_node(|| Ok(NodeValue::Structure { children: Vec::new() }))
    }

    /// New unattached Vector node.
    pub fn new_vector(&self, allow_heterogeneous: bool) -> Result<Node> {
        self.alloc_node(|| {
            Ok(NodeValue::Vector {
                children: Vec::new(),
                allow_heterogeneous,
            })
        })
    }

    /// New unattached Blob node, reserving `byte_count` bytes of payload.
    ///
    /// Write mode only: the payload space is claimed at creation.
    pub fn new_blob(&self, byte_count: u64) -> Result<Node> {
        let inner = &self.inner;
        let mut state = inner.state.write();
        if !state.open {
            return Err(Error::not_open("image file is closed"));
        }
        if state.mode == Mode::Read {
            return Err(Error::read_only("cannot create blobs in read mode"));
        }
        if state.writer_count > 0 {
            // The live writer owns the end of the payload area.
            return Err(Error::bad_api_argument(
                "cannot reserve blob space while a writer is open",
            ));
        }
        let offset = state.payload_end;
        let new_end = offset
            .checked_add(byte_count)
            .ok_or_else(|| Error::bad_api_argument("blob length overflows the payload area"))?;
        inner.store.write().extend(new_end)?;
        state.payload_end = new_end;
        let id = state.tree.alloc(NodeValue::Blob {
            offset,
            length: byte_count,
        });
        Ok(Node::new(inner, id))
    }

    /// New unattached CompressedVector node over `prototype`, with an
    /// optional codecs Vector (an empty one is created otherwise).
    ///
    /// The prototype and codecs become children of the new node.
    pub fn new_compressed_vector(
        &self,
        prototype: &Node,
        codecs: Option<&Node>,
    ) -> Result<Node> {
        if !std::sync::Weak::ptr_eq(&prototype.file, &Arc::downgrade(&self.inner)) {
            return Err(Error::bad_api_argument(
                "prototype belongs to a different image file",
            ));
        }
        if let Some(codecs) = codecs {
            if !std::sync::Weak::ptr_eq(&codecs.file, &Arc::downgrade(&self.inner)) {
                return Err(Error::bad_api_argument(
                    "codecs belongs to a different image file",
                ));
            }
        }
        let mut state = self.inner.state.write();
        if !state.open {
            return Err(Error::not_open("image file is closed"));
        }
        if !matches!(
            state.tree.slot(prototype.id).value,
            NodeValue::Structure { .. }
        ) {
            return Err(Error::bad_api_argument("prototype must be a Structure"));
        }
        if state.tree.slot(prototype.id).attached {
            return Err(Error::new(
                ErrorKind::AlreadyHasParent,
                "prototype is already attached",
            ));
        }
        let codecs_id = match codecs {
            Some(codecs) => {
                if !matches!(state.tree.slot(codecs.id).value, NodeValue::Vector { .. }) {
                    return Err(Error::bad_api_argument("codecs must be a Vector"));
                }
                if state.tree.slot(codecs.id).attached {
                    return Err(Error::new(
                        ErrorKind::AlreadyHasParent,
                        "codecs is already attached",
                    ));
                }
                codecs.id
            }
            None => state.tree.alloc(NodeValue::Vector {
                children: Vec::new(),
                allow_heterogeneous: true,
            }),
        };
        let cv = state.tree.alloc(NodeValue::CompressedVector {
            prototype: prototype.id,
            codecs: codecs_id,
            record_count: 0,
            offset: 0,
            section_length: 0,
        });
        state.tree.attach_cv_children(cv, prototype.id, codecs_id);
        Ok(Node::new(&self.inner, cv))
    }

    fn alloc_node(&self, build: impl FnOnce() -> Result<NodeValue>) -> Result<Node> {
        let value = build()?;
        let mut state = self.inner.state.write();
        if !state.open {
            return Err(Error::not_open("image file is closed"));
        }
        let id = state.tree.alloc(value);
        Ok(Node::new(&self.inner, id))
    }

    // ------------------------------------------------------------------
    // Extensions
    // ------------------------------------------------------------------

    /// Declare an extension `(prefix, uri)` pair.
    pub fn extensions_add(&self, prefix: &str, uri: &str) -> Result<()> {
        let mut state = self.inner.state.write();
        if !state.open {
            return Err(Error::not_open("image file is closed"));
        }
        if state.mode == Mode::Read {
            return Err(Error::read_only("cannot declare extensions in read mode"));
        }
        state.extensions.add(prefix, uri)
    }

    /// URI declared for `prefix` (the empty prefix is the default
    /// namespace); `None` when well-formed but undeclared.
    pub fn extensions_lookup_prefix(&self, prefix: &str) -> Result<Option<String>> {
        self.with_open_state(|st| {
            Ok(st.extensions.lookup_prefix(prefix)?.map(str::to_owned))
        })
    }

    /// Prefix declared for `uri`; `None` when undeclared.
    pub fn extensions_lookup_uri(&self, uri: &str) -> Result<Option<String>> {
        self.with_open_state(|st| Ok(st.extensions.lookup_uri(uri)?.map(str::to_owned)))
    }

    /// Number of declared extensions.
    pub fn extensions_count(&self) -> Result<usize> {
        self.with_open_state(|st| Ok(st.extensions.count()))
    }

    /// The `index`-th extension prefix, in ascending prefix order.
    pub fn extensions_prefix(&self, index: usize) -> Result<String> {
        self.with_open_state(|st| st.extensions.prefix_at(index).map(str::to_owned))
    }

    /// The `index`-th extension URI; corresponds to
    /// [`extensions_prefix`](ImageFile::extensions_prefix).
    pub fn extensions_uri(&self, index: usize) -> Result<String> {
        self.with_open_state(|st| st.extensions.uri_at(index).map(str::to_owned))
    }

    // ------------------------------------------------------------------
    // Element-name helpers
    // ------------------------------------------------------------------

    /// True if the element name parses and carries a prefix.
    pub fn is_element_name_extended(&self, element_name: &str) -> bool {
        name::is_element_name_extended(element_name)
    }

    /// Parse an element name into `(prefix, local_part)`.
    pub fn element_name_parse(&self, element_name: &str) -> Result<(String, String)> {
        name::parse_element_name(element_name)
    }

    // ------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------

    /// Check the session invariants; with `recursive`, the whole tree's
    /// too. A closed session trivially passes.
    pub fn check_invariant(&self, recursive: bool) -> Result<()> {
        let state = self.inner.state.read();
        if !state.open {
            return Ok(());
        }
        let violation = |context: &str| Error::new(ErrorKind::InvarianceViolation, context);
        if state.file_name.is_empty() {
            return Err(violation("session has an empty file name"));
        }
        if state.writer_count > 1 {
            return Err(violation("more than one live writer"));
        }
        if state.writer_count == 1 {
            if state.mode != Mode::Write {
                return Err(violation("writer on a read-mode session"));
            }
            if state.reader_count > 0 {
                return Err(violation("readers coexist with a writer"));
            }
        }
        state.extensions.check_invariant()?;
        state
            .tree
            .check_node(ROOT, &state.extensions, recursive)
    }

    fn with_open_state<R>(&self, f: impl FnOnce(&SessionState) -> Result<R>) -> Result<R> {
        let state = self.inner.state.read();
        if !state.open {
            return Err(Error::not_open("image file is closed"));
        }
        f(&state)
    }
}

impl PartialEq for ImageFile {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ImageFile {}

impl std::fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("ImageFile")
            .field("file_name", &state.file_name)
            .field("open", &state.open)
            .field("writable", &(state.mode == Mode::Write))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_close_leaves_readable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("basic.e57");
        let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
        assert!(imf.is_open());
        assert!(imf.is_writable());
        imf.close().unwrap();
        assert!(!imf.is_open());

        let back = ImageFile::open(&path, SessionOptions::default()).unwrap();
        assert!(back.is_open());
        assert!(!back.is_writable());
        assert_eq!(back.root().unwrap().child_count().unwrap(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let imf = ImageFile::create(dir.path().join("twice.e57"), SessionOptions::default())
            .unwrap();
        imf.close().unwrap();
        imf.close().unwrap();
    }

    #[test]
    fn operations_after_close_fail() {
        let dir = tempdir().unwrap();
        let imf = ImageFile::create(dir.path().join("closed.e57"), SessionOptions::default())
            .unwrap();
        let root = imf.root().unwrap();
        imf.close().unwrap();
        assert_eq!(
            imf.root().unwrap_err().kind(),
            ErrorKind::ImageFileNotOpen
        );
        assert_eq!(
            root.child_count().unwrap_err().kind(),
            ErrorKind::ImageFileNotOpen
        );
    }

    #[test]
    fn cancel_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("canceled.e57");
        let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
        assert!(path.exists());
        imf.cancel();
        assert!(!imf.is_open());
        assert!(!path.exists());
    }

    #[test]
    fn drop_without_close_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dropped.e57");
        {
            let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
            let _node = imf.new_integer(1, 0, 10).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn handles_share_one_session() {
        let dir = tempdir().unwrap();
        let imf = ImageFile::create(dir.path().join("ident.e57"), SessionOptions::default())
            .unwrap();
        let other = imf.clone();
        assert_eq!(imf, other);
        other.close().unwrap();
        assert!(!imf.is_open());
    }

    #[test]
    fn factories_validate_bounds() {
        let dir = tempdir().unwrap();
        let imf = ImageFile::create(dir.path().join("bounds.e57"), SessionOptions::default())
            .unwrap();
        assert_eq!(
            imf.new_integer(11, 0, 10).unwrap_err().kind(),
            ErrorKind::ValueOutOfBounds
        );
        assert_eq!(
            imf.new_integer(0, 10, 0).unwrap_err().kind(),
            ErrorKind::BadApiArgument
        );
        assert_eq!(
            imf.new_scaled_integer(1, 0, 10, 0.0, 0.0).unwrap_err().kind(),
            ErrorKind::BadApiArgument
        );
        assert_eq!(
            imf.new_float(2.0, FloatPrecision::Double, -1.0, 1.0)
                .unwrap_err()
                .kind(),
            ErrorKind::ValueOutOfBounds
        );
        imf.cancel();
    }

    #[test]
    fn read_mode_rejects_mutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.e57");
        let imf = ImageFile::create(&path, SessionOptions::default()).unwrap();
        imf.extensions_add("demo", "http://example.com/D").unwrap();
        let child = imf.new_integer(1, 0, 10).unwrap();
        imf.root().unwrap().set("v", &child).unwrap();
        imf.close().unwrap();

        let back = ImageFile::open(&path, SessionOptions::default()).unwrap();
        assert_eq!(
            back.extensions_add("x", "http://x").unwrap_err().kind(),
            ErrorKind::FileIsReadOnly
        );
        let orphan = back.new_integer(2, 0, 10).unwrap();
        assert_eq!(
            back.root().unwrap().set("w", &orphan).unwrap_err().kind(),
            ErrorKind::FileIsReadOnly
        );
        assert_eq!(
            back.new_blob(10).unwrap_err().kind(),
            ErrorKind::FileIsReadOnly
        );
    }

    #[test]
    fn check_invariant_passes_on_fresh_session() {
        let dir = tempdir().unwrap();
        let imf = ImageFile::create(dir.path().join("inv.e57"), SessionOptions::default())
            .unwrap();
        imf.extensions_add("demo", "http://example.com/D").unwrap();
        imf.check_invariant(true).unwrap();
        imf.cancel();
        // Closed sessions trivially pass.
        imf.check_invariant(true).unwrap();
    }

    #[test]
    fn element_name_helpers_forward() {
        let dir = tempdir().unwrap();
        let imf = ImageFile::create(dir.path().join("names.e57"), SessionOptions::default())
            .unwrap();
        assert!(imf.is_element_name_extended("a:b"));
        assert!(!imf.is_element_name_extended("plain"));
        let (p, l) = imf.element_name_parse("a:b").unwrap();
        assert_eq!((p.as_str(), l.as_str()), ("a", "b"));
        assert!(imf.element_name_parse("a::b").is_err());
        imf.cancel();
    }
}
