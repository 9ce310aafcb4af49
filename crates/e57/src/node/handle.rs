//! Public node handle.
//!
//! A [`Node`] is a lightweight handle: the id of an arena slot plus a weak
//! reference to the owning session. Handles stay cheap to clone and never
//! keep the session alive; using a handle after its session is gone (or
//! closed) surfaces as `ImageFileNotOpen`.

use crate::node::{NodeId, NodeValue, ROOT};
use crate::session::{ImageFileInner, Mode, SessionState};
use e57_core::{Error, Result};
use std::sync::{Arc, Weak};

/// Variant of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Bounded integer leaf
    Integer,
    /// Raw integer with scale/offset mapping to a physical quantity
    ScaledInteger,
    /// IEEE float leaf
    Float,
    /// UTF-8 text leaf
    String,
    /// Opaque byte payload in the binary section
    Blob,
    /// Ordered name → child mapping
    Structure,
    /// Ordered child sequence
    Vector,
    /// Packed record sequence in the binary section
    CompressedVector,
}

/// Precision of a Float node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatPrecision {
    /// 32-bit IEEE float
    Single,
    /// 64-bit IEEE float
    Double,
}

/// Handle to one node of a session's tree.
#[derive(Clone)]
pub struct Node {
    pub(crate) file: Weak<ImageFileInner>,
    pub(crate) id: NodeId,
}

impl Node {
    pub(crate) fn new(file: &Arc<ImageFileInner>, id: NodeId) -> Self {
        Node {
            file: Arc::downgrade(file),
            id,
        }
    }

    fn session(&self) -> Result<Arc<ImageFileInner>> {
        self.file
            .upgrade()
            .ok_or_else(|| Error::not_open("owning image file no longer exists"))
    }

    fn with_state<R>(&self, f: impl FnOnce(&SessionState) -> Result<R>) -> Result<R> {
        let inner = self.session()?;
        let state = inner.state.read();
        if !state.open {
            return Err(Error::not_open("image file is closed"));
        }
        f(&state)
    }

    fn with_state_mut<R>(&self, f: impl FnOnce(&mut SessionState) -> Result<R>) -> Result<R> {
        let inner = self.session()?;
        let mut state = inner.state.write();
        if !state.open {
            return Err(Error::not_open("image file is closed"));
        }
        f(&mut state)
    }

    /// The variant of this node.
    pub fn kind(&self) -> Result<NodeKind> {
        self.with_state(|st| Ok(st.tree.slot(self.id).value.kind()))
    }

    /// Element name within the parent; empty for the root and for
    /// unattached nodes.
    pub fn element_name(&self) -> Result<String> {
        self.with_state(|st| Ok(st.tree.slot(self.id).name.clone()))
    }

    /// Absolute path of this node (`/` for the root).
    pub fn path_name(&self) -> Result<String> {
        self.with_state(|st| Ok(st.tree.path_name(self.id)))
    }

    /// Parent handle; the root is its own parent.
    pub fn parent(&self) -> Result<Node> {
        let id = self.with_state(|st| Ok(st.tree.slot(self.id).parent.unwrap_or(self.id)))?;
        Ok(Node {
            file: self.file.clone(),
            id,
        })
    }

    /// True for the session root.
    pub fn is_root(&self) -> Result<bool> {
        self.with_state(|_| Ok(self.id == ROOT))
    }

    /// True once the node has been attached to a parent (the root always
    /// is).
    pub fn is_attached(&self) -> Result<bool> {
        self.with_state(|st| Ok(st.tree.slot(self.id).attached))
    }

    // ------------------------------------------------------------------
    // Container operations
    // ------------------------------------------------------------------

    /// Attach `child` under this Structure as `name`.
    pub fn set(&self, name: &str, child: &Node) -> Result<()> {
        self.require_same_file(child)?;
        self.with_state_mut(|st| {
            if st.mode == Mode::Read {
                return Err(Error::read_only("cannot attach nodes in read mode"));
            }
            st.tree
                .attach_to_structure(self.id, name, child.id, &st.extensions)
        })
    }

    /// Append `child` to this Vector.
    pub fn append(&self, child: &Node) -> Result<()> {
        self.require_same_file(child)?;
        self.with_state_mut(|st| {
            if st.mode == Mode::Read {
                return Err(Error::read_only("cannot attach nodes in read mode"));
            }
            st.tree.attach_to_vector(self.id, child.id)
        })
    }

    /// Resolve a slash-delimited path relative to this node (absolute when
    /// it starts with `/`).
    pub fn get(&self, path: &str) -> Result<Node> {
        let id = self.with_state(|st| st.tree.resolve(self.id, path))?;
        Ok(Node {
            file: self.file.clone(),
            id,
        })
    }

    /// True when `path` resolves to a node.
    pub fn is_defined(&self, path: &str) -> Result<bool> {
        self.with_state(|st| Ok(st.tree.resolve(self.id, path).is_ok()))
    }

    /// Number of children (Structure, Vector, or CompressedVector).
    pub fn child_count(&self) -> Result<usize> {
        self.with_state(|st| match &st.tree.slot(self.id).value {
            NodeValue::Structure { children } => Ok(children.len()),
            NodeValue::Vector { children, .. } => Ok(children.len()),
            NodeValue::CompressedVector { .. } => Ok(2),
            _ => Err(Error::bad_api_argument("node has no children")),
        })
    }

    /// Child at `index` in insertion order.
    pub fn child_at(&self, index: usize) -> Result<Node> {
        let id = self.with_state(|st| {
            st.tree
                .children(self.id)
                .get(index)
                .copied()
                .ok_or_else(|| Error::bad_api_argument(format!("child index {index} out of range")))
        })?;
        Ok(Node {
            file: self.file.clone(),
            id,
        })
    }

    // ------------------------------------------------------------------
    // Leaf accessors
    // ------------------------------------------------------------------

    fn expect<R>(
        &self,
        what: &str,
        f: impl FnOnce(&NodeValue) -> Option<R>,
    ) -> Result<R> {
        self.with_state(|st| {
            f(&st.tree.slot(self.id).value)
                .ok_or_else(|| Error::bad_api_argument(format!("node is not {what}")))
        })
    }

    /// Value of an Integer node.
    pub fn integer_value(&self) -> Result<i64> {
        self.expect("an Integer", |v| match v {
            NodeValue::Integer { value, .. } => Some(*value),
            _ => None,
        })
    }

    /// Declared `(min, max)` of an Integer node.
    pub fn integer_bounds(&self) -> Result<(i64, i64)> {
        self.expect("an Integer", |v| match v {
            NodeValue::Integer { min, max, .. } => Some((*min, *max)),
            _ => None,
        })
    }

    /// Raw value of a ScaledInteger node.
    pub fn scaled_integer_raw(&self) -> Result<i64> {
        self.expect("a ScaledInteger", |v| match v {
            NodeValue::ScaledInteger { raw, .. } => Some(*raw),
            _ => None,
        })
    }

    /// Scaled value `raw * scale + offset` of a ScaledInteger node.
    pub fn scaled_integer_value(&self) -> Result<f64> {
        self.expect("a ScaledInteger", |v| match v {
            NodeValue::ScaledInteger {
                raw, scale, offset, ..
            } => Some(*raw as f64 * scale + offset),
            _ => None,
        })
    }

    /// Declared raw `(min, max)` of a ScaledInteger node.
    pub fn scaled_integer_bounds(&self) -> Result<(i64, i64)> {
        self.expect("a ScaledInteger", |v| match v {
            NodeValue::ScaledInteger { min, max, .. } => Some((*min, *max)),
            _ => None,
        })
    }

    /// Scale factor of a ScaledInteger node.
    pub fn scaled_integer_scale(&self) -> Result<f64> {
        self.expect("a ScaledInteger", |v| match v {
            NodeValue::ScaledInteger { scale, .. } => Some(*scale),
            _ => None,
        })
    }

    /// Offset of a ScaledInteger node.
    pub fn scaled_integer_offset(&self) -> Result<f64> {
        self.expect("a ScaledInteger", |v| match v {
            NodeValue::ScaledInteger { offset, .. } => Some(*offset),
            _ => None,
        })
    }

    /// Value of a Float node.
    pub fn float_value(&self) -> Result<f64> {
        self.expect("a Float", |v| match v {
            NodeValue::Float { value, .. } => Some(*value),
            _ => None,
        })
    }

    /// Precision of a Float node.
    pub fn float_precision(&self) -> Result<FloatPrecision> {
        self.expect("a Float", |v| match v {
            NodeValue::Float { double, .. } => Some(if *double {
                FloatPrecision::Double
            } else {
                FloatPrecision::Single
            }),
            _ => None,
        })
    }

    /// Declared `(min, max)` of a Float node.
    pub fn float_bounds(&self) -> Result<(f64, f64)> {
        self.expect("a Float", |v| match v {
            NodeValue::Float { min, max, .. } => Some((*min, *max)),
            _ => None,
        })
    }

    /// Value of a String node.
    pub fn string_value(&self) -> Result<String> {
        self.expect("a String", |v| match v {
            NodeValue::String { value } => Some(value.clone()),
            _ => None,
        })
    }

    /// Flag of a Vector node.
    pub fn vector_allows_heterogeneous(&self) -> Result<bool> {
        self.expect("a Vector", |v| match v {
            NodeValue::Vector {
                allow_heterogeneous,
                ..
            } => Some(*allow_heterogeneous),
            _ => None,
        })
    }

    // ------------------------------------------------------------------
    // Blob payload access
    // ------------------------------------------------------------------

    /// Logical byte length of a Blob node.
    pub fn blob_byte_count(&self) -> Result<u64> {
        self.expect("a Blob", |v| match v {
            NodeValue::Blob { length, .. } => Some(*length),
            _ => None,
        })
    }

    /// Read `dst.len()` blob bytes starting at `start`.
    pub fn blob_read(&self, dst: &mut [u8], start: u64) -> Result<()> {
        let inner = self.session()?;
        let offset = {
            let state = inner.state.read();
            if !state.open {
                return Err(Error::not_open("image file is closed"));
            }
            let NodeValue::Blob { offset, length } = state.tree.slot(self.id).value else {
                return Err(Error::bad_api_argument("node is not a Blob"));
            };
            let end = start
                .checked_add(dst.len() as u64)
                .ok_or_else(|| Error::bad_api_argument("blob read range overflows"))?;
            if end > length {
                return Err(Error::bad_api_argument(format!(
                    "blob read [{start}, {end}) past length {length}"
                )));
            }
            offset
        };
        let result = inner.store.read().read(offset + start, dst);
        result
    }

    /// Write `src` into the blob payload starting at `start`.
    pub fn blob_write(&self, src: &[u8], start: u64) -> Result<()> {
        let inner = self.session()?;
        let offset = {
            let state = inner.state.read();
            if !state.open {
                return Err(Error::not_open("image file is closed"));
            }
            if state.mode == Mode::Read {
                return Err(Error::read_only("cannot write blob in read mode"));
            }
            let NodeValue::Blob { offset, length } = state.tree.slot(self.id).value else {
                return Err(Error::bad_api_argument("node is not a Blob"));
            };
            let end = start
                .checked_add(src.len() as u64)
                .ok_or_else(|| Error::bad_api_argument("blob write range overflows"))?;
            if end > length {
                return Err(Error::bad_api_argument(format!(
                    "blob write [{start}, {end}) past length {length}"
                )));
            }
            offset
        };
        let result = inner.store.write().write(offset + start, src);
        result
    }

    // ------------------------------------------------------------------
    // Compressed-vector accessors
    // ------------------------------------------------------------------

    /// Records currently recorded for a CompressedVector node.
    pub fn record_count(&self) -> Result<u64> {
        self.expect("a CompressedVector", |v| match v {
            NodeValue::CompressedVector { record_count, .. } => Some(*record_count),
            _ => None,
        })
    }

    /// Prototype Structure of a CompressedVector node.
    pub fn prototype(&self) -> Result<Node> {
        let id = self.expect("a CompressedVector", |v| match v {
            NodeValue::CompressedVector { prototype, .. } => Some(*prototype),
            _ => None,
        })?;
        Ok(Node {
            file: self.file.clone(),
            id,
        })
    }

    /// Codecs Vector of a CompressedVector node.
    pub fn codecs(&self) -> Result<Node> {
        let id = self.expect("a CompressedVector", |v| match v {
            NodeValue::CompressedVector { codecs, .. } => Some(*codecs),
            _ => None,
        })?;
        Ok(Node {
            file: self.file.clone(),
            id,
        })
    }

    // ------------------------------------------------------------------
    // Invariants and identity
    // ------------------------------------------------------------------

    /// Check this node's invariants; with `recursive`, the whole subtree.
    pub fn check_invariant(&self, recursive: bool) -> Result<()> {
        self.with_state(|st| st.tree.check_node(self.id, &st.extensions, recursive))
    }

    fn require_same_file(&self, other: &Node) -> Result<()> {
        if !Weak::ptr_eq(&self.file, &other.file) {
            return Err(Error::bad_api_argument(
                "nodes belong to different image files",
            ));
        }
        Ok(())
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.file, &other.file) && self.id == other.id
    }
}

impl Eq for Node {}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = self.kind().map(|k| format!("{k:?}"));
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &kind.unwrap_or_else(|_| "<closed>".to_owned()))
            .finish()
    }
}
