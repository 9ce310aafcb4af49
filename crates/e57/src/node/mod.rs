//! Typed node tree.
//!
//! The tree is an arena: nodes live in a slot vector and refer to each
//! other by index. Parent references are indices too, so a parent keeps its
//! children alive while the back-reference keeps nothing alive — the
//! ownership direction the format requires. Exactly one root exists per
//! session (slot 0, always a Structure).
//!
//! The seven node variants are a single sum type; operations that cross
//! variants (attach, path resolution, invariant checks, XML emission) live
//! outside the variants as functions over the tree.

mod handle;

pub use handle::{FloatPrecision, Node, NodeKind};

use crate::extensions::ExtensionRegistry;
use e57_core::name::parse_element_name;
use e57_core::{Error, ErrorKind, Result};

/// Index of a node in its session's arena.
pub(crate) type NodeId = usize;

/// The root Structure of every tree.
pub(crate) const ROOT: NodeId = 0;

/// Concrete value of one node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeValue {
    Integer {
        value: i64,
        min: i64,
        max: i64,
    },
    ScaledInteger {
        raw: i64,
        min: i64,
        max: i64,
        scale: f64,
        offset: f64,
    },
    Float {
        value: f64,
        double: bool,
        min: f64,
        max: f64,
    },
    String {
        value: String,
    },
    Blob {
        /// Logical offset of the payload bytes.
        offset: u64,
        /// Logical byte length of the blob.
        length: u64,
    },
    Structure {
        /// Ordered `(name, child)` pairs; names unique.
        children: Vec<(String, NodeId)>,
    },
    Vector {
        children: Vec<NodeId>,
        allow_heterogeneous: bool,
    },
    CompressedVector {
        prototype: NodeId,
        codecs: NodeId,
        record_count: u64,
        /// Logical offset of the first payload packet (0 until a writer ran).
        offset: u64,
        /// Logical byte length of the packet run.
        section_length: u64,
    },
}

impl NodeValue {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            NodeValue::Integer { .. } => NodeKind::Integer,
            NodeValue::ScaledInteger { .. } => NodeKind::ScaledInteger,
            NodeValue::Float { .. } => NodeKind::Float,
            NodeValue::String { .. } => NodeKind::String,
            NodeValue::Blob { .. } => NodeKind::Blob,
            NodeValue::Structure { .. } => NodeKind::Structure,
            NodeValue::Vector { .. } => NodeKind::Vector,
            NodeValue::CompressedVector { .. } => NodeKind::CompressedVector,
        }
    }
}

/// One arena slot.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub value: NodeValue,
    pub parent: Option<NodeId>,
    /// Element name within the parent; empty while unattached and for the
    /// root.
    pub name: String,
    pub attached: bool,
}

/// Arena of nodes for one session.
#[derive(Debug)]
pub(crate) struct Tree {
    slots: Vec<Slot>,
}

impl Tree {
    /// New tree holding only the root Structure.
    pub fn new() -> Self {
        Tree {
            slots: vec![Slot {
                value: NodeValue::Structure { children: Vec::new() },
                parent: None,
                name: String::new(),
                attached: true,
            }],
        }
    }

    /// Allocate an unattached node.
    pub fn alloc(&mut self, value: NodeValue) -> NodeId {
        self.slots.push(Slot {
            value,
            parent: None,
            name: String::new(),
            attached: false,
        });
        self.slots.len() - 1
    }

    pub fn slot(&self, id: NodeId) -> &Slot {
        &self.slots[id]
    }

    pub fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        &mut self.slots[id]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when `maybe_ancestor` is `id` or lies on `id`'s parent chain.
    fn is_ancestor_or_self(&self, maybe_ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(c) = cursor {
            if c == maybe_ancestor {
                return true;
            }
            cursor = self.slots[c].parent;
        }
        false
    }

    /// Attach `child` under the Structure `parent` as `name`.
    ///
    /// Enforces the attach rules: the parent must be a Structure, the name
    /// must be lexically legal with any prefix declared in `extensions`,
    /// the child must not already have a parent, and the name must be free.
    pub fn attach_to_structure(
        &mut self,
        parent: NodeId,
        name: &str,
        child: NodeId,
        extensions: &ExtensionRegistry,
    ) -> Result<()> {
        let (prefix, _) = parse_element_name(name)?;
        if !extensions.is_declared(&prefix) {
            return Err(Error::new(
                ErrorKind::UndefinedNamespacePrefix,
                format!("prefix {prefix:?} in {name:?} is not declared"),
            ));
        }
        if self.slots[child].attached {
            return Err(Error::new(
                ErrorKind::AlreadyHasParent,
                format!("node is already attached as {:?}", self.slots[child].name),
            ));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(Error::bad_api_argument(
                "attaching a node under its own subtree",
            ));
        }
        let NodeValue::Structure { children } = &self.slots[parent].value else {
            return Err(Error::bad_api_argument("parent node is not a Structure"));
        };
        if children.iter().any(|(n, _)| n == name) {
            return Err(Error::new(
                ErrorKind::PathAlreadyExists,
                format!("element {name:?} already exists"),
            ));
        }
        let NodeValue::Structure { children } = &mut self.slots[parent].value else {
            unreachable!();
        };
        children.push((name.to_owned(), child));
        let slot = &mut self.slots[child];
        slot.parent = Some(parent);
        slot.name = name.to_owned();
        slot.attached = true;
        Ok(())
    }

    /// Append `child` to the Vector `parent`.
    ///
    /// A homogeneous vector rejects a child whose shape differs from its
    /// first child. Vector children are named by their index.
    pub fn attach_to_vector(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.slots[child].attached {
            return Err(Error::new(
                ErrorKind::AlreadyHasParent,
                format!("node is already attached as {:?}", self.slots[child].name),
            ));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(Error::bad_api_argument(
                "attaching a node under its own subtree",
            ));
        }
        let NodeValue::Vector {
            children,
            allow_heterogeneous,
        } = &self.slots[parent].value
        else {
            return Err(Error::bad_api_argument("parent node is not a Vector"));
        };
        if !allow_heterogeneous {
            if let Some(&first) = children.first() {
                if !self.same_shape(first, child) {
                    return Err(Error::bad_api_argument(
                        "homogeneous vector children must share one shape",
                    ));
                }
            }
        }
        let index = children.len();
        let NodeValue::Vector { children, .. } = &mut self.slots[parent].value else {
            unreachable!();
        };
        children.push(child);
        let slot = &mut self.slots[child];
        slot.parent = Some(parent);
        slot.name = index.to_string();
        slot.attached = true;
        Ok(())
    }

    /// Attach a CompressedVector's prototype and codecs children.
    pub fn attach_cv_children(&mut self, cv: NodeId, prototype: NodeId, codecs: NodeId) {
        for (id, name) in [(prototype, "prototype"), (codecs, "codecs")] {
            let slot = &mut self.slots[id];
            slot.parent = Some(cv);
            slot.name = name.to_owned();
            slot.attached = true;
        }
    }

    /// Adopt pre-validated children onto a container (XML parse path).
    pub fn adopt_children(&mut self, parent: NodeId, children: &[(String, NodeId)]) {
        for (name, child) in children {
            let slot = &mut self.slots[*child];
            slot.parent = Some(parent);
            slot.name = name.clone();
            slot.attached = true;
        }
    }

    /// Child of a Structure (or CompressedVector) by element name.
    pub fn child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        match &self.slots[parent].value {
            NodeValue::Structure { children } => children
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, id)| *id),
            NodeValue::Vector { children, .. } => name
                .parse::<usize>()
                .ok()
                .and_then(|i| children.get(i).copied()),
            NodeValue::CompressedVector {
                prototype, codecs, ..
            } => match name {
                "prototype" => Some(*prototype),
                "codecs" => Some(*codecs),
                _ => None,
            },
            _ => None,
        }
    }

    /// Children of a container in insertion order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match &self.slots[id].value {
            NodeValue::Structure { children } => children.iter().map(|(_, c)| *c).collect(),
            NodeValue::Vector { children, .. } => children.clone(),
            NodeValue::CompressedVector {
                prototype, codecs, ..
            } => vec![*prototype, *codecs],
            _ => Vec::new(),
        }
    }

    /// Resolve a slash-delimited path. A leading slash anchors at the root;
    /// otherwise resolution starts at `start`.
    pub fn resolve(&self, start: NodeId, path: &str) -> Result<NodeId> {
        let (mut cursor, rest) = match path.strip_prefix('/') {
            Some(rest) => (ROOT, rest),
            None => (start, path),
        };
        if rest.is_empty() {
            if path.is_empty() {
                return Err(Error::bad_path_name("empty path"));
            }
            return Ok(cursor);
        }
        for segment in rest.split('/') {
            // Vector children are addressed by index, which is not a legal
            // element name; accept either form.
            if segment.parse::<usize>().is_err() {
                parse_element_name(segment)?;
            }
            cursor = self.child_by_name(cursor, segment).ok_or_else(|| {
                Error::bad_path_name(format!("no element {segment:?} in path {path:?}"))
            })?;
        }
        Ok(cursor)
    }

    /// Absolute path of a node, `/`-rooted when its tree hangs off the
    /// session root.
    pub fn path_name(&self, id: NodeId) -> String {
        if id == ROOT {
            return "/".to_owned();
        }
        let mut segments = Vec::new();
        let mut cursor = id;
        loop {
            let slot = &self.slots[cursor];
            match slot.parent {
                Some(parent) => {
                    segments.push(slot.name.clone());
                    cursor = parent;
                }
                None => break,
            }
        }
        segments.reverse();
        if cursor == ROOT {
            format!("/{}", segments.join("/"))
        } else {
            segments.join("/")
        }
    }

    /// Structural shape equality, used for homogeneous vectors.
    ///
    /// Two nodes share a shape when their variants match and, for
    /// containers, their children match recursively by name and shape.
    pub fn same_shape(&self, a: NodeId, b: NodeId) -> bool {
        match (&self.slots[a].value, &self.slots[b].value) {
            (
                NodeValue::Structure { children: ca },
                NodeValue::Structure { children: cb },
            ) => {
                ca.len() == cb.len()
                    && ca.iter().zip(cb).all(|((na, ia), (nb, ib))| {
                        na == nb && self.same_shape(*ia, *ib)
                    })
            }
            (
                NodeValue::Vector { children: ca, .. },
                NodeValue::Vector { children: cb, .. },
            ) => {
                ca.len() == cb.len()
                    && ca.iter().zip(cb).all(|(ia, ib)| self.same_shape(*ia, *ib))
            }
            (va, vb) => va.kind() == vb.kind(),
        }
    }

    /// Check the tree invariants for `id` and, when `recursive`, its whole
    /// subtree. Violations surface as `InvarianceViolation`.
    pub fn check_node(
        &self,
        id: NodeId,
        extensions: &ExtensionRegistry,
        recursive: bool,
    ) -> Result<()> {
        let violation = |context: String| Error::new(ErrorKind::InvarianceViolation, context);
        let slot = &self.slots[id];
        if id == ROOT {
            if slot.parent.is_some() || !slot.attached {
                return Err(violation("root must be attached and parentless".into()));
            }
            if !matches!(slot.value, NodeValue::Structure { .. }) {
                return Err(violation("root must be a Structure".into()));
            }
        }
        match &slot.value {
            NodeValue::Integer { value, min, max } => {
                if value < min || value > max || min > max {
                    return Err(violation(format!(
                        "integer {value} outside [{min}, {max}]"
                    )));
                }
            }
            NodeValue::ScaledInteger { raw, min, max, scale, .. } => {
                if raw < min || raw > max || min > max {
                    return Err(violation(format!(
                        "scaled integer raw {raw} outside [{min}, {max}]"
                    )));
                }
                if *scale == 0.0 {
                    return Err(violation("scaled integer with zero scale".into()));
                }
            }
            NodeValue::Float { value, min, max, .. } => {
                if value < min || value > max || min > max {
                    return Err(violation(format!(
                        "float {value} outside [{min}, {max}]"
                    )));
                }
            }
            NodeValue::String { .. } | NodeValue::Blob { .. } => {}
            NodeValue::Structure { children } => {
                let mut seen = std::collections::HashSet::new();
                for (name, child) in children {
                    let (prefix, _) = parse_element_name(name)
                        .map_err(|_| violation(format!("illegal element name {name:?}")))?;
                    if !extensions.is_declared(&prefix) {
                        return Err(violation(format!(
                            "element {name:?} uses undeclared prefix {prefix:?}"
                        )));
                    }
                    if !seen.insert(name.as_str()) {
                        return Err(violation(format!("duplicate element name {name:?}")));
                    }
                    self.check_child_link(id, *child, name)?;
                }
            }
            NodeValue::Vector { children, .. } => {
                for (index, child) in children.iter().enumerate() {
                    self.check_child_link(id, *child, &index.to_string())?;
                }
            }
            NodeValue::CompressedVector {
                prototype, codecs, ..
            } => {
                if !matches!(self.slots[*prototype].value, NodeValue::Structure { .. }) {
                    return Err(violation("prototype must be a Structure".into()));
                }
                if !matches!(self.slots[*codecs].value, NodeValue::Vector { .. }) {
                    return Err(violation("codecs must be a Vector".into()));
                }
                self.check_child_link(id, *prototype, "prototype")?;
                self.check_child_link(id, *codecs, "codecs")?;
            }
        }
        if recursive {
            for child in self.children(id) {
                self.check_node(child, extensions, true)?;
            }
        }
        Ok(())
    }

    fn check_child_link(&self, parent: NodeId, child: NodeId, name: &str) -> Result<()> {
        let slot = &self.slots[child];
        if slot.parent != Some(parent) || !slot.attached || slot.name != name {
            return Err(Error::new(
                ErrorKind::InvarianceViolation,
                format!("child {name:?} has inconsistent parent linkage"),
            ));
        }
        Ok(())
    }

    /// Visit every `(id, value)` pair, attached or not.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Slot)> {
        self.slots.iter().enumerate()
    }
}
