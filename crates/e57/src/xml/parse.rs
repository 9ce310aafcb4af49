//! XML → tree parsing.
//!
//! A stack machine over the SAX-style event stream. Nodes are built
//! bottom-up: each end tag finalizes one node and hands it to the frame
//! above. Elements in extension namespaces parse structurally like any
//! other node, so unknown extension subtrees survive a round trip intact;
//! an element with no `type` attribute is a Structure.

use super::{format_err, parser_err};
use crate::extensions::ExtensionRegistry;
use crate::node::{NodeId, NodeValue, Tree, ROOT};
use e57_core::name::parse_element_name;
use e57_core::{Error, ErrorKind, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

enum Pending {
    Integer { min: i64, max: i64 },
    ScaledInteger { min: i64, max: i64, scale: f64, offset: f64 },
    Float { double: bool, min: f64, max: f64 },
    Str,
    Blob { offset: u64, length: u64 },
    Structure,
    Vector { allow_heterogeneous: bool },
    Cv { offset: u64, section_length: u64, record_count: u64 },
}

struct Frame {
    name: String,
    pending: Pending,
    children: Vec<(String, NodeId)>,
    text: String,
    is_root: bool,
}

/// Parse an XML document into a tree and its namespace registry.
///
/// `payload_start..payload_end` is the logical payload area; Blob and
/// CompressedVector references outside it raise `BadFileLength`.
pub(crate) fn parse(
    bytes: &[u8],
    payload_start: u64,
    payload_end: u64,
) -> Result<(Tree, ExtensionRegistry)> {
    if bytes.is_empty() {
        return Err(Error::new(
            ErrorKind::XmlParserInit,
            "XML section is empty",
        ));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| format_err(format!("XML section is not UTF-8: {e}")))?;
    let mut reader = Reader::from_str(text);

    let mut tree = Tree::new();
    let mut registry = ExtensionRegistry::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut root_seen = false;

    loop {
        match reader.read_event().map_err(parser_err)? {
            Event::Start(e) => {
                let frame = open_frame(&e, &stack, &mut registry, root_seen)?;
                stack.push(frame);
            }
            Event::Empty(e) => {
                let frame = open_frame(&e, &stack, &mut registry, root_seen)?;
                root_seen |= close_frame(frame, &mut stack, &mut tree)?;
            }
            Event::Text(t) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&t.unescape().map_err(parser_err)?);
                }
            }
            Event::CData(c) => {
                if let Some(frame) = stack.last_mut() {
                    let raw = c.into_inner();
                    frame.text.push_str(
                        std::str::from_utf8(&raw)
                            .map_err(|e| format_err(format!("CDATA is not UTF-8: {e}")))?,
                    );
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| format_err("unbalanced end tag"))?;
                root_seen |= close_frame(frame, &mut stack, &mut tree)?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(format_err("document ended inside an element"));
    }
    if !root_seen {
        return Err(format_err("document has no root element"));
    }

    validate_payload_references(&tree, payload_start, payload_end)?;
    Ok((tree, registry))
}

fn open_frame(
    e: &quick_xml::events::BytesStart<'_>,
    stack: &[Frame],
    registry: &mut ExtensionRegistry,
    root_seen: bool,
) -> Result<Frame> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|err| format_err(format!("element name is not UTF-8: {err}")))?
        .to_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(parser_err)?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| format_err(format!("attribute name is not UTF-8: {err}")))?
            .to_owned();
        let value = attr.unescape_value().map_err(parser_err)?.into_owned();
        attrs.push((key, value));
    }

    if stack.is_empty() {
        if root_seen {
            return Err(format_err("multiple root elements"));
        }
        // Namespace declarations live on the root element.
        for (key, value) in &attrs {
            if let Some(prefix) = key.strip_prefix("xmlns:") {
                registry.add(prefix, value)?;
            }
        }
        if attr_value(&attrs, "type").unwrap_or("Structure") != "Structure" {
            return Err(format_err("root element must be a Structure"));
        }
        return Ok(Frame {
            name,
            pending: Pending::Structure,
            children: Vec::new(),
            text: String::new(),
            is_root: true,
        });
    }

    match parse_element_name(&name) {
        Ok((prefix, _)) => {
            if !registry.is_declared(&prefix) {
                return Err(Error::new(
                    ErrorKind::UndefinedNamespacePrefix,
                    format!("element {name:?} uses undeclared prefix {prefix:?}"),
                ));
            }
        }
        Err(_) => return Err(format_err(format!("illegal element name {name:?}"))),
    }

    let pending = match attr_value(&attrs, "type").unwrap_or("Structure") {
        "Integer" => Pending::Integer {
            min: attr_i64(&attrs, "minimum", i64::MIN)?,
            max: attr_i64(&attrs, "maximum", i64::MAX)?,
        },
        "ScaledInteger" => Pending::ScaledInteger {
            min: attr_i64(&attrs, "minimum", i64::MIN)?,
            max: attr_i64(&attrs, "maximum", i64::MAX)?,
            scale: attr_f64(&attrs, "scale", 1.0)?,
            offset: attr_f64(&attrs, "offset", 0.0)?,
        },
        "Float" => {
            let double = match attr_value(&attrs, "precision").unwrap_or("double") {
                "double" => true,
                "single" => false,
                other => {
                    return Err(format_err(format!("unknown float precision {other:?}")))
                }
            };
            let (lo, hi) = if double {
                (f64::MIN, f64::MAX)
            } else {
                (f64::from(f32::MIN), f64::from(f32::MAX))
            };
            Pending::Float {
                double,
                min: attr_f64(&attrs, "minimum", lo)?,
                max: attr_f64(&attrs, "maximum", hi)?,
            }
        }
        "String" => Pending::Str,
        "Blob" => Pending::Blob {
            offset: attr_u64_required(&attrs, "fileOffset", &name)?,
            length: attr_u64_required(&attrs, "length", &name)?,
        },
        "Structure" => Pending::Structure,
        "Vector" => Pending::Vector {
            allow_heterogeneous: match attr_value(&attrs, "allowHeterogeneousChildren") {
                None | Some("0") => false,
                Some("1") => true,
                Some(other) => {
                    return Err(format_err(format!(
                        "bad allowHeterogeneousChildren value {other:?}"
                    )))
                }
            },
        },
        "CompressedVector" => Pending::Cv {
            offset: attr_u64(&attrs, "fileOffset", 0)?,
            section_length: attr_u64(&attrs, "sectionLength", 0)?,
            record_count: attr_u64(&attrs, "recordCount", 0)?,
        },
        other => return Err(format_err(format!("unknown node type {other:?}"))),
    };

    Ok(Frame {
        name,
        pending,
        children: Vec::new(),
        text: String::new(),
        is_root: false,
    })
}

/// Finalize a frame into a node and hand it to the frame above. Returns
/// true when the root was finalized.
fn close_frame(frame: Frame, stack: &mut Vec<Frame>, tree: &mut Tree) -> Result<bool> {
    if frame.is_root {
        check_unique_names(&frame.children)?;
        let NodeValue::Structure { children } = &mut tree.slot_mut(ROOT).value else {
            unreachable!("root slot is always a Structure");
        };
        *children = frame.children.clone();
        tree.adopt_children(ROOT, &frame.children);
        return Ok(true);
    }

    let value = match frame.pending {
        Pending::Integer { min, max } => {
            let value = leaf_i64(&frame.text, &frame.name)?;
            if value < min || value > max {
                return Err(Error::new(
                    ErrorKind::ValueOutOfBounds,
                    format!("integer {value} outside [{min}, {max}] in {:?}", frame.name),
                ));
            }
            NodeValue::Integer { value, min, max }
        }
        Pending::ScaledInteger {
            min,
            max,
            scale,
            offset,
        } => {
            let raw = leaf_i64(&frame.text, &frame.name)?;
            if raw < min || raw > max {
                return Err(Error::new(
                    ErrorKind::ValueOutOfBounds,
                    format!("raw value {raw} outside [{min}, {max}] in {:?}", frame.name),
                ));
            }
            NodeValue::ScaledInteger {
                raw,
                min,
                max,
                scale,
                offset,
            }
        }
        Pending::Float { double, min, max } => {
            let value = leaf_f64(&frame.text, &frame.name)?;
            if value < min || value > max {
                return Err(Error::new(
                    ErrorKind::ValueOutOfBounds,
                    format!("float {value} outside [{min}, {max}] in {:?}", frame.name),
                ));
            }
            NodeValue::Float {
                value,
                double,
                min,
                max,
            }
        }
        Pending::Str => NodeValue::String { value: frame.text },
        Pending::Blob { offset, length } => NodeValue::Blob { offset, length },
        Pending::Structure => {
            check_unique_names(&frame.children)?;
            let id = tree.alloc(NodeValue::Structure {
                children: frame.children.clone(),
            });
            tree.adopt_children(id, &frame.children);
            return attach_to_parent(stack, frame.name, id);
        }
        Pending::Vector {
            allow_heterogeneous,
        } => {
            let ids: Vec<NodeId> = frame.children.iter().map(|(_, id)| *id).collect();
            let indexed: Vec<(String, NodeId)> = ids
                .iter()
                .enumerate()
                .map(|(i, id)| (i.to_string(), *id))
                .collect();
            let id = tree.alloc(NodeValue::Vector {
                children: ids,
                allow_heterogeneous,
            });
            tree.adopt_children(id, &indexed);
            return attach_to_parent(stack, frame.name, id);
        }
        Pending::Cv {
            offset,
            section_length,
            record_count,
        } => {
            let mut prototype = None;
            let mut codecs = None;
            for (child_name, child_id) in &frame.children {
                match child_name.as_str() {
                    "prototype" => prototype = Some(*child_id),
                    "codecs" => codecs = Some(*child_id),
                    other => {
                        return Err(format_err(format!(
                            "unexpected element {other:?} in CompressedVector {:?}",
                            frame.name
                        )))
                    }
                }
            }
            let prototype = prototype.ok_or_else(|| {
                format_err(format!(
                    "CompressedVector {:?} has no prototype",
                    frame.name
                ))
            })?;
            if !matches!(tree.slot(prototype).value, NodeValue::Structure { .. }) {
                return Err(format_err("prototype must be a Structure"));
            }
            let codecs = match codecs {
                Some(id) => {
                    if !matches!(tree.slot(id).value, NodeValue::Vector { .. }) {
                        return Err(format_err("codecs must be a Vector"));
                    }
                    id
                }
                None => tree.alloc(NodeValue::Vector {
                    children: Vec::new(),
                    allow_heterogeneous: true,
                }),
            };
            let id = tree.alloc(NodeValue::CompressedVector {
                prototype,
                codecs,
                record_count,
                offset,
                section_length,
            });
            tree.attach_cv_children(id, prototype, codecs);
            return attach_to_parent(stack, frame.name, id);
        }
    };
    let id = tree.alloc(value);
    attach_to_parent(stack, frame.name, id)
}

fn attach_to_parent(stack: &mut [Frame], name: String, id: NodeId) -> Result<bool> {
    let parent = stack
        .last_mut()
        .ok_or_else(|| format_err("element outside the root"))?;
    parent.children.push((name, id));
    Ok(false)
}

fn check_unique_names(children: &[(String, NodeId)]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for (name, _) in children {
        if !seen.insert(name.as_str()) {
            return Err(format_err(format!("duplicate element name {name:?}")));
        }
    }
    Ok(())
}

fn validate_payload_references(tree: &Tree, payload_start: u64, payload_end: u64) -> Result<()> {
    for (_, slot) in tree.iter() {
        let (offset, length, what) = match &slot.value {
            NodeValue::Blob { offset, length } => (*offset, *length, "blob"),
            NodeValue::CompressedVector {
                offset,
                section_length,
                ..
            } => {
                if *offset == 0 && *section_length == 0 {
                    continue; // empty compressed vector
                }
                (*offset, *section_length, "compressed vector")
            }
            _ => continue,
        };
        let end = offset
            .checked_add(length)
            .ok_or_else(|| Error::new(ErrorKind::BadFileLength, "payload range overflows"))?;
        if offset < payload_start || end > payload_end {
            return Err(Error::new(
                ErrorKind::BadFileLength,
                format!(
                    "{what} payload [{offset}, {end}) outside payload area [{payload_start}, {payload_end})"
                ),
            ));
        }
    }
    Ok(())
}

fn attr_value<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn attr_i64(attrs: &[(String, String)], key: &str, default: i64) -> Result<i64> {
    match attr_value(attrs, key) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| format_err(format!("bad {key} attribute {v:?}: {e}"))),
    }
}

fn attr_u64(attrs: &[(String, String)], key: &str, default: u64) -> Result<u64> {
    match attr_value(attrs, key) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| format_err(format!("bad {key} attribute {v:?}: {e}"))),
    }
}

fn attr_u64_required(attrs: &[(String, String)], key: &str, element: &str) -> Result<u64> {
    match attr_value(attrs, key) {
        None => Err(format_err(format!(
            "element {element:?} is missing required attribute {key}"
        ))),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| format_err(format!("bad {key} attribute {v:?}: {e}"))),
    }
}

fn attr_f64(attrs: &[(String, String)], key: &str, default: f64) -> Result<f64> {
    match attr_value(attrs, key) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| format_err(format!("bad {key} attribute {v:?}: {e}"))),
    }
}

fn leaf_i64(text: &str, element: &str) -> Result<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse()
        .map_err(|e| format_err(format!("bad integer value in {element:?}: {e}")))
}

fn leaf_f64(text: &str, element: &str) -> Result<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    trimmed
        .parse()
        .map_err(|e| format_err(format!("bad float value in {element:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::emit;

    fn payload_area() -> (u64, u64) {
        (1020, 1_000_000)
    }

    fn parse_doc(doc: &str) -> Result<(Tree, ExtensionRegistry)> {
        let (start, end) = payload_area();
        parse(doc.as_bytes(), start, end)
    }

    const NS: &str = "xmlns=\"http://www.astm.org/COMMIT/E57/2010-e57-v1.0\"";

    #[test]
    fn minimal_document() {
        let doc = format!("<e57Root type=\"Structure\" {NS}/>");
        let (tree, registry) = parse_doc(&doc).unwrap();
        assert_eq!(registry.count(), 0);
        assert!(tree.children(ROOT).is_empty());
    }

    #[test]
    fn integer_leaf_with_bounds() {
        let doc = format!(
            "<e57Root type=\"Structure\" {NS}>\
               <value type=\"Integer\" minimum=\"0\" maximum=\"1023\">7</value>\
             </e57Root>"
        );
        let (tree, _) = parse_doc(&doc).unwrap();
        let id = tree.child_by_name(ROOT, "value").unwrap();
        assert_eq!(
            tree.slot(id).value,
            NodeValue::Integer {
                value: 7,
                min: 0,
                max: 1023
            }
        );
    }

    #[test]
    fn namespace_declarations_fill_registry() {
        let doc = format!(
            "<e57Root type=\"Structure\" {NS} xmlns:demo=\"http://example.com/D\">\
               <demo:extra type=\"String\">hi</demo:extra>\
             </e57Root>"
        );
        let (tree, registry) = parse_doc(&doc).unwrap();
        assert_eq!(registry.lookup_prefix("demo").unwrap(), Some("http://example.com/D"));
        assert!(tree.child_by_name(ROOT, "demo:extra").is_some());
    }

    #[test]
    fn undeclared_prefix_rejected() {
        let doc = format!(
            "<e57Root type=\"Structure\" {NS}>\
               <ghost:extra type=\"String\"/>\
             </e57Root>"
        );
        let err = parse_doc(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedNamespacePrefix);
    }

    #[test]
    fn missing_type_means_structure() {
        let doc = format!(
            "<e57Root type=\"Structure\" {NS}><bag><x type=\"Integer\">1</x></bag></e57Root>"
        );
        let (tree, _) = parse_doc(&doc).unwrap();
        let bag = tree.child_by_name(ROOT, "bag").unwrap();
        assert!(matches!(tree.slot(bag).value, NodeValue::Structure { .. }));
    }

    #[test]
    fn unknown_type_rejected() {
        let doc = format!("<e57Root type=\"Structure\" {NS}><x type=\"Quaternion\"/></e57Root>");
        let err = parse_doc(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadXmlFormat);
    }

    #[test]
    fn malformed_xml_is_a_parser_error() {
        let doc = format!("<e57Root type=\"Structure\" {NS}><open></e57Root>");
        let err = parse_doc(&doc).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::XmlParser | ErrorKind::BadXmlFormat
        ));
    }

    #[test]
    fn empty_section_is_parser_init() {
        let err = parse(b"", 1020, 2040).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::XmlParserInit);
    }

    #[test]
    fn blob_outside_payload_area_rejected() {
        let doc = format!(
            "<e57Root type=\"Structure\" {NS}>\
               <b type=\"Blob\" fileOffset=\"10\" length=\"100\"/>\
             </e57Root>"
        );
        let err = parse_doc(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadFileLength);
    }

    #[test]
    fn duplicate_structure_names_rejected() {
        let doc = format!(
            "<e57Root type=\"Structure\" {NS}>\
               <x type=\"Integer\">1</x><x type=\"Integer\">2</x>\
             </e57Root>"
        );
        let err = parse_doc(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadXmlFormat);
    }

    #[test]
    fn emit_parse_round_trip_structural() {
        let mut tree = Tree::new();
        let mut registry = ExtensionRegistry::new();
        registry.add("demo", "http://example.com/D").unwrap();

        let i = tree.alloc(NodeValue::Integer { value: 7, min: 0, max: 1023 });
        tree.attach_to_structure(ROOT, "value", i, &registry).unwrap();
        let s = tree.alloc(NodeValue::String { value: "a <b> & c".into() });
        tree.attach_to_structure(ROOT, "demo:note", s, &registry).unwrap();
        let f = tree.alloc(NodeValue::Float {
            value: std::f64::consts::PI,
            double: true,
            min: -10.0,
            max: 10.0,
        });
        tree.attach_to_structure(ROOT, "angle", f, &registry).unwrap();
        let v = tree.alloc(NodeValue::Vector { children: Vec::new(), allow_heterogeneous: true });
        tree.attach_to_structure(ROOT, "list", v, &registry).unwrap();
        let e0 = tree.alloc(NodeValue::Integer { value: 1, min: 0, max: 10 });
        tree.attach_to_vector(v, e0).unwrap();

        let bytes = emit(&tree, &registry).unwrap();
        let (start, end) = payload_area();
        let (parsed, parsed_registry) = parse(&bytes, start, end).unwrap();

        assert_eq!(parsed_registry.count(), 1);
        let value = parsed.child_by_name(ROOT, "value").unwrap();
        assert_eq!(
            parsed.slot(value).value,
            NodeValue::Integer { value: 7, min: 0, max: 1023 }
        );
        let note = parsed.child_by_name(ROOT, "demo:note").unwrap();
        assert_eq!(
            parsed.slot(note).value,
            NodeValue::String { value: "a <b> & c".into() }
        );
        let angle = parsed.child_by_name(ROOT, "angle").unwrap();
        assert_eq!(
            parsed.slot(angle).value,
            NodeValue::Float {
                value: std::f64::consts::PI,
                double: true,
                min: -10.0,
                max: 10.0,
            }
        );
        let list = parsed.child_by_name(ROOT, "list").unwrap();
        assert_eq!(parsed.children(list).len(), 1);
    }
}
