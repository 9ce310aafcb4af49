//! Tree → XML serialization.

use super::emit_err;
use crate::extensions::{ExtensionRegistry, E57_V1_0_URI};
use crate::node::{NodeId, NodeValue, Tree, ROOT};
use e57_core::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// Serialize the tree to an XML document.
pub(crate) fn emit(tree: &Tree, extensions: &ExtensionRegistry) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(emit_err)?;

    let mut root = BytesStart::new("e57Root");
    root.push_attribute(("type", "Structure"));
    root.push_attribute(("xmlns", E57_V1_0_URI));
    for (prefix, uri) in extensions.iter() {
        root.push_attribute((format!("xmlns:{prefix}").as_str(), uri));
    }
    writer.write_event(Event::Start(root)).map_err(emit_err)?;

    if let NodeValue::Structure { children } = &tree.slot(ROOT).value {
        for (name, child) in children {
            emit_node(&mut writer, tree, name, *child)?;
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("e57Root")))
        .map_err(emit_err)?;
    Ok(writer.into_inner())
}

fn emit_node(
    writer: &mut Writer<Vec<u8>>,
    tree: &Tree,
    name: &str,
    id: NodeId,
) -> Result<()> {
    let mut start = BytesStart::new(name);
    match &tree.slot(id).value {
        NodeValue::Integer { value, min, max } => {
            start.push_attribute(("type", "Integer"));
            start.push_attribute(("minimum", min.to_string().as_str()));
            start.push_attribute(("maximum", max.to_string().as_str()));
            emit_leaf(writer, start, name, &value.to_string())
        }
        NodeValue::ScaledInteger {
            raw,
            min,
            max,
            scale,
            offset,
        } => {
            start.push_attribute(("type", "ScaledInteger"));
            start.push_attribute(("minimum", min.to_string().as_str()));
            start.push_attribute(("maximum", max.to_string().as_str()));
            start.push_attribute(("scale", fmt_f64(*scale).as_str()));
            start.push_attribute(("offset", fmt_f64(*offset).as_str()));
            emit_leaf(writer, start, name, &raw.to_string())
        }
        NodeValue::Float {
            value,
            double,
            min,
            max,
        } => {
            start.push_attribute(("type", "Float"));
            start.push_attribute(("precision", if *double { "double" } else { "single" }));
            start.push_attribute(("minimum", fmt_f64(*min).as_str()));
            start.push_attribute(("maximum", fmt_f64(*max).as_str()));
            let text = if *double {
                fmt_f64(*value)
            } else {
                fmt_f64(*value as f32 as f64)
            };
            emit_leaf(writer, start, name, &text)
        }
        NodeValue::String { value } => {
            start.push_attribute(("type", "String"));
            if value.is_empty() {
                writer.write_event(Event::Empty(start)).map_err(emit_err)?;
                Ok(())
            } else {
                emit_leaf(writer, start, name, value)
            }
        }
        NodeValue::Blob { offset, length } => {
            start.push_attribute(("type", "Blob"));
            start.push_attribute(("fileOffset", offset.to_string().as_str()));
            start.push_attribute(("length", length.to_string().as_str()));
            writer.write_event(Event::Empty(start)).map_err(emit_err)?;
            Ok(())
        }
        NodeValue::Structure { children } => {
            start.push_attribute(("type", "Structure"));
            writer.write_event(Event::Start(start)).map_err(emit_err)?;
            for (child_name, child) in children {
                emit_node(writer, tree, child_name, *child)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(emit_err)
        }
        NodeValue::Vector {
            children,
            allow_heterogeneous,
        } => {
            start.push_attribute(("type", "Vector"));
            start.push_attribute((
                "allowHeterogeneousChildren",
                if *allow_heterogeneous { "1" } else { "0" },
            ));
            writer.write_event(Event::Start(start)).map_err(emit_err)?;
            for child in children {
                emit_node(writer, tree, "vectorChild", *child)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(emit_err)
        }
        NodeValue::CompressedVector {
            prototype,
            codecs,
            record_count,
            offset,
            section_length,
        } => {
            start.push_attribute(("type", "CompressedVector"));
            start.push_attribute(("fileOffset", offset.to_string().as_str()));
            start.push_attribute(("sectionLength", section_length.to_string().as_str()));
            start.push_attribute(("recordCount", record_count.to_string().as_str()));
            writer.write_event(Event::Start(start)).map_err(emit_err)?;
            emit_node(writer, tree, "prototype", *prototype)?;
            emit_node(writer, tree, "codecs", *codecs)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(emit_err)
        }
    }
}

fn emit_leaf(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'_>,
    name: &str,
    text: &str,
) -> Result<()> {
    writer.write_event(Event::Start(start)).map_err(emit_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(emit_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(emit_err)
}

/// Shortest representation that parses back to the same f64.
fn fmt_f64(v: f64) -> String {
    format!("{v}")
}
