//! XML bridge: tree ⇄ XML serialization.
//!
//! The element structure of the document mirrors the tree; attributes
//! encode the variant kind, numeric ranges, scale/offset, and payload
//! locations. Namespace declarations at the document root list every
//! declared extension alongside the default E57 namespace.

mod emit;
mod parse;

pub(crate) use emit::emit;
pub(crate) use parse::parse;

use e57_core::{Error, ErrorKind};

fn emit_err(e: impl std::fmt::Display) -> Error {
    Error::internal(format!("xml emit: {e}"))
}

fn parser_err(e: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::XmlParser, format!("xml parse: {e}"))
}

fn format_err(context: impl Into<String>) -> Error {
    Error::new(ErrorKind::BadXmlFormat, context)
}
