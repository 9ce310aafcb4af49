//! Core types shared by every layer of the e57 file library.
//!
//! This crate holds the pieces that have no I/O of their own:
//! - `error`: the flat error taxonomy used across the workspace
//! - `name`: element-name lexing (`ID` and `ID:ID` forms)
//! - `policy`: the read-checksum verification policy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod name;
pub mod policy;

pub use error::{Error, ErrorKind, Result};
pub use name::{is_element_name_extended, parse_element_name};
pub use policy::ChecksumPolicy;
