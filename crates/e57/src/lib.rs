//! Library for reading and writing ASTM E57 3D imaging data files.
//!
//! An E57 file is a paged, checksummed container holding a typed metadata
//! tree plus packed binary point-cloud payloads. This crate provides the
//! file session ([`ImageFile`]), the node tree ([`Node`]), the extension
//! namespace registry, and compressed-vector record I/O.
//!
//! # Writing
//!
//! ```no_run
//! use e57::{ImageFile, SessionOptions};
//!
//! # fn main() -> e57::Result<()> {
//! let imf = ImageFile::create("/tmp/scan.e57", SessionOptions::default())?;
//! imf.extensions_add("demo", "http://example.com/DemoExtension")?;
//! let value = imf.new_integer(7, 0, 1023)?;
//! imf.root()?.set("value", &value)?;
//! imf.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Reading
//!
//! ```no_run
//! use e57::{ImageFile, SessionOptions};
//!
//! # fn main() -> e57::Result<()> {
//! let imf = ImageFile::open("/tmp/scan.e57", SessionOptions::default())?;
//! let value = imf.root()?.get("value")?.integer_value()?;
//! imf.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Sessions and teardown
//!
//! A write session either completes through [`ImageFile::close`], leaving
//! a finished file on disk, or it does not complete and leaves *no* file:
//! [`ImageFile::cancel`] and dropping the last open handle both unlink the
//! partially written file, including on unwind paths.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cv;
mod extensions;
mod node;
mod session;
mod xml;

pub use cv::{CompressedVectorReader, CompressedVectorWriter, SourceDestBuffer};
pub use extensions::E57_V1_0_URI;
pub use node::{FloatPrecision, Node, NodeKind};
pub use session::{ImageFile, SessionOptions};

pub use e57_core::{ChecksumPolicy, Error, ErrorKind, Result};
pub use e57_format::RecordValues;
