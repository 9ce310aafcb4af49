//! On-disk byte formats for the e57 file library.
//!
//! This crate centralizes everything that touches raw bytes:
//! - `paged`: the paged checksummed random-access stream
//! - `header`: the fixed file header at logical offset 0
//! - `packet`: the data-packet framing of compressed-vector payloads
//! - `codec`: per-field record encoding for compressed vectors
//!
//! Keeping serialization separate from session logic (how the tree and the
//! I/O registries are managed) makes format evolution easier to manage.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod crc;
pub mod header;
pub mod packet;
pub mod paged;

pub use codec::{FieldCodec, FieldKind, FixedWidthCodec, PrototypeField, RecordValues};
pub use crc::{page_checksum, CHECKSUM_SIZE};
pub use header::{FileHeader, FILE_HEADER_SIZE, FILE_SIGNATURE, VERSION_MAJOR, VERSION_MINOR};
pub use packet::{DataPacket, DATA_PACKET_MAX};
pub use paged::{PagedFile, PAGE_SIZE, PAYLOAD_PER_PAGE};
