//! Data-packet framing of compressed-vector payloads.
//!
//! A compressed-vector's payload is a run of variable-length data packets
//! appended to the payload area. Each packet interleaves one byte chunk per
//! prototype field ("stream").
//!
//! # Packet Layout
//!
//! ```text
//! ┌──────────┬───────────┬──────────────────┬──────────────────┬─────────────────────┬─────────┬─────┐
//! │ type (1) │ flags (1) │ length-1 u16 (2) │ stream count (2) │ stream bytes u16 ×N │ streams │ pad │
//! └──────────┴───────────┴──────────────────┴──────────────────┴─────────────────────┴─────────┴─────┘
//! ```
//!
//! `length` counts the whole packet including header and padding; packets
//! are padded with zeros to a 4-byte boundary and never exceed 64 KiB, so
//! `length - 1` fits in a u16.

use e57_core::{Error, ErrorKind, Result};

/// Packet type tag for data packets.
pub const DATA_PACKET_TYPE: u8 = 1;

/// Maximum total packet length in bytes.
pub const DATA_PACKET_MAX: usize = 64 * 1024;

/// Fixed part of the packet header, before the per-stream byte counts.
const FIXED_HEADER: usize = 6;

/// A parsed data packet: one byte chunk per stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// Per-stream byte chunks, in prototype field order.
    pub streams: Vec<Vec<u8>>,
}

/// Header bytes for a packet with `stream_count` streams.
pub fn header_size(stream_count: usize) -> usize {
    FIXED_HEADER + 2 * stream_count
}

/// Largest total stream payload a single packet can carry.
pub fn max_stream_bytes(stream_count: usize) -> usize {
    DATA_PACKET_MAX - header_size(stream_count) - 3
}

/// Total packet length for the given packet prefix (first 4 bytes).
pub fn packed_length(prefix: &[u8; 4]) -> Result<usize> {
    if prefix[0] != DATA_PACKET_TYPE {
        return Err(Error::new(
            ErrorKind::BadFileLength,
            format!("expected data packet, found type {}", prefix[0]),
        ));
    }
    Ok(u16::from_le_bytes([prefix[2], prefix[3]]) as usize + 1)
}

impl DataPacket {
    /// Pack stream chunks into packet bytes.
    ///
    /// Callers are responsible for chunking: each stream must fit a u16
    /// byte count and the whole packet must stay under [`DATA_PACKET_MAX`].
    pub fn pack(streams: &[&[u8]]) -> Result<Vec<u8>> {
        if streams.is_empty() || streams.len() > u16::MAX as usize {
            return Err(Error::internal(format!(
                "data packet with {} streams",
                streams.len()
            )));
        }
        let data_bytes: usize = streams.iter().map(|s| s.len()).sum();
        let unpadded = header_size(streams.len()) + data_bytes;
        let total = unpadded.next_multiple_of(4);
        if total > DATA_PACKET_MAX {
            return Err(Error::internal(format!(
                "data packet of {total} bytes exceeds {DATA_PACKET_MAX}"
            )));
        }
        for stream in streams {
            if stream.len() > u16::MAX as usize {
                return Err(Error::internal(format!(
                    "stream chunk of {} bytes exceeds u16",
                    stream.len()
                )));
            }
        }
        let mut bytes = Vec::with_capacity(total);
        bytes.push(DATA_PACKET_TYPE);
        bytes.push(0); // flags
        bytes.extend_from_slice(&((total - 1) as u16).to_le_bytes());
        bytes.extend_from_slice(&(streams.len() as u16).to_le_bytes());
        for stream in streams {
            bytes.extend_from_slice(&(stream.len() as u16).to_le_bytes());
        }
        for stream in streams {
            bytes.extend_from_slice(stream);
        }
        bytes.resize(total, 0);
        Ok(bytes)
    }

    /// Parse packet bytes produced by [`DataPacket::pack`].
    ///
    /// `bytes` must be exactly the packet (length from [`packed_length`]).
    pub fn unpack(bytes: &[u8]) -> Result<DataPacket> {
        if bytes.len() < FIXED_HEADER {
            return Err(Error::new(
                ErrorKind::BadFileLength,
                "data packet shorter than its fixed header",
            ));
        }
        if bytes[0] != DATA_PACKET_TYPE {
            return Err(Error::new(
                ErrorKind::BadFileLength,
                format!("expected data packet, found type {}", bytes[0]),
            ));
        }
        let recorded = u16::from_le_bytes([bytes[2], bytes[3]]) as usize + 1;
        if recorded != bytes.len() {
            return Err(Error::new(
                ErrorKind::BadFileLength,
                format!("data packet records {recorded} bytes, have {}", bytes.len()),
            ));
        }
        let stream_count = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
        let header = header_size(stream_count);
        if bytes.len() < header {
            return Err(Error::new(
                ErrorKind::BadFileLength,
                "data packet shorter than its stream-count header",
            ));
        }
        let mut streams = Vec::with_capacity(stream_count);
        let mut offset = header;
        for i in 0..stream_count {
            let at = FIXED_HEADER + 2 * i;
            let len = u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize;
            let end = offset + len;
            if end > bytes.len() {
                return Err(Error::new(
                    ErrorKind::BadFileLength,
                    format!("stream {i} of {len} bytes overruns the packet"),
                ));
            }
            streams.push(bytes[offset..end].to_vec());
            offset = end;
        }
        Ok(DataPacket { streams })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let a = vec![1u8, 2, 3];
        let b = vec![9u8; 700];
        let bytes = DataPacket::pack(&[&a, &b]).unwrap();
        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(packed_length(bytes[..4].try_into().unwrap()).unwrap(), bytes.len());
        let packet = DataPacket::unpack(&bytes).unwrap();
        assert_eq!(packet.streams, vec![a, b]);
    }

    #[test]
    fn empty_streams_allowed() {
        let bytes = DataPacket::pack(&[&[], &[1u8]]).unwrap();
        let packet = DataPacket::unpack(&bytes).unwrap();
        assert_eq!(packet.streams[0], Vec::<u8>::new());
        assert_eq!(packet.streams[1], vec![1]);
    }

    #[test]
    fn oversized_packet_rejected() {
        let big = vec![0u8; DATA_PACKET_MAX];
        let err = DataPacket::pack(&[&big]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn wrong_type_rejected() {
        let mut bytes = DataPacket::pack(&[&[1u8, 2]]).unwrap();
        bytes[0] = 7;
        assert!(DataPacket::unpack(&bytes).is_err());
        assert!(packed_length(bytes[..4].try_into().unwrap()).is_err());
    }

    #[test]
    fn truncated_packet_rejected() {
        let bytes = DataPacket::pack(&[&[1u8; 100]]).unwrap();
        let err = DataPacket::unpack(&bytes[..bytes.len() - 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadFileLength);
    }

    #[test]
    fn max_stream_bytes_fits() {
        let budget = max_stream_bytes(2);
        let a = vec![0u8; budget / 2];
        let b = vec![0u8; budget - a.len()];
        let bytes = DataPacket::pack(&[&a, &b]).unwrap();
        assert!(bytes.len() <= DATA_PACKET_MAX);
    }
}
