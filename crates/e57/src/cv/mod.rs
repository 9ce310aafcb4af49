//! Compressed-vector I/O: writers and readers of packed record payloads.
//!
//! A writer is minted from a CompressedVector node with one source buffer
//! per prototype field; a reader with destination buffers in the same
//! shape. The session enforces the registry invariant: at most one live
//! writer, never alongside readers; any number of readers otherwise.

use crate::node::{Node, NodeValue, Tree};
use crate::session::{ImageFileInner, Mode, SessionState};
use e57_core::{Error, ErrorKind, Result};
use e57_format::codec::{FieldCodec, FieldKind, FixedWidthCodec, PrototypeField, RecordValues};
use e57_format::packet::{self, DataPacket};
use std::sync::Arc;
use tracing::warn;

/// Caller-owned transfer buffer for one prototype field.
///
/// The buffer carries the field's path below the prototype root, a column
/// of values, and a cursor (source side) or capacity (destination side).
#[derive(Debug, Clone)]
pub struct SourceDestBuffer {
    path: String,
    pub(crate) values: RecordValues,
    pub(crate) cursor: usize,
    capacity: usize,
}

impl SourceDestBuffer {
    /// Source buffer of integer values.
    pub fn source_i64(path: impl Into<String>, values: Vec<i64>) -> Self {
        let capacity = values.len();
        SourceDestBuffer {
            path: path.into(),
            values: RecordValues::I64(values),
            cursor: 0,
            capacity,
        }
    }

    /// Source buffer of double-precision values.
    pub fn source_f64(path: impl Into<String>, values: Vec<f64>) -> Self {
        let capacity = values.len();
        SourceDestBuffer {
            path: path.into(),
            values: RecordValues::F64(values),
            cursor: 0,
            capacity,
        }
    }

    /// Source buffer of single-precision values.
    pub fn source_f32(path: impl Into<String>, values: Vec<f32>) -> Self {
        let capacity = values.len();
        SourceDestBuffer {
            path: path.into(),
            values: RecordValues::F32(values),
            cursor: 0,
            capacity,
        }
    }

    /// Destination buffer receiving up to `capacity` integer values per
    /// read.
    pub fn destination_i64(path: impl Into<String>, capacity: usize) -> Self {
        SourceDestBuffer {
            path: path.into(),
            values: RecordValues::I64(Vec::with_capacity(capacity)),
            cursor: 0,
            capacity,
        }
    }

    /// Destination buffer receiving up to `capacity` doubles per read.
    pub fn destination_f64(path: impl Into<String>, capacity: usize) -> Self {
        SourceDestBuffer {
            path: path.into(),
            values: RecordValues::F64(Vec::with_capacity(capacity)),
            cursor: 0,
            capacity,
        }
    }

    /// Destination buffer receiving up to `capacity` singles per read.
    pub fn destination_f32(path: impl Into<String>, capacity: usize) -> Self {
        SourceDestBuffer {
            path: path.into(),
            values: RecordValues::F32(Vec::with_capacity(capacity)),
            cursor: 0,
            capacity,
        }
    }

    /// Field path this buffer transfers.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The value column.
    pub fn values(&self) -> &RecordValues {
        &self.values
    }

    /// Consume the buffer, returning its value column.
    pub fn into_values(self) -> RecordValues {
        self.values
    }

    /// Records consumed so far (source side).
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Flatten a prototype Structure into its leaf fields, depth-first.
fn flatten_prototype(tree: &Tree, prototype: usize) -> Result<Vec<PrototypeField>> {
    let mut fields = Vec::new();
    flatten_into(tree, prototype, "", &mut fields)?;
    if fields.is_empty() {
        return Err(Error::bad_api_argument("prototype has no fields"));
    }
    Ok(fields)
}

fn flatten_into(
    tree: &Tree,
    id: usize,
    prefix: &str,
    out: &mut Vec<PrototypeField>,
) -> Result<()> {
    match &tree.slot(id).value {
        NodeValue::Structure { children } => {
            for (name, child) in children {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                flatten_into(tree, *child, &path, out)?;
            }
            Ok(())
        }
        NodeValue::Integer { min, max, .. } => {
            out.push(PrototypeField {
                path: prefix.to_owned(),
                kind: FieldKind::Integer {
                    min: *min,
                    max: *max,
                },
            });
            Ok(())
        }
        NodeValue::ScaledInteger { min, max, .. } => {
            out.push(PrototypeField {
                path: prefix.to_owned(),
                kind: FieldKind::ScaledInteger {
                    min: *min,
                    max: *max,
                },
            });
            Ok(())
        }
        NodeValue::Float { double, .. } => {
            out.push(PrototypeField {
                path: prefix.to_owned(),
                kind: FieldKind::Float { double: *double },
            });
            Ok(())
        }
        other => Err(Error::bad_api_argument(format!(
            "prototype field {prefix:?} has unsupported kind {:?}",
            other.kind()
        ))),
    }
}

/// Reorder `buffers` into prototype field order, validating the match.
fn match_buffers(
    fields: &[PrototypeField],
    buffers: Vec<SourceDestBuffer>,
) -> Result<Vec<SourceDestBuffer>> {
    if buffers.len() != fields.len() {
        return Err(Error::bad_api_argument(format!(
            "prototype has {} fields, got {} buffers",
            fields.len(),
            buffers.len()
        )));
    }
    let mut slots: Vec<Option<SourceDestBuffer>> = (0..fields.len()).map(|_| None).collect();
    for buffer in buffers {
        let index = fields
            .iter()
            .position(|f| f.path == buffer.path)
            .ok_or_else(|| {
                Error::bad_api_argument(format!(
                    "buffer {:?} matches no prototype field",
                    buffer.path
                ))
            })?;
        if slots[index].is_some() {
            return Err(Error::bad_api_argument(format!(
                "two buffers for field {:?}",
                buffer.path
            )));
        }
        if !fields[index].kind.accepts(&buffer.values) {
            return Err(Error::bad_api_argument(format!(
                "buffer {:?} has the wrong value type for its field",
                buffer.path
            )));
        }
        slots[index] = Some(buffer);
    }
    Ok(slots.into_iter().map(|s| s.expect("all slots filled")).collect())
}

fn codecs_for(fields: &[PrototypeField]) -> Vec<FixedWidthCodec> {
    fields
        .iter()
        .map(|f| FixedWidthCodec::for_field(f.kind))
        .collect()
}

impl Node {
    /// Mint a writer for this CompressedVector node.
    ///
    /// Requires a write-mode session with no live writer and no live
    /// readers; `buffers` must supply one source buffer per prototype
    /// field, matched by path.
    pub fn writer(&self, buffers: Vec<SourceDestBuffer>) -> Result<CompressedVectorWriter> {
        CompressedVectorWriter::new(self, buffers)
    }

    /// Mint a reader for this CompressedVector node.
    ///
    /// Any number of readers may coexist; none may coexist with a writer.
    pub fn reader(&self, buffers: Vec<SourceDestBuffer>) -> Result<CompressedVectorReader> {
        CompressedVectorReader::new(self, buffers)
    }
}

impl std::fmt::Debug for CompressedVectorWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedVectorWriter").finish_non_exhaustive()
    }
}

/// Writer appending records to one compressed vector.
pub struct CompressedVectorWriter {
    inner: Arc<ImageFileInner>,
    cv: usize,
    codecs: Vec<FixedWidthCodec>,
    buffers: Vec<SourceDestBuffer>,
    /// Encoded-but-unpacked substream bytes per field.
    pending: Vec<Vec<u8>>,
    section_start: u64,
    section_end: u64,
    records_written: u64,
    open: bool,
}

impl CompressedVectorWriter {
    fn new(node: &Node, buffers: Vec<SourceDestBuffer>) -> Result<Self> {
        let inner = node
            .file
            .upgrade()
            .ok_or_else(|| Error::not_open("owning image file no longer exists"))?;
        let mut state = inner.state.write();
        if !state.open {
            return Err(Error::not_open("image file is closed"));
        }
        if state.mode != Mode::Write {
            return Err(Error::read_only("writers require a write-mode session"));
        }
        if state.writer_count > 0 {
            return Err(Error::bad_api_argument("a writer is already open"));
        }
        if state.reader_count > 0 {
            return Err(Error::bad_api_argument(
                "cannot start a writer while readers are open",
            ));
        }
        let NodeValue::CompressedVector { prototype, .. } = state.tree.slot(node.id).value
        else {
            return Err(Error::bad_api_argument("node is not a CompressedVector"));
        };
        let fields = flatten_prototype(&state.tree, prototype)?;
        let buffers = match_buffers(&fields, buffers)?;
        let codecs = codecs_for(&fields);

        let section_start = state.payload_end.next_multiple_of(4);
        if let NodeValue::CompressedVector { offset, .. } =
            &mut state.tree.slot_mut(node.id).value
        {
            *offset = section_start;
        }
        state.payload_end = section_start;
        state.writer_count = 1;

        let pending = vec![Vec::new(); codecs.len()];
        Ok(CompressedVectorWriter {
            inner: inner.clone(),
            cv: node.id,
            codecs,
            buffers,
            pending,
            section_start,
            section_end: section_start,
            records_written: 0,
            open: true,
        })
    }

    /// Encode and append `record_count` records from the source buffers.
    ///
    /// Consumes `record_count` values from each buffer's cursor; the
    /// record counter on the node advances accordingly.
    pub fn write(&mut self, record_count: usize) -> Result<()> {
        if !self.open {
            return Err(Error::bad_api_argument("writer is closed"));
        }
        let inner = self.inner.clone();
        let mut state = inner.state.write();
        if !state.open {
            return Err(Error::not_open("image file is closed"));
        }
        for buffer in &self.buffers {
            if buffer.cursor + record_count > buffer.values.len() {
                return Err(Error::bad_api_argument(format!(
                    "buffer {:?} has {} unread values, need {record_count}",
                    buffer.path,
                    buffer.values.len() - buffer.cursor
                )));
            }
        }
        for (i, buffer) in self.buffers.iter().enumerate() {
            self.codecs[i].encode(
                &buffer.values,
                buffer.cursor..buffer.cursor + record_count,
                &mut self.pending[i],
            )?;
        }
        for buffer in &mut self.buffers {
            buffer.cursor += record_count;
        }
        self.records_written += record_count as u64;
        if let NodeValue::CompressedVector { record_count, .. } =
            &mut state.tree.slot_mut(self.cv).value
        {
            *record_count = self.records_written;
        }
        self.pack_pending(&mut state, false)
    }

    /// Swap in fresh source buffers (matched against the prototype again)
    /// for the next round of writes.
    pub fn replace_buffers(&mut self, buffers: Vec<SourceDestBuffer>) -> Result<()> {
        if !self.open {
            return Err(Error::bad_api_argument("writer is closed"));
        }
        let state = self.inner.state.read();
        if !state.open {
            return Err(Error::not_open("image file is closed"));
        }
        let NodeValue::CompressedVector { prototype, .. } = state.tree.slot(self.cv).value
        else {
            return Err(Error::internal("writer lost its compressed vector"));
        };
        let fields = flatten_prototype(&state.tree, prototype)?;
        self.buffers = match_buffers(&fields, buffers)?;
        Ok(())
    }

    /// Pack pending substreams into data packets and append them.
    ///
    /// Without `force`, packs only while a full packet's worth of bytes is
    /// pending; with it, drains everything.
    fn pack_pending(&mut self, state: &mut SessionState, force: bool) -> Result<()> {
        let budget = packet::max_stream_bytes(self.pending.len());
        loop {
            let total: usize = self.pending.iter().map(Vec::len).sum();
            if total == 0 || (!force && total < budget) {
                break;
            }
            let takes: Vec<usize> = {
                let mut remaining = budget;
                self.pending
                    .iter()
                    .map(|p| {
                        let take = p.len().min(remaining);
                        remaining -= take;
                        take
                    })
                    .collect()
            };
            let chunks: Vec<&[u8]> = self
                .pending
                .iter()
                .zip(&takes)
                .map(|(p, &t)| &p[..t])
                .collect();
            let bytes = DataPacket::pack(&chunks)?;
            self.inner.store.write().write(self.section_end, &bytes)?;
            self.section_end += bytes.len() as u64;
            for (p, &t) in self.pending.iter_mut().zip(&takes) {
                p.drain(..t);
            }
        }
        state.payload_end = state.payload_end.max(self.section_end);
        Ok(())
    }

    /// Flush trailing state and detach from the session.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let inner = self.inner.clone();
        let mut state = inner.state.write();
        if !state.open {
            // Session was canceled underneath; nothing left to persist.
            state.writer_count = state.writer_count.saturating_sub(1);
            return Ok(());
        }
        let result = self.finish(&mut state);
        state.writer_count = state.writer_count.saturating_sub(1);
        result
    }

    fn finish(&mut self, state: &mut SessionState) -> Result<()> {
        self.pack_pending(state, true)?;
        if let NodeValue::CompressedVector {
            offset,
            section_length,
            record_count,
            ..
        } = &mut state.tree.slot_mut(self.cv).value
        {
            *offset = self.section_start;
            *section_length = self.section_end - self.section_start;
            *record_count = self.records_written;
        }
        Ok(())
    }

    /// Records written so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// True until `close` (or drop).
    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for CompressedVectorWriter {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.close() {
                warn!(error = %e, "compressed-vector writer dropped without close; error swallowed");
            }
        }
    }
}

impl std::fmt::Debug for CompressedVectorReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedVectorReader").finish_non_exhaustive()
    }
}

/// Reader decoding records from one compressed vector.
pub struct CompressedVectorReader {
    inner: Arc<ImageFileInner>,
    codecs: Vec<FixedWidthCodec>,
    buffers: Vec<SourceDestBuffer>,
    /// Stream bytes read from packets but not yet decoded, per field.
    pending: Vec<Vec<u8>>,
    next_packet: u64,
    section_end: u64,
    remaining_records: u64,
    open: bool,
}

impl CompressedVectorReader {
    fn new(node: &Node, buffers: Vec<SourceDestBuffer>) -> Result<Self> {
        let inner = node
            .file
            .upgrade()
            .ok_or_else(|| Error::not_open("owning image file no longer exists"))?;
        let mut state = inner.state.write();
        if !state.open {
            return Err(Error::not_open("image file is closed"));
        }
        if state.writer_count > 0 {
            return Err(Error::bad_api_argument(
                "cannot start a reader while a writer is open",
            ));
        }
        let NodeValue::CompressedVector {
            prototype,
            record_count,
            offset,
            section_length,
            ..
        } = state.tree.slot(node.id).value
        else {
            return Err(Error::bad_api_argument("node is not a CompressedVector"));
        };
        let fields = flatten_prototype(&state.tree, prototype)?;
        let buffers = match_buffers(&fields, buffers)?;
        if buffers.iter().any(|b| b.capacity == 0) {
            return Err(Error::bad_api_argument(
                "destination buffers need nonzero capacity",
            ));
        }
        let codecs = codecs_for(&fields);
        state.reader_count += 1;

        let pending = vec![Vec::new(); codecs.len()];
        Ok(CompressedVectorReader {
            inner: inner.clone(),
            codecs,
            buffers,
            pending,
            next_packet: offset,
            section_end: offset + section_length,
            remaining_records: record_count,
            open: true,
        })
    }

    /// Decode the next batch of records into the destination buffers.
    ///
    /// Each call refills the buffers from the start, up to the smallest
    /// buffer capacity. Returns the number of records decoded; 0 at
    /// end-of-stream (not an error).
    pub fn read(&mut self) -> Result<usize> {
        if !self.open {
            return Err(Error::bad_api_argument("reader is closed"));
        }
        {
            let state = self.inner.state.read();
            if !state.open {
                return Err(Error::not_open("image file is closed"));
            }
        }
        let limit = self
            .buffers
            .iter()
            .map(|b| b.capacity)
            .min()
            .unwrap_or(0) as u64;
        let target = self.remaining_records.min(limit) as usize;
        for buffer in &mut self.buffers {
            buffer.values.clear();
        }
        let mut decoded = 0;
        while decoded < target {
            let available = self.available_records();
            let take = available.min(target - decoded);
            if take > 0 {
                for i in 0..self.codecs.len() {
                    self.codecs[i].decode(&self.pending[i], take, &mut self.buffers[i].values)?;
                    let consumed = take * self.codecs[i].byte_width();
                    self.pending[i].drain(..consumed);
                }
                decoded += take;
                continue;
            }
            if !self.load_next_packet()? {
                break;
            }
        }
        self.remaining_records -= decoded as u64;
        Ok(decoded)
    }

    /// Records decodable from the pending stream bytes.
    fn available_records(&self) -> usize {
        let mut available = usize::MAX;
        for (codec, pending) in self.codecs.iter().zip(&self.pending) {
            let width = codec.byte_width();
            if width > 0 {
                available = available.min(pending.len() / width);
            }
        }
        available
    }

    /// Pull one more packet into the pending streams. False at section
    /// end.
    fn load_next_packet(&mut self) -> Result<bool> {
        if self.next_packet >= self.section_end {
            return Ok(false);
        }
        let store = self.inner.store.read();
        let mut prefix = [0u8; 4];
        store.read(self.next_packet, &mut prefix)?;
        let length = packet::packed_length(&prefix)?;
        if self.next_packet + length as u64 > self.section_end {
            return Err(Error::new(
                ErrorKind::BadFileLength,
                "data packet overruns its section",
            ));
        }
        let mut bytes = vec![0u8; length];
        store.read(self.next_packet, &mut bytes)?;
        drop(store);
        let packet = DataPacket::unpack(&bytes)?;
        if packet.streams.len() != self.pending.len() {
            return Err(Error::new(
                ErrorKind::BadFileLength,
                format!(
                    "data packet has {} streams, prototype has {}",
                    packet.streams.len(),
                    self.pending.len()
                ),
            ));
        }
        for (pending, stream) in self.pending.iter_mut().zip(packet.streams) {
            pending.extend_from_slice(&stream);
        }
        self.next_packet += length as u64;
        Ok(true)
    }

    /// The destination buffers, holding the records of the last `read`.
    pub fn buffers(&self) -> &[SourceDestBuffer] {
        &self.buffers
    }

    /// Consume the reader, returning its destination buffers.
    ///
    /// Detaches from the session like `close`.
    pub fn into_buffers(mut self) -> Vec<SourceDestBuffer> {
        let _ = self.close();
        std::mem::take(&mut self.buffers)
    }

    /// Detach from the session.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let mut state = self.inner.state.write();
        state.reader_count = state.reader_count.saturating_sub(1);
        Ok(())
    }

    /// True until `close` (or drop).
    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for CompressedVectorReader {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
