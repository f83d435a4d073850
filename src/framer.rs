//! HTTP/2 HEADERS/CONTINUATION framing and HPACK representation output.
//!
//! A `Framer` is built once per header set over the caller's output buffer.
//! It reserves a 9-byte header slot for the frame being filled, splits the
//! HPACK byte stream at `max_frame_size` boundaries, and stamps frame
//! headers in on the way out: HEADERS first, CONTINUATION after, END_STREAM
//! only on the first frame, END_HEADERS only on the last.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::binary;
use crate::encoder::EncodeOptions;
use crate::stats::EncoderStats;
use crate::varint::VarintWriter;

/// Fixed size of an HTTP/2 frame header, RFC 9113 Section 4.1.
pub const FRAME_HEADER_SIZE: usize = 9;

/// HEADERS frame type, RFC 9113 Section 6.2.
pub const FRAME_TYPE_HEADERS: u8 = 0x01;

/// CONTINUATION frame type, RFC 9113 Section 6.10.
pub const FRAME_TYPE_CONTINUATION: u8 = 0x09;

/// END_STREAM flag, valid on the HEADERS frame only.
pub const FLAG_END_STREAM: u8 = 0x01;

/// END_HEADERS flag, set on the final frame of a header block.
pub const FLAG_END_HEADERS: u8 = 0x04;

/// Largest payload the 24-bit frame length field can carry.
pub const MAX_FRAME_PAYLOAD: u32 = (1 << 24) - 1;

/// Frame header parse failures on the transport's read side.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame header truncated: need {FRAME_HEADER_SIZE} bytes, have {0}")]
    Truncated(usize),
}

/// A decoded 9-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    /// Parse the header at the front of `buf`. The reserved high bit of the
    /// stream id is masked off per RFC 9113 Section 4.1.
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::Truncated(buf.len()));
        }
        Ok(Self {
            length: u32::from(buf[0]) << 16 | u32::from(buf[1]) << 8 | u32::from(buf[2]),
            frame_type: buf[3],
            flags: buf[4],
            stream_id: u32::from_be_bytes([buf[5] & 0x7f, buf[6], buf[7], buf[8]]),
        })
    }
}

/// Stateful writer for one header set's frame sequence.
pub(crate) struct Framer<'a> {
    output: &'a mut BytesMut,
    stats: &'a mut EncoderStats,
    max_frame_size: u32,
    stream_id: u32,
    is_end_of_stream: bool,
    use_true_binary_metadata: bool,
    is_first_frame: bool,
    /// Offset of the current frame's reserved header slot in `output`.
    header_slot: usize,
    /// Offset of the current frame's payload start in `output`.
    frame_start: usize,
    #[cfg(debug_assertions)]
    seen_regular_header: bool,
}

impl<'a> Framer<'a> {
    pub(crate) fn new(
        options: &EncodeOptions,
        output: &'a mut BytesMut,
        stats: &'a mut EncoderStats,
    ) -> Self {
        debug_assert!(options.max_frame_size > 0);
        debug_assert!(options.max_frame_size <= MAX_FRAME_PAYLOAD);
        let header_slot = reserve_header_slot(output);
        let frame_start = output.len();
        Self {
            output,
            stats,
            max_frame_size: options.max_frame_size,
            stream_id: options.stream_id,
            is_end_of_stream: options.is_end_of_stream,
            use_true_binary_metadata: options.use_true_binary_metadata,
            is_first_frame: true,
            header_slot,
            frame_start,
            #[cfg(debug_assertions)]
            seen_regular_header: false,
        }
    }

    /// Stamp the final frame header. Call exactly once, after the last
    /// representation has been written.
    pub(crate) fn finish(mut self) {
        self.finish_frame(true);
    }

    fn current_frame_size(&self) -> u32 {
        let size = (self.output.len() - self.frame_start) as u32;
        debug_assert!(size <= self.max_frame_size);
        size
    }

    fn finish_frame(&mut self, is_header_boundary: bool) {
        let frame_type = if self.is_first_frame {
            FRAME_TYPE_HEADERS
        } else {
            FRAME_TYPE_CONTINUATION
        };
        let mut flags = 0;
        // A HEADERS frame with END_STREAM set may still be followed by
        // CONTINUATION frames, so the flag goes on the first frame while
        // END_HEADERS goes on the last.
        if self.is_first_frame && self.is_end_of_stream {
            flags |= FLAG_END_STREAM;
        }
        if is_header_boundary {
            flags |= FLAG_END_HEADERS;
        }
        let len = self.current_frame_size();
        debug_assert!(len <= MAX_FRAME_PAYLOAD);
        let header = &mut self.output[self.header_slot..self.header_slot + FRAME_HEADER_SIZE];
        header[0] = (len >> 16) as u8;
        header[1] = (len >> 8) as u8;
        header[2] = len as u8;
        header[3] = frame_type;
        header[4] = flags;
        header[5..9].copy_from_slice(&(self.stream_id & 0x7fff_ffff).to_be_bytes());
        self.stats.framing_bytes += FRAME_HEADER_SIZE as u64;
        self.is_first_frame = false;
    }

    fn begin_frame(&mut self) {
        self.header_slot = reserve_header_slot(self.output);
        self.frame_start = self.output.len();
    }

    /// Finish and restart the current frame if it cannot take `need` more
    /// bytes.
    fn ensure_space(&mut self, need: usize) {
        if self.current_frame_size() as usize + need <= self.max_frame_size as usize {
            return;
        }
        self.finish_frame(false);
        self.begin_frame();
    }

    /// Append `data`, splitting across frames at `max_frame_size`.
    pub(crate) fn add(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let remaining = (self.max_frame_size - self.current_frame_size()) as usize;
            if data.len() <= remaining {
                self.stats.header_bytes += data.len() as u64;
                self.output.put_slice(data);
                return;
            }
            self.stats.header_bytes += remaining as u64;
            self.output.put_slice(&data[..remaining]);
            data = &data[remaining..];
            self.finish_frame(false);
            self.begin_frame();
        }
    }

    /// Reserve exactly `len` contiguous bytes in the current frame and
    /// return a cursor over them. `len` must not exceed `max_frame_size`.
    pub(crate) fn add_tiny(&mut self, len: usize) -> &mut [u8] {
        debug_assert!(len <= self.max_frame_size as usize);
        self.ensure_space(len);
        self.stats.header_bytes += len as u64;
        let start = self.output.len();
        self.output.resize(start + len, 0);
        &mut self.output[start..]
    }

    /// HPACK dynamic table size update, written before any representation.
    pub(crate) fn advertise_table_size_change(&mut self, max_size: u32) {
        let w = VarintWriter::<3>::new(max_size);
        let len = w.length();
        w.write(0x20, self.add_tiny(len));
    }

    /// Indexed field representation.
    pub(crate) fn emit_indexed(&mut self, wire_index: u32) {
        self.stats.send_indexed += 1;
        let w = VarintWriter::<1>::new(wire_index);
        let len = w.length();
        w.write(0x80, self.add_tiny(len));
    }

    /// Literal with incremental indexing, indexed name.
    pub(crate) fn emit_lit_hdr_inc_idx(&mut self, key_index: u32, value: &Bytes, is_binary: bool) {
        self.stats.send_lithdr_incidx += 1;
        let wire = get_wire_value(value, self.use_true_binary_metadata, is_binary, self.stats);
        let key = VarintWriter::<2>::new(key_index);
        let prefix_len = wire.prefix_length();
        {
            let data = self.add_tiny(key.length() + prefix_len);
            key.write(0x40, data);
            wire.write_prefix(&mut data[key.length()..]);
        }
        self.add(&wire.data);
    }

    /// Literal without indexing, indexed name.
    pub(crate) fn emit_lit_hdr_not_idx(&mut self, key_index: u32, value: &Bytes, is_binary: bool) {
        self.stats.send_lithdr_notidx += 1;
        let wire = get_wire_value(value, self.use_true_binary_metadata, is_binary, self.stats);
        let key = VarintWriter::<4>::new(key_index);
        let prefix_len = wire.prefix_length();
        {
            let data = self.add_tiny(key.length() + prefix_len);
            key.write(0x00, data);
            wire.write_prefix(&mut data[key.length()..]);
        }
        self.add(&wire.data);
    }

    /// Literal with incremental indexing, new name.
    pub(crate) fn emit_lit_hdr_new_key_inc_idx(&mut self, key: &[u8], value: &Bytes, is_binary: bool) {
        self.stats.send_lithdr_incidx_v += 1;
        self.emit_new_key(0x40, key);
        self.emit_value(value, is_binary);
    }

    /// Literal without indexing, new name.
    pub(crate) fn emit_lit_hdr_new_key_not_idx(&mut self, key: &[u8], value: &Bytes, is_binary: bool) {
        self.stats.send_lithdr_notidx_v += 1;
        self.emit_new_key(0x00, key);
        self.emit_value(value, is_binary);
    }

    fn emit_new_key(&mut self, type_byte: u8, key: &[u8]) {
        // Keys go out raw; only values are ever Huffman-coded here.
        self.stats.send_uncompressed += 1;
        let key_len = VarintWriter::<1>::new(key.len() as u32);
        {
            let data = self.add_tiny(1 + key_len.length());
            data[0] = type_byte;
            key_len.write(0x00, &mut data[1..]);
        }
        self.add(key);
    }

    fn emit_value(&mut self, value: &Bytes, is_binary: bool) {
        let wire = get_wire_value(value, self.use_true_binary_metadata, is_binary, self.stats);
        let prefix_len = wire.prefix_length();
        {
            let data = self.add_tiny(prefix_len);
            wire.write_prefix(data);
        }
        self.add(&wire.data);
    }

    /// Pseudo-headers must precede regular headers within a header set.
    /// Upstream validation is trusted in release builds.
    #[cfg(debug_assertions)]
    pub(crate) fn check_header_ordering(&mut self, key: &[u8]) {
        if key.first() == Some(&b':') {
            debug_assert!(
                !self.seen_regular_header,
                "pseudo-header after regular header"
            );
        } else {
            self.seen_regular_header = true;
        }
    }

    #[cfg(not(debug_assertions))]
    pub(crate) fn check_header_ordering(&mut self, _key: &[u8]) {}
}

fn reserve_header_slot(output: &mut BytesMut) -> usize {
    let slot = output.len();
    output.resize(slot + FRAME_HEADER_SIZE, 0);
    slot
}

/// On-wire form of one header value.
struct WireValue {
    data: Bytes,
    huffman_prefix: u8,
    insert_null_before_wire_value: bool,
}

impl WireValue {
    /// Wire length, counted by the preceding length field: the NUL sentinel
    /// of a true-binary value is part of the string.
    fn length(&self) -> usize {
        self.data.len() + usize::from(self.insert_null_before_wire_value)
    }

    fn prefix_length(&self) -> usize {
        VarintWriter::<1>::new(self.length() as u32).length()
            + usize::from(self.insert_null_before_wire_value)
    }

    fn write_prefix(&self, out: &mut [u8]) {
        let len = VarintWriter::<1>::new(self.length() as u32);
        len.write(self.huffman_prefix, out);
        if self.insert_null_before_wire_value {
            out[len.length()] = 0;
        }
    }
}

fn get_wire_value(
    value: &Bytes,
    use_true_binary: bool,
    is_binary_header: bool,
    stats: &mut EncoderStats,
) -> WireValue {
    if is_binary_header {
        if use_true_binary {
            stats.send_binary += 1;
            WireValue {
                data: value.clone(),
                huffman_prefix: 0x00,
                insert_null_before_wire_value: true,
            }
        } else {
            stats.send_binary_base64 += 1;
            WireValue {
                data: binary::base64_encode_and_huffman_compress(value),
                huffman_prefix: 0x80,
                insert_null_before_wire_value: false,
            }
        }
    } else {
        stats.send_uncompressed += 1;
        WireValue {
            data: value.clone(),
            huffman_prefix: 0x00,
            insert_null_before_wire_value: false,
        }
    }
}
