//! HPACK header compression for HTTP/2 (RFC 7541), encoder side.
//!
//! This crate turns a stream of header metadata into HTTP/2 HEADERS and
//! CONTINUATION frames. The compressor keeps a dynamic indexing table in
//! lockstep with the peer decoder's and picks a representation per entry
//! (a static table reference, a dynamic table reference, or a literal with
//! or without incremental indexing), so repeated headers compress down to
//! single-byte references.
//!
//! # Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use h2_hpack::{EncodeOptions, EncoderStats, HpackCompressor, Metadata, Method};
//!
//! let mut compressor = HpackCompressor::new();
//! let mut output = BytesMut::new();
//! let mut stats = EncoderStats::default();
//!
//! let options = EncodeOptions {
//!     stream_id: 1,
//!     is_end_of_stream: true,
//!     use_true_binary_metadata: false,
//!     max_frame_size: 16384,
//! };
//! let headers = vec![
//!     Metadata::Method(Method::Get),
//!     Metadata::Path("/".into()),
//! ];
//! compressor.encode_header_set(&options, headers, &mut output, &mut stats);
//! ```
//!
//! The compressor is per-connection state. The transport that owns the
//! connection must serialize `encode_header_set`, `set_max_table_size`, and
//! `set_max_usable_size`; `&mut self` makes that the only way to call them.

pub mod binary;
pub mod encoder;
pub mod framer;
pub mod huffman;
pub mod metadata;
pub mod stats;
pub mod timeout;
pub mod varint;

mod index;
mod table;

pub use encoder::{EncodeOptions, HpackCompressor};
pub use framer::{
    FrameError, FrameHeader, FLAG_END_HEADERS, FLAG_END_STREAM, FRAME_HEADER_SIZE,
    FRAME_TYPE_CONTINUATION, FRAME_TYPE_HEADERS,
};
pub use metadata::{is_binary_header, Metadata, MetadataEntry, Method, Scheme};
pub use stats::EncoderStats;
