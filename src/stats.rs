//! Per-call encoding statistics.
//!
//! A plain counter sink the caller passes into `encode_header_set`; the
//! transport aggregates or exports these however it likes.

/// Counters covering one or more `encode_header_set` calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EncoderStats {
    /// Frame header bytes written.
    pub framing_bytes: u64,
    /// HPACK payload bytes written.
    pub header_bytes: u64,
    /// Indexed field representations.
    pub send_indexed: u64,
    /// Literals with incremental indexing, indexed name.
    pub send_lithdr_incidx: u64,
    /// Literals without indexing, indexed name.
    pub send_lithdr_notidx: u64,
    /// Literals with incremental indexing, new name.
    pub send_lithdr_incidx_v: u64,
    /// Literals without indexing, new name.
    pub send_lithdr_notidx_v: u64,
    /// Values sent as raw true-binary bytes.
    pub send_binary: u64,
    /// Values sent base64-coded and Huffman-compressed.
    pub send_binary_base64: u64,
    /// Strings sent without compression.
    pub send_uncompressed: u64,
}
