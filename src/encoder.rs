//! HPACK compressor: per-entry emission policy and well-known-key fast
//! paths.
//!
//! An `HpackCompressor` is per-connection state whose dynamic table stays
//! in lockstep with the peer decoder's: every incremental-indexing emission
//! is paired with a table allocation, and every cached index is checked for
//! liveness before it is referenced. The transport owning the connection
//! serializes calls; one header set is encoded at a time.

use std::mem;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::framer::Framer;
use crate::index::{BloomFilter, IndexCache, ValueCache};
use crate::metadata::{Metadata, MetadataEntry, Method, Scheme};
use crate::stats::EncoderStats;
use crate::table::{DynamicTable, DEFAULT_MAX_TABLE_SIZE, ENTRY_OVERHEAD, STATIC_TABLE_ENTRIES};
use crate::timeout::encode_timeout;

/// Entries at or above this size are never added to the dynamic table.
/// Evicting a crowd of small entries for one large one costs more
/// compression than the large entry can ever return.
const MAX_DECODER_SPACE_USAGE: u32 = 512;

/// `grpc-status` codes below this bound get a dedicated index slot.
const NUM_CACHED_GRPC_STATUS_VALUES: usize = 16;

/// Per-call framing parameters.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    pub stream_id: u32,
    pub is_end_of_stream: bool,
    /// Send `-bin` values as raw bytes behind a NUL sentinel instead of
    /// base64 + Huffman. Requires out-of-band agreement with the peer.
    pub use_true_binary_metadata: bool,
    /// Negotiated SETTINGS_MAX_FRAME_SIZE.
    pub max_frame_size: u32,
}

/// Per-connection HPACK encoder state.
pub struct HpackCompressor {
    table: DynamicTable,
    /// Local cap on the table size; the effective maximum is the smaller of
    /// this and the peer's SETTINGS_HEADER_TABLE_SIZE.
    max_usable_size: u32,
    /// Set when the peer must be told the table size changed; consumed at
    /// the start of the next header set.
    advertise_table_size_change: bool,
    elem_index: IndexCache<(Bytes, Bytes)>,
    key_index: IndexCache<Bytes>,
    filter_elems: BloomFilter,
    path_index: ValueCache,
    authority_index: ValueCache,
    te_index: u32,
    content_type_index: u32,
    user_agent: Bytes,
    user_agent_index: u32,
    cached_grpc_status: [u32; NUM_CACHED_GRPC_STATUS_VALUES],
    grpc_trace_bin_index: u32,
    grpc_tags_bin_index: u32,
}

impl Default for HpackCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackCompressor {
    pub fn new() -> Self {
        Self {
            table: DynamicTable::new(),
            max_usable_size: DEFAULT_MAX_TABLE_SIZE,
            advertise_table_size_change: false,
            elem_index: IndexCache::new(),
            key_index: IndexCache::new(),
            filter_elems: BloomFilter::new(),
            path_index: ValueCache::new(),
            authority_index: ValueCache::new(),
            te_index: 0,
            content_type_index: 0,
            user_agent: Bytes::new(),
            user_agent_index: 0,
            cached_grpc_status: [0; NUM_CACHED_GRPC_STATUS_VALUES],
            grpc_trace_bin_index: 0,
            grpc_tags_bin_index: 0,
        }
    }

    /// Lower the local cap on table size. Also shrinks the live table when
    /// the cap is below its current maximum.
    pub fn set_max_usable_size(&mut self, max_table_size: u32) {
        self.max_usable_size = max_table_size;
        self.set_max_table_size(self.table.max_size().min(max_table_size));
    }

    /// Apply the peer's SETTINGS_HEADER_TABLE_SIZE. Must be called between
    /// header sets; the change is advertised at the start of the next one.
    pub fn set_max_table_size(&mut self, max_table_size: u32) {
        if self
            .table
            .set_max_size(max_table_size.min(self.max_usable_size))
        {
            debug!(max_table_size, "set max table size from encoder");
            self.advertise_table_size_change = true;
        }
    }

    /// Encode one header set into `output` as a HEADERS frame followed by
    /// any CONTINUATION frames the frame size bound requires.
    pub fn encode_header_set<I>(
        &mut self,
        options: &EncodeOptions,
        headers: I,
        output: &mut BytesMut,
        stats: &mut EncoderStats,
    ) where
        I: IntoIterator<Item = Metadata>,
    {
        let mut framer = Framer::new(options, output, stats);
        if mem::take(&mut self.advertise_table_size_change) {
            framer.advertise_table_size_change(self.table.max_size());
        }
        for metadata in headers {
            self.encode_metadata(metadata, &mut framer);
        }
        framer.finish();
    }

    fn encode_metadata(&mut self, metadata: Metadata, framer: &mut Framer<'_>) {
        match metadata {
            Metadata::Path(value) => {
                self.path_index
                    .emit_to(&mut self.table, b":path", &value, framer)
            }
            Metadata::Authority(value) => {
                self.authority_index
                    .emit_to(&mut self.table, b":authority", &value, framer)
            }
            Metadata::TeTrailers => Self::encode_always_indexed(
                &mut self.table,
                &mut self.te_index,
                b"te",
                Bytes::from_static(b"trailers"),
                2 + 8 + ENTRY_OVERHEAD,
                framer,
            ),
            Metadata::ContentTypeGrpc => Self::encode_always_indexed(
                &mut self.table,
                &mut self.content_type_index,
                b"content-type",
                Bytes::from_static(b"application/grpc"),
                12 + 16 + ENTRY_OVERHEAD,
                framer,
            ),
            Metadata::Scheme(scheme) => match scheme {
                Scheme::Http => framer.emit_indexed(6),
                Scheme::Https => framer.emit_indexed(7),
            },
            Metadata::Method(method) => match method {
                Method::Get => framer.emit_indexed(2),
                Method::Post => framer.emit_indexed(3),
                Method::Put => framer.emit_lit_hdr_new_key_not_idx(
                    b":method",
                    &Bytes::from_static(b"PUT"),
                    false,
                ),
            },
            Metadata::Status(status) => self.encode_status(status, framer),
            Metadata::GrpcStatus(code) => self.encode_grpc_status(code, framer),
            Metadata::GrpcTimeout(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let entry = MetadataEntry::interned(
                    Bytes::from_static(b"grpc-timeout"),
                    encode_timeout(remaining),
                );
                self.encode_dynamic(entry, framer);
            }
            Metadata::GrpcTraceBin(value) => Self::encode_indexed_key_with_binary_value(
                &mut self.table,
                &mut self.grpc_trace_bin_index,
                b"grpc-trace-bin",
                &value,
                framer,
            ),
            Metadata::GrpcTagsBin(value) => Self::encode_indexed_key_with_binary_value(
                &mut self.table,
                &mut self.grpc_tags_bin_index,
                b"grpc-tags-bin",
                &value,
                framer,
            ),
            Metadata::UserAgent(value) => {
                // The index slot is keyed on the identity of the value; a
                // changed user agent invalidates it.
                if !same_identity(&self.user_agent, &value) {
                    self.user_agent = value.clone();
                    self.user_agent_index = 0;
                }
                let transport_length = 10 + value.len() as u32 + ENTRY_OVERHEAD;
                Self::encode_always_indexed(
                    &mut self.table,
                    &mut self.user_agent_index,
                    b"user-agent",
                    value,
                    transport_length,
                    framer,
                );
            }
            Metadata::Entry(entry) => self.encode_entry(entry, framer),
        }
    }

    fn encode_entry(&mut self, entry: MetadataEntry, framer: &mut Framer<'_>) {
        if let Some(static_index) = entry.static_index {
            if u32::from(static_index) < STATIC_TABLE_ENTRIES {
                framer.emit_indexed(u32::from(static_index) + 1);
                return;
            }
        }
        self.encode_dynamic(entry, framer);
    }

    fn encode_status(&mut self, status: u32, framer: &mut Framer<'_>) {
        let index = match status {
            200 => 8,
            204 => 9,
            206 => 10,
            304 => 11,
            400 => 12,
            404 => 13,
            500 => 14,
            _ => 0,
        };
        if index != 0 {
            framer.emit_indexed(index);
            return;
        }
        let value = Bytes::from(status.to_string());
        // No cache retains this index, but the allocation must still happen:
        // the incremental-indexing emission inserts at the peer.
        self.table
            .allocate_index(7 + value.len() as u32 + ENTRY_OVERHEAD);
        framer.emit_lit_hdr_new_key_inc_idx(b":status", &value, false);
    }

    fn encode_grpc_status(&mut self, code: u32, framer: &mut Framer<'_>) {
        let cached = (code as usize) < NUM_CACHED_GRPC_STATUS_VALUES;
        if cached {
            let index = self.cached_grpc_status[code as usize];
            if self.table.convertible_to_dynamic_index(index) {
                framer.emit_indexed(self.table.dynamic_index(index));
                return;
            }
        }
        let value = Bytes::from(code.to_string());
        let transport_length = 11 + value.len() as u32 + ENTRY_OVERHEAD;
        if cached {
            self.cached_grpc_status[code as usize] = self.table.allocate_index(transport_length);
            framer.emit_lit_hdr_new_key_inc_idx(b"grpc-status", &value, false);
        } else {
            framer.emit_lit_hdr_new_key_not_idx(b"grpc-status", &value, false);
        }
    }

    /// Single-slot fast path for headers whose value is fixed per
    /// connection: indexed while live, refreshed with a literal otherwise.
    fn encode_always_indexed(
        table: &mut DynamicTable,
        index: &mut u32,
        key: &'static [u8],
        value: Bytes,
        transport_length: u32,
        framer: &mut Framer<'_>,
    ) {
        if table.convertible_to_dynamic_index(*index) {
            framer.emit_indexed(table.dynamic_index(*index));
        } else {
            *index = table.allocate_index(transport_length);
            framer.emit_lit_hdr_new_key_inc_idx(key, &value, false);
        }
    }

    /// Single-slot fast path keyed on the header name alone, for binary
    /// values that change per call (`grpc-trace-bin`, `grpc-tags-bin`).
    fn encode_indexed_key_with_binary_value(
        table: &mut DynamicTable,
        index: &mut u32,
        key: &'static [u8],
        value: &Bytes,
        framer: &mut Framer<'_>,
    ) {
        if table.convertible_to_dynamic_index(*index) {
            framer.emit_lit_hdr_not_idx(table.dynamic_index(*index), value, true);
        } else {
            *index =
                table.allocate_index(key.len() as u32 + value.len() as u32 + ENTRY_OVERHEAD);
            framer.emit_lit_hdr_new_key_inc_idx(key, value, true);
        }
    }

    /// Generic emission policy for one entry.
    fn encode_dynamic(&mut self, entry: MetadataEntry, framer: &mut Framer<'_>) {
        debug_assert!(!entry.key().is_empty());
        framer.check_header_ordering(entry.key());
        trace!(
            key = %String::from_utf8_lossy(entry.key()),
            interned = entry.interned,
            key_interned = entry.key_interned,
            "encode",
        );
        let is_binary = entry.is_binary();
        let key_interned = entry.interned || entry.key_interned;
        // A key without stable identity cannot be cached; emit literals.
        if !key_interned {
            framer.emit_lit_hdr_new_key_not_idx(entry.key(), entry.value(), is_binary);
            return;
        }
        let mut elem_hash = 0u64;
        if entry.interned {
            elem_hash = entry.elem_hash();
            let can_add = self.filter_elems.add(elem_hash);
            let cache_key = (entry.key.clone(), entry.value.clone());
            if let Some(index) = self.elem_index.lookup(elem_hash, &cache_key) {
                if self.table.convertible_to_dynamic_index(index) {
                    framer.emit_indexed(self.table.dynamic_index(index));
                    return;
                }
            }
            // First sighting: drop the hash so the entry cannot be inserted
            // below. The key cache is still consulted.
            if !can_add {
                elem_hash = 0;
            }
        }
        let entry_size = entry.key().len() as u32 + entry.value().len() as u32 + ENTRY_OVERHEAD;
        let space_available = entry_size < MAX_DECODER_SPACE_USAGE;
        let should_add_elem = entry.interned && space_available && elem_hash != 0;
        let key_hash = entry.key_hash();
        if let Some(index) = self.key_index.lookup(key_hash, &entry.key) {
            if self.table.convertible_to_dynamic_index(index) {
                if should_add_elem {
                    framer.emit_lit_hdr_inc_idx(
                        self.table.dynamic_index(index),
                        entry.value(),
                        is_binary,
                    );
                    self.add_elem(&entry, entry_size, elem_hash, key_hash);
                } else {
                    framer.emit_lit_hdr_not_idx(
                        self.table.dynamic_index(index),
                        entry.value(),
                        is_binary,
                    );
                }
                return;
            }
        }
        let should_add_key = !entry.interned && space_available;
        if should_add_elem || should_add_key {
            framer.emit_lit_hdr_new_key_inc_idx(entry.key(), entry.value(), is_binary);
        } else {
            framer.emit_lit_hdr_new_key_not_idx(entry.key(), entry.value(), is_binary);
        }
        if should_add_elem {
            self.add_elem(&entry, entry_size, elem_hash, key_hash);
        } else if should_add_key {
            self.add_key(&entry, entry_size, key_hash);
        }
    }

    fn add_elem(&mut self, entry: &MetadataEntry, entry_size: u32, elem_hash: u64, key_hash: u64) {
        debug_assert!(entry.interned);
        let new_index = self.table.allocate_index(entry_size);
        if new_index != 0 {
            self.elem_index.insert(
                elem_hash,
                (entry.key.clone(), entry.value.clone()),
                new_index,
            );
            self.key_index.insert(key_hash, entry.key.clone(), new_index);
        }
    }

    fn add_key(&mut self, entry: &MetadataEntry, entry_size: u32, key_hash: u64) {
        let new_index = self.table.allocate_index(entry_size);
        if new_index != 0 {
            self.key_index.insert(key_hash, entry.key.clone(), new_index);
        }
    }
}

/// Identity comparison: same backing bytes, not just equal bytes.
fn same_identity(a: &Bytes, b: &Bytes) -> bool {
    a.as_ptr() == b.as_ptr() && a.len() == b.len()
}
