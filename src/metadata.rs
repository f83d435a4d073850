//! Header metadata model.
//!
//! Well-known headers travel as dedicated `Metadata` variants so the
//! compressor can run its typed fast paths; everything else goes through
//! `MetadataEntry` and the generic emission policy.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;

use bytes::Bytes;

/// Whether a key names a binary header, by gRPC convention a `-bin` suffix.
pub fn is_binary_header(key: &[u8]) -> bool {
    key.ends_with(b"-bin")
}

/// Request method. Anything beyond these is carried as a generic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

/// Request scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

/// One header to encode.
#[derive(Debug, Clone)]
pub enum Metadata {
    Path(Bytes),
    Authority(Bytes),
    /// `te: trailers`, the only value gRPC permits.
    TeTrailers,
    /// `content-type: application/grpc`.
    ContentTypeGrpc,
    Scheme(Scheme),
    Method(Method),
    /// `:status`, as the numeric code.
    Status(u32),
    /// `grpc-status`, as the numeric code.
    GrpcStatus(u32),
    /// `grpc-timeout`; the remaining time is computed against the deadline
    /// at encode time.
    GrpcTimeout(Instant),
    GrpcTraceBin(Bytes),
    GrpcTagsBin(Bytes),
    UserAgent(Bytes),
    Entry(MetadataEntry),
}

/// A generic key/value header.
///
/// `interned` promises byte-stable identity for the whole entry across
/// `encode_header_set` calls, which is what lets the compressor track it in
/// its index caches; `key_interned` promises the same for the key alone.
/// Transient entries are always emitted as plain literals.
#[derive(Debug, Clone)]
pub struct MetadataEntry {
    pub(crate) key: Bytes,
    pub(crate) value: Bytes,
    pub(crate) interned: bool,
    pub(crate) key_interned: bool,
    pub(crate) static_index: Option<u8>,
    elem_hash: Option<u64>,
    key_hash: Option<u64>,
}

impl MetadataEntry {
    /// An entry with no identity guarantees.
    pub fn transient(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            interned: false,
            key_interned: false,
            static_index: None,
            elem_hash: None,
            key_hash: None,
        }
    }

    /// An entry whose key and value both have stable identity.
    pub fn interned(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            interned: true,
            key_interned: true,
            ..Self::transient(key, value)
        }
    }

    /// A transient value under a stable key.
    pub fn with_interned_key(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key_interned: true,
            ..Self::transient(key, value)
        }
    }

    /// Attach the entry's 0-based position in the shared static metadata
    /// ordering; positions inside the 61-entry HPACK static table are
    /// emitted as a one-byte indexed field.
    pub fn with_static_index(mut self, static_index: u8) -> Self {
        self.static_index = Some(static_index);
        self
    }

    /// Attach precomputed hashes, sparing the encoder the rehash.
    pub fn with_hashes(mut self, elem_hash: u64, key_hash: u64) -> Self {
        self.elem_hash = Some(elem_hash);
        self.key_hash = Some(key_hash);
        self
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn is_binary(&self) -> bool {
        is_binary_header(&self.key)
    }

    pub(crate) fn elem_hash(&self) -> u64 {
        self.elem_hash.unwrap_or_else(|| {
            let mut hasher = DefaultHasher::new();
            self.key.hash(&mut hasher);
            self.value.hash(&mut hasher);
            hasher.finish()
        })
    }

    pub(crate) fn key_hash(&self) -> u64 {
        self.key_hash.unwrap_or_else(|| {
            let mut hasher = DefaultHasher::new();
            self.key.hash(&mut hasher);
            hasher.finish()
        })
    }
}
