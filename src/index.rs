//! Lookup structures mapping header entries and keys to dynamic table
//! insertion indices.
//!
//! None of these hold authoritative state: a cached insertion index may have
//! been evicted from the dynamic table at any point, so every consumer
//! filters hits through `DynamicTable::convertible_to_dynamic_index` before
//! use. Stale slots are overwritten or trimmed lazily.

use bytes::Bytes;
use smallvec::SmallVec;

use crate::framer::Framer;
use crate::table::{DynamicTable, ENTRY_OVERHEAD};

/// Probe-table capacity; two slots are derived per hash.
const CACHE_SLOTS: usize = 128;

/// Bucket count of the sighting filter.
pub(crate) const NUM_FILTER_VALUES: usize = 256;

struct Slot<K> {
    hash: u64,
    key: K,
    index: u32,
}

/// Fixed-capacity two-position probe table, last write wins.
///
/// Slots keep the key next to its hash and lookups compare both, so a hash
/// collision can never alias two distinct entries.
pub(crate) struct IndexCache<K> {
    slots: Vec<Option<Slot<K>>>,
}

impl<K: PartialEq> IndexCache<K> {
    pub fn new() -> Self {
        Self {
            slots: (0..CACHE_SLOTS).map(|_| None).collect(),
        }
    }

    fn first_slot(hash: u64) -> usize {
        hash as usize & (CACHE_SLOTS - 1)
    }

    fn second_slot(hash: u64) -> usize {
        (hash >> 32) as usize & (CACHE_SLOTS - 1)
    }

    pub fn lookup(&self, hash: u64, key: &K) -> Option<u32> {
        for pos in [Self::first_slot(hash), Self::second_slot(hash)] {
            if let Some(slot) = &self.slots[pos] {
                if slot.hash == hash && slot.key == *key {
                    return Some(slot.index);
                }
            }
        }
        None
    }

    pub fn insert(&mut self, hash: u64, key: K, index: u32) {
        let first = Self::first_slot(hash);
        let second = Self::second_slot(hash);
        for pos in [first, second] {
            if let Some(slot) = &mut self.slots[pos] {
                if slot.hash == hash && slot.key == key {
                    slot.index = index;
                    return;
                }
            }
        }
        for pos in [first, second] {
            if self.slots[pos].is_none() {
                self.slots[pos] = Some(Slot { hash, key, index });
                return;
            }
        }
        self.slots[first] = Some(Slot { hash, key, index });
    }
}

/// Counting filter that gates dynamic table insertion: an entry earns a
/// table slot only on its second sighting, keeping one-hit wonders out.
///
/// Bucket counts are halved once the running sum gets large so that old
/// sightings age out instead of pinning every bucket nonzero forever.
pub(crate) struct BloomFilter {
    sum: u32,
    elems: [u8; NUM_FILTER_VALUES],
}

impl BloomFilter {
    pub fn new() -> Self {
        Self {
            sum: 0,
            elems: [0; NUM_FILTER_VALUES],
        }
    }

    /// Record a sighting of `elem_hash`; returns whether the bucket had
    /// been hit before.
    pub fn add(&mut self, elem_hash: u64) -> bool {
        if self.sum as usize >= NUM_FILTER_VALUES * 32 {
            self.halve();
        }
        let bucket = (elem_hash % NUM_FILTER_VALUES as u64) as usize;
        let already_seen = self.elems[bucket] != 0;
        if self.elems[bucket] < u8::MAX {
            self.elems[bucket] += 1;
            self.sum += 1;
        }
        already_seen
    }

    fn halve(&mut self) {
        self.sum = 0;
        for elem in &mut self.elems {
            *elem >>= 1;
            self.sum += u32::from(*elem);
        }
    }
}

struct CachedValue {
    value: Bytes,
    index: u32,
}

/// Per-key value cache for hot headers (`:path`, `:authority`): a short
/// ordered list scanned linearly, with an MRU bubble on hit and a tail trim
/// of entries whose indices have fallen out of the live window.
pub(crate) struct ValueCache {
    values: SmallVec<[CachedValue; 4]>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self {
            values: SmallVec::new(),
        }
    }

    /// Emit `key: value`, indexed when the cached insertion index is still
    /// live, otherwise as a literal with incremental indexing paired with a
    /// fresh allocation so the peer's table mirrors ours.
    pub fn emit_to(
        &mut self,
        table: &mut DynamicTable,
        key: &'static [u8],
        value: &Bytes,
        framer: &mut Framer<'_>,
    ) {
        let transport_length = key.len() as u32 + value.len() as u32 + ENTRY_OVERHEAD;
        let mut prev: Option<usize> = None;
        for i in 0..self.values.len() {
            if self.values[i].value == *value {
                if table.convertible_to_dynamic_index(self.values[i].index) {
                    framer.emit_indexed(table.dynamic_index(self.values[i].index));
                } else {
                    self.values[i].index = table.allocate_index(transport_length);
                    framer.emit_lit_hdr_new_key_inc_idx(key, value, false);
                }
                // Bubble the hit towards the front so the hottest values
                // stay at the start of the scan.
                if let Some(prev) = prev {
                    self.values.swap(prev, i);
                }
                while let Some(last) = self.values.last() {
                    if table.convertible_to_dynamic_index(last.index) {
                        break;
                    }
                    self.values.pop();
                }
                return;
            }
            prev = Some(i);
        }
        let index = table.allocate_index(transport_length);
        framer.emit_lit_hdr_new_key_inc_idx(key, value, false);
        self.values.push(CachedValue {
            value: value.clone(),
            index,
        });
    }
}
