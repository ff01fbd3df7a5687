//! Replicated Data Store Core - Indexed Registry of Signed Gossip Values
//!
//! This module implements the single-threaded core of the cluster replicated
//! data store: an associative table of signed gossip values keyed by their
//! label, with the secondary indices every consumer of gossip data relies on.
//! The thread-safe envelope around it lives in
//! [`crds_table`](crate::crds_table).
//!
//! ## Structure
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!   label ─────────► │ table: label → record        │ ◄── stable index per
//!                    │ (IndexMap, append-only)      │     label, never shifts
//!                    └──────────────┬───────────────┘
//!                                   │ primary index
//!          ┌──────────────┬─────────┼──────────────┬──────────────┐
//!          ▼              ▼         ▼              ▼              ▼
//!     nodes (set)   votes/epoch_slots/      entries         shards
//!     contact-info  duplicate_shreds        cursor → index  hash prefix
//!     indices       cursor → index                          → index
//! ```
//!
//! Every accepted insert is stamped with a table-wide, strictly increasing
//! cursor. Consumers resume scans from their own [`Cursor`] checkpoint, so a
//! vote tracker or repair service never re-reads records it has already
//! drained and never misses one.
//!
//! ## Conflict resolution
//!
//! Two values with the same label are competing assertions of one fact. The
//! record with the later author wallclock wins; equal wallclocks fall back
//! to lexicographic order of the value hashes, so every node in the cluster
//! resolves the conflict identically regardless of arrival order. Hashes of
//! displaced or rejected values are remembered in a FIFO purge queue which
//! pull-request construction consults to avoid re-fetching them.
//!
//! The core does not expire records by age; callers drive trimming. It also
//! never verifies signatures; the protocol front door does that before
//! inserting.

use {
    crate::{
        crds_data::CrdsData,
        crds_entry::CrdsEntry,
        crds_shards::CrdsShards,
        crds_value::{CrdsValue, CrdsValueLabel},
    },
    bincode::serialize,
    indexmap::{
        map::{Entry, IndexMap},
        set::IndexSet,
    },
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    solana_sha256_hasher::hash,
    std::{
        cmp::Ordering,
        collections::{BTreeMap, HashMap, VecDeque},
        ops::{Bound, Index},
    },
    thiserror::Error,
};

/// Width of the shard index in bits; 2^12 = 4096 hash-prefix buckets.
pub const CRDS_SHARDS_BITS: u32 = 12;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum CrdsError {
    /// The stored value with the same label supersedes the incoming one.
    #[error("old value")]
    OldValue,
    /// The incoming value is hash-identical to the stored one.
    #[error("duplicate value")]
    DuplicateValue,
}

/// Running totals of write outcomes, readable through [`Crds::stats`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CrdsStats {
    /// inserts which created a new table slot
    pub num_inserts: usize,
    /// inserts which displaced an existing record
    pub num_overwrites: usize,
    pub num_old_values: usize,
    pub num_duplicate_values: usize,
}

/// A stored record: the value plus the bookkeeping stamped on at accept
/// time.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionedCrdsValue {
    /// Position in the table-wide insertion order.
    ordinal: u64,
    pub value: CrdsValue,
    /// local time when inserted or overwritten
    local_timestamp: u64,
    /// SHA-256 of the canonical encoding of the value
    value_hash: Hash,
}

impl VersionedCrdsValue {
    pub(crate) fn new(value: CrdsValue, cursor: Cursor, local_timestamp: u64) -> Self {
        let value_hash = hash(&serialize(&value).unwrap());
        VersionedCrdsValue {
            ordinal: cursor.ordinal(),
            value,
            local_timestamp,
            value_hash,
        }
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn local_timestamp(&self) -> u64 {
        self.local_timestamp
    }

    pub fn value_hash(&self) -> &Hash {
        &self.value_hash
    }
}

/// A reader's checkpoint into the table's insertion order.
///
/// Scans yield records whose ordinal is at or past the cursor and push the
/// cursor beyond everything yielded, so repeated calls drain each record
/// exactly once.
#[derive(Clone, Copy, Default)]
pub struct Cursor(u64);

impl Cursor {
    pub fn ordinal(&self) -> u64 {
        self.0
    }

    /// Moves the cursor past the yielded ordinal.
    #[inline]
    fn consume(&mut self, ordinal: u64) {
        self.0 = self.0.max(ordinal + 1);
    }
}

/// FIFO of hashes of values recently displaced from or rejected by the
/// table, with the local time of the event. Pull-request construction
/// consults this so peers are not asked to re-send what was just dropped.
///
/// The queue is advisory and unbounded; callers cap it with [`trim`].
///
/// [`trim`]: PurgedQueue::trim
#[derive(Clone, Debug, Default)]
pub struct PurgedQueue {
    queue: VecDeque<(Hash, /*timestamp:*/ u64)>,
}

impl PurgedQueue {
    pub fn insert(&mut self, value_hash: Hash, now: u64) {
        self.queue.push_back((value_hash, now));
    }

    /// Drops entries recorded before the cutoff. Timestamps are
    /// nondecreasing in steady state so only the head is scanned; an
    /// out-of-order entry stuck behind a fresh one survives until a later
    /// trim, which is acceptable for advisory data.
    pub fn trim(&mut self, cutoff: u64) {
        while self
            .queue
            .front()
            .is_some_and(|&(_, timestamp)| timestamp < cutoff)
        {
            self.queue.pop_front();
        }
    }

    /// All queued hashes, oldest first.
    pub fn values(&self) -> Vec<Hash> {
        self.queue.iter().map(|&(hash, _)| hash).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Hash, u64)> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[derive(Clone)]
pub struct Crds {
    /// Stores the map of labels and values
    table: IndexMap<CrdsValueLabel, VersionedCrdsValue>,
    /// Position of the next accepted insert in the table-wide order.
    cursor: Cursor,
    shards: CrdsShards,
    /// Indices of all values which are contact-info.
    nodes: IndexSet<usize>,
    /// Indices of Votes keyed by insert order.
    votes: BTreeMap<u64 /*ordinal*/, usize /*index*/>,
    /// Indices of EpochSlots keyed by insert order.
    epoch_slots: BTreeMap<u64 /*ordinal*/, usize /*index*/>,
    /// Indices of DuplicateShred keyed by insert order.
    duplicate_shreds: BTreeMap<u64 /*ordinal*/, usize /*index*/>,
    /// Indices of all values keyed by insert order.
    entries: BTreeMap<u64 /*ordinal*/, usize /*index*/>,
    /// Hashes of recently displaced or rejected values.
    purged: PurgedQueue,
    /// Mapping from nodes' pubkeys to their respective shred-version.
    shred_versions: HashMap<Pubkey, u16>,
    stats: CrdsStats,
}

impl Default for Crds {
    fn default() -> Self {
        Crds {
            table: IndexMap::default(),
            cursor: Cursor::default(),
            shards: CrdsShards::new(CRDS_SHARDS_BITS),
            nodes: IndexSet::default(),
            votes: BTreeMap::default(),
            epoch_slots: BTreeMap::default(),
            duplicate_shreds: BTreeMap::default(),
            entries: BTreeMap::default(),
            purged: PurgedQueue::default(),
            shred_versions: HashMap::default(),
            stats: CrdsStats::default(),
        }
    }
}

/// Decides if the candidate value replaces the stored record carrying the
/// same label: the later author wallclock wins; on equal wallclocks the
/// lexicographically larger value hash wins; identical hashes keep the
/// stored record. Every node resolves conflicts with this same rule, which
/// is what makes the cluster converge.
pub(crate) fn overrides(value: &VersionedCrdsValue, other: &VersionedCrdsValue) -> bool {
    assert_eq!(value.value.label(), other.value.label(), "labels mismatch!");
    match value.value.wallclock().cmp(&other.value.wallclock()) {
        Ordering::Less => false,
        Ordering::Greater => true,
        Ordering::Equal => other.value_hash < value.value_hash,
    }
}

impl Crds {
    /// Inserts the value into the table, resolving label conflicts with
    /// [`overrides`]. `now` is the local wall time, recorded on the stored
    /// record and on purge-queue entries.
    ///
    /// All index updates of one insert are applied before this returns, so
    /// readers under the same lock never observe a half-updated table.
    pub fn insert(&mut self, value: CrdsValue, now: u64) -> Result<(), CrdsError> {
        let label = value.label();
        let pubkey = value.pubkey();
        let value = VersionedCrdsValue::new(value, self.cursor, now);
        match self.table.entry(label) {
            Entry::Vacant(entry) => {
                let entry_index = entry.index();
                assert!(self.shards.insert(entry_index, &value));
                match value.value.data() {
                    CrdsData::LegacyContactInfo(node) => {
                        self.nodes.insert(entry_index);
                        self.shred_versions.insert(pubkey, node.shred_version());
                    }
                    CrdsData::Vote(_, _) => {
                        self.votes.insert(value.ordinal, entry_index);
                    }
                    CrdsData::EpochSlots(_, _) => {
                        self.epoch_slots.insert(value.ordinal, entry_index);
                    }
                    CrdsData::DuplicateShred(_, _) => {
                        self.duplicate_shreds.insert(value.ordinal, entry_index);
                    }
                    _ => (),
                }
                self.entries.insert(value.ordinal, entry_index);
                self.cursor.consume(value.ordinal);
                self.stats.num_inserts += 1;
                entry.insert(value);
                Ok(())
            }
            Entry::Occupied(mut entry) if overrides(&value, entry.get()) => {
                let entry_index = entry.index();
                let old_ordinal = entry.get().ordinal;
                let old_hash = entry.get().value_hash;
                assert!(self.shards.remove(entry_index, entry.get()));
                assert!(self.shards.insert(entry_index, &value));
                match value.value.data() {
                    CrdsData::LegacyContactInfo(node) => {
                        self.shred_versions.insert(pubkey, node.shred_version());
                        // self.nodes already contains this index.
                    }
                    CrdsData::Vote(_, _) => {
                        self.votes.remove(&old_ordinal);
                        self.votes.insert(value.ordinal, entry_index);
                    }
                    CrdsData::EpochSlots(_, _) => {
                        self.epoch_slots.remove(&old_ordinal);
                        self.epoch_slots.insert(value.ordinal, entry_index);
                    }
                    CrdsData::DuplicateShred(_, _) => {
                        self.duplicate_shreds.remove(&old_ordinal);
                        self.duplicate_shreds.insert(value.ordinal, entry_index);
                    }
                    _ => (),
                }
                self.entries.remove(&old_ordinal);
                self.entries.insert(value.ordinal, entry_index);
                self.purged.insert(old_hash, now);
                self.cursor.consume(value.ordinal);
                self.stats.num_overwrites += 1;
                entry.insert(value);
                Ok(())
            }
            Entry::Occupied(entry) => {
                trace!(
                    "insert failed, {} has a newer value; wallclock: {}",
                    value.value.label(),
                    value.value.wallclock(),
                );
                if entry.get().value_hash == value.value_hash {
                    self.stats.num_duplicate_values += 1;
                    Err(CrdsError::DuplicateValue)
                } else {
                    // Remember the rejected hash so pulls do not fetch it
                    // again.
                    self.purged.insert(value.value_hash, now);
                    self.stats.num_old_values += 1;
                    Err(CrdsError::OldValue)
                }
            }
        }
    }

    /// Typed lookup by label or key; see
    /// [`CrdsEntry`](crate::crds_entry::CrdsEntry) for the returnable types.
    pub fn get<'a, 'b, V>(&'a self, key: V::Key) -> Option<V>
    where
        V: CrdsEntry<'a, 'b>,
    {
        V::get_entry(&self.table, key)
    }

    /// Last shred-version a contact-info from this node reported, if any.
    pub fn get_shred_version(&self, pubkey: &Pubkey) -> Option<u16> {
        self.shred_versions.get(pubkey).copied()
    }

    /// All contact-info records, in the order the contact-info index holds
    /// them. Not cursor-ordered; used for peer sampling.
    pub fn get_contact_infos(&self) -> impl Iterator<Item = &VersionedCrdsValue> {
        self.nodes.iter().map(move |i| self.table.index(*i))
    }

    /// All records accepted at or past the cursor, oldest first. Advances
    /// the cursor past everything yielded.
    pub fn get_entries<'a>(
        &'a self,
        cursor: &'a mut Cursor,
    ) -> impl Iterator<Item = &'a VersionedCrdsValue> + 'a {
        let range = (Bound::Included(cursor.ordinal()), Bound::Unbounded);
        self.entries.range(range).map(move |(ordinal, index)| {
            cursor.consume(*ordinal);
            self.table.index(*index)
        })
    }

    /// Vote records accepted at or past the cursor, oldest first.
    pub fn get_votes<'a>(
        &'a self,
        cursor: &'a mut Cursor,
    ) -> impl Iterator<Item = &'a VersionedCrdsValue> + 'a {
        let range = (Bound::Included(cursor.ordinal()), Bound::Unbounded);
        self.votes.range(range).map(move |(ordinal, index)| {
            cursor.consume(*ordinal);
            self.table.index(*index)
        })
    }

    /// Epoch-slots records accepted at or past the cursor, oldest first.
    pub fn get_epoch_slots<'a>(
        &'a self,
        cursor: &'a mut Cursor,
    ) -> impl Iterator<Item = &'a VersionedCrdsValue> + 'a {
        let range = (Bound::Included(cursor.ordinal()), Bound::Unbounded);
        self.epoch_slots.range(range).map(move |(ordinal, index)| {
            cursor.consume(*ordinal);
            self.table.index(*index)
        })
    }

    /// Duplicate-shred records accepted at or past the cursor, oldest first.
    pub fn get_duplicate_shreds<'a>(
        &'a self,
        cursor: &'a mut Cursor,
    ) -> impl Iterator<Item = &'a VersionedCrdsValue> + 'a {
        let range = (Bound::Included(cursor.ordinal()), Bound::Unbounded);
        self.duplicate_shreds
            .range(range)
            .map(move |(ordinal, index)| {
                cursor.consume(*ordinal);
                self.table.index(*index)
            })
    }

    /// Table indices of stored values whose hash prefix matches the high
    /// `mask_bits` bits of `mask`; see [`CrdsShards::find`].
    pub fn get_bitmask_matches(&self, mask: u64, mask_bits: u32) -> Vec<usize> {
        self.shards.find(mask, mask_bits).collect()
    }

    /// The record at the given table index, if the index is occupied. Table
    /// indices are stable: a slot keeps its index across overwrites.
    pub fn get_index(&self, index: usize) -> Option<&VersionedCrdsValue> {
        self.table.get_index(index).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn stats(&self) -> CrdsStats {
        self.stats
    }

    pub fn purged(&self) -> &PurgedQueue {
        &self.purged
    }

    pub fn purged_mut(&mut self) -> &mut PurgedQueue {
        &mut self.purged
    }

    /// Drops purged hashes recorded before the cutoff.
    pub fn trim_purged(&mut self, cutoff: u64) {
        self.purged.trim(cutoff);
    }
}
