//! Thread-Safe Envelope and Batch Write Driver for the Replicated Store
//!
//! [`CrdsTable`] wraps the single-threaded [`Crds`] core in one classical
//! read-write lock: any number of concurrent readers, or one writer. Every
//! convenience method on the table acquires the lock for exactly one core
//! operation, so all side effects of an insert (store, category indices,
//! shards, purge queue, cursor) become visible to readers atomically.
//! Callers needing multi-operation atomicity hold a guard from [`read`] or
//! [`write`] and work on the core directly.
//!
//! The copy-out getters are built for consumers that hold their results past
//! the lock: they clone matching records into the spare capacity of a
//! caller-supplied buffer and advance the caller's [`Cursor`], so a reader
//! that drains in bounded chunks sees every record exactly once, in
//! insertion order, across any interleaving with writers.
//!
//! [`read`]: CrdsTable::read
//! [`write`]: CrdsTable::write

use {
    crate::{
        crds::{Crds, CrdsError, CrdsStats, Cursor, VersionedCrdsValue},
        crds_value::{CrdsValue, CrdsValueLabel},
    },
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

#[derive(Default)]
pub struct CrdsTable {
    inner: RwLock<Crds>,
}

impl CrdsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the shared read lock on the core. Getters taken through the
    /// same guard observe one consistent snapshot.
    pub fn read(&self) -> RwLockReadGuard<'_, Crds> {
        self.inner.read().unwrap()
    }

    /// Acquires the exclusive write lock on the core.
    pub fn write(&self) -> RwLockWriteGuard<'_, Crds> {
        self.inner.write().unwrap()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn stats(&self) -> CrdsStats {
        self.read().stats()
    }

    /// Inserts one value; see [`Crds::insert`].
    pub fn insert(&self, value: CrdsValue, now: u64) -> Result<(), CrdsError> {
        self.write().insert(value, now)
    }

    /// Inserts a batch under one write lock, dropping values whose author
    /// wallclock falls outside `now ± timeout` (saturating at the `u64`
    /// boundaries). Returns the indices of inputs whose insert failed, in
    /// input order; out-of-window values are dropped silently and do not
    /// count as failed.
    pub fn insert_values(&self, values: Vec<CrdsValue>, timeout: u64, now: u64) -> Vec<usize> {
        let since = now.saturating_sub(timeout);
        let until = now.saturating_add(timeout);
        let mut crds = self.write();
        let mut failed = Vec::new();
        for (index, value) in values.into_iter().enumerate() {
            let wallclock = value.wallclock();
            if wallclock < since || wallclock > until {
                trace!(
                    "discarding {}, wallclock {} outside of [{}, {}]",
                    value.label(),
                    wallclock,
                    since,
                    until,
                );
                continue;
            }
            if crds.insert(value, now).is_err() {
                failed.push(index);
            }
        }
        failed
    }

    /// Clone of the record stored under the label, if any.
    pub fn get(&self, label: &CrdsValueLabel) -> Option<VersionedCrdsValue> {
        self.read().get::<&VersionedCrdsValue>(label).cloned()
    }

    pub fn get_shred_version(&self, pubkey: &Pubkey) -> Option<u16> {
        self.read().get_shred_version(pubkey)
    }

    /// Copies records accepted since the cursor into the spare capacity of
    /// `buf`, oldest first, advancing the cursor past each copied record.
    /// Returns the copied suffix of the buffer.
    pub fn get_entries_with_cursor<'a>(
        &self,
        buf: &'a mut Vec<VersionedCrdsValue>,
        cursor: &mut Cursor,
    ) -> &'a [VersionedCrdsValue] {
        let crds = self.read();
        let start = buf.len();
        let room = buf.capacity() - start;
        buf.extend(crds.get_entries(cursor).take(room).cloned());
        &buf[start..]
    }

    /// Copies vote records accepted since the cursor; see
    /// [`get_entries_with_cursor`](Self::get_entries_with_cursor).
    pub fn get_votes_with_cursor<'a>(
        &self,
        buf: &'a mut Vec<VersionedCrdsValue>,
        cursor: &mut Cursor,
    ) -> &'a [VersionedCrdsValue] {
        let crds = self.read();
        let start = buf.len();
        let room = buf.capacity() - start;
        buf.extend(crds.get_votes(cursor).take(room).cloned());
        &buf[start..]
    }

    /// Copies epoch-slots records accepted since the cursor; see
    /// [`get_entries_with_cursor`](Self::get_entries_with_cursor).
    pub fn get_epoch_slots_with_cursor<'a>(
        &self,
        buf: &'a mut Vec<VersionedCrdsValue>,
        cursor: &mut Cursor,
    ) -> &'a [VersionedCrdsValue] {
        let crds = self.read();
        let start = buf.len();
        let room = buf.capacity() - start;
        buf.extend(crds.get_epoch_slots(cursor).take(room).cloned());
        &buf[start..]
    }

    /// Copies duplicate-shred records accepted since the cursor; see
    /// [`get_entries_with_cursor`](Self::get_entries_with_cursor).
    pub fn get_duplicate_shreds_with_cursor<'a>(
        &self,
        buf: &'a mut Vec<VersionedCrdsValue>,
        cursor: &mut Cursor,
    ) -> &'a [VersionedCrdsValue] {
        let crds = self.read();
        let start = buf.len();
        let room = buf.capacity() - start;
        buf.extend(crds.get_duplicate_shreds(cursor).take(room).cloned());
        &buf[start..]
    }

    /// Copies contact-info records into the spare capacity of `buf`, in
    /// contact-info index order (not cursor order); used for peer sampling.
    pub fn get_contact_infos<'a>(
        &self,
        buf: &'a mut Vec<VersionedCrdsValue>,
    ) -> &'a [VersionedCrdsValue] {
        let crds = self.read();
        let start = buf.len();
        let room = buf.capacity() - start;
        buf.extend(crds.get_contact_infos().take(room).cloned());
        &buf[start..]
    }

    /// Table indices of stored values matching the hash-prefix mask; see
    /// [`Crds::get_bitmask_matches`].
    pub fn get_bitmask_matches(&self, mask: u64, mask_bits: u32) -> Vec<usize> {
        self.read().get_bitmask_matches(mask, mask_bits)
    }

    /// Records a hash in the purge queue; used by the pull path for values
    /// it rejected before they ever reached the table.
    pub fn insert_purged(&self, value_hash: Hash, now: u64) {
        self.write().purged_mut().insert(value_hash, now);
    }

    /// Drops purged hashes recorded before the cutoff.
    pub fn trim_purged(&self, cutoff: u64) {
        self.write().trim_purged(cutoff);
    }

    /// All purged hashes, oldest first.
    pub fn purged_values(&self) -> Vec<Hash> {
        self.read().purged().values()
    }

    pub fn num_purged(&self) -> usize {
        self.read().purged().len()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::crds_data::{CrdsData, LegacyContactInfo, Vote},
        rand::SeedableRng,
        rand_chacha::ChaChaRng,
        solana_keypair::Keypair,
        solana_signer::Signer,
        solana_time_utils::timestamp,
        std::{collections::HashSet, iter::repeat_with, sync::Arc, thread},
    };

    fn new_vote_value(keypair: &Keypair, index: u8, wallclock: u64) -> CrdsValue {
        let vote = Vote::new(keypair.pubkey(), vec![index, 1, 2, 3], wallclock, None);
        CrdsValue::new_signed(CrdsData::Vote(index, vote), keypair)
    }

    #[test]
    fn test_insert_values_wallclock_window() {
        let table = CrdsTable::new();
        let now = 100_000;
        let timeout = 1_000;
        let keypairs: Vec<_> = repeat_with(Keypair::new).take(4).collect();
        let wallclocks = [98_999u64, 99_000, 101_000, 101_001];
        let values: Vec<_> = keypairs
            .iter()
            .zip(wallclocks)
            .map(|(keypair, wallclock)| {
                let info = LegacyContactInfo::new_localhost(&keypair.pubkey(), wallclock);
                CrdsValue::new_signed(CrdsData::LegacyContactInfo(info), keypair)
            })
            .collect();
        // Out-of-window values are dropped silently, not reported as failed.
        let failed = table.insert_values(values.clone(), timeout, now);
        assert_eq!(failed, Vec::<usize>::new());
        assert_eq!(table.len(), 2);
        // Re-inserting the surviving values fails as duplicates, reported in
        // input order.
        let failed = table.insert_values(values, timeout, now);
        assert_eq!(failed, vec![1, 2]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_get_votes_with_cursor() {
        let table = CrdsTable::new();
        let keypair = Keypair::new();
        // Two votes from the same node under different subtype indices
        // occupy different slots.
        assert_eq!(table.insert(new_vote_value(&keypair, 0, 10), 0), Ok(()));
        assert_eq!(table.insert(new_vote_value(&keypair, 1, 10), 0), Ok(()));
        let mut cursor = Cursor::default();
        let mut buf = Vec::with_capacity(100);
        let votes = table.get_votes_with_cursor(&mut buf, &mut cursor);
        assert_eq!(votes.len(), 2);
        assert_eq!(cursor.ordinal(), 2);
        buf.clear();
        assert!(table.get_votes_with_cursor(&mut buf, &mut cursor).is_empty());
    }

    #[test]
    fn test_cursor_resumes_across_bounded_buffers() {
        let table = CrdsTable::new();
        let keypairs: Vec<_> = repeat_with(Keypair::new).take(5).collect();
        for (k, keypair) in keypairs.iter().enumerate() {
            assert_eq!(table.insert(new_vote_value(keypair, 0, k as u64), 0), Ok(()));
        }
        let mut cursor = Cursor::default();
        let mut seen = Vec::new();
        // A buffer with room for two records drains the table across calls.
        for expected in [2, 2, 1, 0] {
            let mut buf = Vec::with_capacity(2);
            let chunk = table.get_entries_with_cursor(&mut buf, &mut cursor);
            assert_eq!(chunk.len(), expected);
            seen.extend(chunk.iter().map(VersionedCrdsValue::ordinal));
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        // A full buffer has no spare capacity and copies nothing.
        let mut buf = Vec::with_capacity(1);
        buf.push(table.get(&new_vote_value(&keypairs[0], 0, 0).label()).unwrap());
        let mut cursor = Cursor::default();
        assert!(table.get_entries_with_cursor(&mut buf, &mut cursor).is_empty());
        assert_eq!(cursor.ordinal(), 0);
    }

    #[test]
    fn test_contact_info_dedup_end_to_end() {
        let table = CrdsTable::new();
        let keypair = Keypair::new();
        let value = |wallclock| {
            let info = LegacyContactInfo::new_localhost(&keypair.pubkey(), wallclock);
            CrdsValue::new_signed(CrdsData::LegacyContactInfo(info), &keypair)
        };
        assert_eq!(table.insert(value(0), 0), Ok(()));
        assert_matches!(table.insert(value(0), 0), Err(CrdsError::DuplicateValue));
        assert_eq!(table.insert(value(2), 0), Ok(()));
        let mut buf = Vec::with_capacity(10);
        let infos = table.get_contact_infos(&mut buf);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].value.wallclock(), 2);
    }

    #[test]
    fn test_bitmask_sweep() {
        let mut rng = ChaChaRng::from_seed([73u8; 32]);
        let table = CrdsTable::new();
        for _ in 0..32 {
            let value = CrdsValue::new_rand(&mut rng, None);
            let _ = table.insert(value, 0);
        }
        let num_values = table.len();
        assert_eq!(table.get_bitmask_matches(0, 0).len(), num_values);
        // Full-width masks single out at most the record with that exact
        // prefix.
        let crds = table.read();
        for index in 0..num_values {
            let entry = crds.get_index(index).unwrap();
            let prefix = u64::from_le_bytes(
                <[u8; 8]>::try_from(&entry.value_hash().as_ref()[..8]).unwrap(),
            );
            assert!(crds.get_bitmask_matches(prefix, 64).contains(&index));
            assert!(!crds.get_bitmask_matches(prefix ^ 1, 64).contains(&index));
        }
    }

    #[test]
    fn test_purged_through_envelope() {
        let table = CrdsTable::new();
        let keypair = Keypair::new();
        let value = |wallclock| {
            let info = LegacyContactInfo::new_localhost(&keypair.pubkey(), wallclock);
            CrdsValue::new_signed(CrdsData::LegacyContactInfo(info), &keypair)
        };
        assert_eq!(table.insert(value(0), 100), Ok(()));
        assert_eq!(table.insert(value(1), 120), Ok(()));
        assert_eq!(table.num_purged(), 1);
        table.trim_purged(130);
        assert_eq!(table.num_purged(), 0);
        // Callers may record hashes of values rejected upstream.
        let value_hash = *table.get(&value(1).label()).unwrap().value_hash();
        table.insert_purged(value_hash, 200);
        assert_eq!(table.purged_values(), vec![value_hash]);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        const NUM_WRITERS: usize = 4;
        const INSERTS_PER_WRITER: usize = 64;
        const TOTAL: usize = NUM_WRITERS * INSERTS_PER_WRITER;
        let table = Arc::new(CrdsTable::new());
        thread::scope(|scope| {
            for k in 0..NUM_WRITERS {
                let table = Arc::clone(&table);
                scope.spawn(move || {
                    let mut rng = ChaChaRng::from_seed([k as u8; 32]);
                    for _ in 0..INSERTS_PER_WRITER {
                        // Distinct keypairs so every insert lands in a new
                        // slot.
                        let value = CrdsValue::new_rand(&mut rng, None);
                        assert_eq!(table.insert(value, timestamp()), Ok(()));
                    }
                });
            }
            // A concurrent reader drains with a cursor until it has seen
            // every record; bounded buffers force many read lock cycles.
            let reader = {
                let table = Arc::clone(&table);
                scope.spawn(move || {
                    let mut cursor = Cursor::default();
                    let mut ordinals = Vec::new();
                    while ordinals.len() < TOTAL {
                        let mut buf = Vec::with_capacity(17);
                        let chunk = table.get_entries_with_cursor(&mut buf, &mut cursor);
                        ordinals.extend(chunk.iter().map(VersionedCrdsValue::ordinal));
                        thread::yield_now();
                    }
                    ordinals
                })
            };
            let ordinals = reader.join().unwrap();
            // Every record observed exactly once, in cursor order, with
            // gap-free ordinals.
            assert_eq!(ordinals.len(), TOTAL);
            assert_eq!(
                ordinals,
                (0..TOTAL as u64).collect::<Vec<_>>(),
            );
            let distinct: HashSet<_> = ordinals.iter().copied().collect();
            assert_eq!(distinct.len(), TOTAL);
        });
        assert_eq!(table.len(), TOTAL);
    }
}
