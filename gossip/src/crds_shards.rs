//! Hash-Prefix Shard Index Over Stored Values
//!
//! Pull requests from peers sample their local view with a bit mask over
//! value hashes: "send me what you have whose hash starts with these bits,
//! minus what my bloom filter already covers". Answering that efficiently
//! requires enumerating stored values by hash prefix without scanning the
//! whole table.
//!
//! [`CrdsShards`] buckets every stored value by the top [`CRDS_SHARDS_BITS`]
//! bits of the first eight bytes of its hash, read as a little-endian `u64`.
//! Each bucket maps the value's primary table index to that `u64` prefix, so
//! a mask query touches only the buckets that can possibly match:
//!
//! - masks shorter than the shard width select a contiguous run of buckets
//!   wholesale,
//! - masks of exactly the shard width select one bucket wholesale,
//! - longer masks select one bucket and filter it by the stored prefixes.
//!
//! The shard width trades bucket count against bucket size; 2^12 buckets
//! keep individual buckets cheap to scan while typical mask queries touch
//! only a handful of them.
//!
//! [`CRDS_SHARDS_BITS`]: crate::crds::CRDS_SHARDS_BITS

use {
    crate::crds::VersionedCrdsValue,
    indexmap::map::IndexMap,
    itertools::Either,
    solana_hash::Hash,
    std::{cmp::Ordering, iter::repeat_with},
};

#[derive(Clone, Debug)]
pub struct CrdsShards {
    /// shards[k] includes crds values which the first shard_bits of their
    /// hash value is equal to k. Each shard is a mapping from the primary
    /// table index to the u64 prefix of the hash value.
    shards: Vec<IndexMap<usize, u64>>,
    shard_bits: u32,
}

impl CrdsShards {
    pub fn new(shard_bits: u32) -> Self {
        CrdsShards {
            shards: repeat_with(IndexMap::new).take(1 << shard_bits).collect(),
            shard_bits,
        }
    }

    /// Adds the value at the given table index. Returns false if the index
    /// is already present, which indicates a bug in the caller.
    #[must_use]
    pub fn insert(&mut self, index: usize, value: &VersionedCrdsValue) -> bool {
        let hash = Self::hash_as_u64(value.value_hash());
        self.shard_mut(hash).insert(index, hash).is_none()
    }

    /// Removes the value at the given table index. Returns false if the
    /// index is not present, which indicates a bug in the caller.
    #[must_use]
    pub fn remove(&mut self, index: usize, value: &VersionedCrdsValue) -> bool {
        let hash = Self::hash_as_u64(value.value_hash());
        self.shard_mut(hash).swap_remove(&index).is_some()
    }

    /// Returns table indices of all values whose hash prefix matches the
    /// high `mask_bits` bits of `mask`; `mask_bits` may be 0 (match
    /// everything) up to 64 (match one exact prefix).
    pub fn find(&self, mask: u64, mask_bits: u32) -> impl Iterator<Item = usize> + '_ {
        debug_assert!(mask_bits <= 64);
        match mask_bits.cmp(&self.shard_bits) {
            Ordering::Less => {
                // All entries of several consecutive shards match the mask.
                let count = 1usize << (self.shard_bits - mask_bits);
                let prefix = if mask_bits == 0 {
                    0
                } else {
                    (mask >> (64 - mask_bits)) as usize
                };
                let start = prefix << (self.shard_bits - mask_bits);
                Either::Left(Either::Left(
                    self.shards[start..start + count]
                        .iter()
                        .flat_map(|shard| shard.keys().copied()),
                ))
            }
            Ordering::Equal => {
                // The mask covers exactly one shard.
                Either::Left(Either::Right(self.shard(mask).keys().copied()))
            }
            Ordering::Greater => {
                // The mask selects one shard and filters it by the stored
                // hash prefixes.
                let shift = 64 - mask_bits;
                let mask = mask >> shift;
                Either::Right(self.shard(mask << shift).iter().filter_map(
                    move |(&index, hash)| (hash >> shift == mask).then_some(index),
                ))
            }
        }
    }

    fn hash_as_u64(hash: &Hash) -> u64 {
        let buf = <[u8; 8]>::try_from(&hash.as_ref()[..8]).unwrap();
        u64::from_le_bytes(buf)
    }

    fn shard_index(&self, hash: u64) -> usize {
        (hash >> (64 - self.shard_bits)) as usize
    }

    fn shard(&self, hash: u64) -> &IndexMap<usize, u64> {
        let shard_index = self.shard_index(hash);
        &self.shards[shard_index]
    }

    fn shard_mut(&mut self, hash: u64) -> &mut IndexMap<usize, u64> {
        let shard_index = self.shard_index(hash);
        &mut self.shards[shard_index]
    }

    /// Checks that every value in `values` is in the shard its hash maps to
    /// and nothing else is. Only for tests and simulations.
    #[cfg(test)]
    pub(crate) fn check(&self, values: &[VersionedCrdsValue]) {
        let mut indices: Vec<_> = self
            .shards
            .iter()
            .flat_map(IndexMap::keys)
            .copied()
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..values.len()).collect::<Vec<_>>());
        for (shard_index, shard) in self.shards.iter().enumerate() {
            for (index, hash) in shard {
                assert_eq!(*hash, Self::hash_as_u64(values[*index].value_hash()));
                assert_eq!(shard_index, (hash >> (64 - self.shard_bits)) as usize);
            }
        }
    }
}
