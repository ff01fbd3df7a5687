//! Typed Single-Label Lookups Into the Replicated Store
//!
//! Callers rarely want the raw versioned record; the vote tracker wants a
//! `&Vote`, repair wants a `&LowestSlot`, peer sampling wants a
//! `&LegacyContactInfo`. The [`CrdsEntry`] trait maps each returnable type to
//! its lookup key so [`Crds::get`](crate::crds::Crds::get) can hand back the
//! right reference in one call, e.g.
//! `crds.get::<&LegacyContactInfo>(pubkey)`.

use {
    crate::{
        crds::VersionedCrdsValue,
        crds_data::{CrdsData, LegacyContactInfo, LowestSlot, SnapshotHashes, Vote, VoteIndex},
        crds_value::{CrdsValue, CrdsValueLabel},
    },
    indexmap::IndexMap,
    solana_pubkey::Pubkey,
};

type Table = IndexMap<CrdsValueLabel, VersionedCrdsValue>;

/// Types which can be looked up from the store by a key.
pub trait CrdsEntry<'a, 'b>: Sized {
    type Key; // Lookup key.
    fn get_entry(table: &'a Table, key: Self::Key) -> Option<Self>;
}

macro_rules! impl_crds_entry (
    // Lookup by CrdsValueLabel.
    ($name:ident, |$entry:ident| $body:expr) => (
        impl<'a, 'b> CrdsEntry<'a, 'b> for &'a $name {
            type Key = &'b CrdsValueLabel;
            fn get_entry(table: &'a Table, key: Self::Key) -> Option<Self> {
                let $entry = table.get(key)?;
                $body
            }
        }
    );
    // Lookup by Pubkey.
    ($name:ident, $pat:pat, $expr:expr) => (
        impl<'a, 'b> CrdsEntry<'a, 'b> for &'a $name {
            type Key = Pubkey;
            fn get_entry(table: &'a Table, key: Self::Key) -> Option<Self> {
                let key = CrdsValueLabel::$name(key);
                match table.get(&key)?.value.data() {
                    $pat => Some($expr),
                    _ => None,
                }
            }
        }
    );
);

impl_crds_entry!(CrdsValue, |entry| Some(&entry.value));
impl_crds_entry!(VersionedCrdsValue, |entry| Some(entry));
impl_crds_entry!(LegacyContactInfo, CrdsData::LegacyContactInfo(node), node);
impl_crds_entry!(LowestSlot, CrdsData::LowestSlot(_, lowest_slot), lowest_slot);
impl_crds_entry!(
    SnapshotHashes,
    CrdsData::SnapshotHashes(snapshot_hashes),
    snapshot_hashes
);

impl<'a, 'b> CrdsEntry<'a, 'b> for &'a Vote {
    type Key = (VoteIndex, Pubkey);
    fn get_entry(table: &'a Table, key: Self::Key) -> Option<Self> {
        let (index, pubkey) = key;
        let key = CrdsValueLabel::Vote(index, pubkey);
        match table.get(&key)?.value.data() {
            CrdsData::Vote(_, vote) => Some(vote),
            _ => None,
        }
    }
}
