//! Signed Containers for Replicated Gossip Data
//!
//! A [`CrdsValue`] wraps one [`CrdsData`] payload together with the
//! originator's ed25519 signature over the payload's canonical encoding.
//! Values are the unit of replication: they are pushed to peers, offered in
//! pull responses, and stored in the replicated table.
//!
//! ## Canonical encoding
//!
//! The wire encoding is bincode with its default configuration: fixed-width
//! little-endian integers, `u64` length prefixes on sequences, `u32`
//! little-endian tags on enums (assigned by declaration order), one-byte
//! booleans, and fixed-size arrays inlined without a prefix. The encoding is
//! a cluster-wide contract: the SHA-256 of a value's encoded bytes keys the
//! shard index and the purged queue, and peers compare those hashes through
//! bloom filters, so any drift produces silent divergence. [`to_bytes`] and
//! [`from_bytes`] are the only encoding path; hashing reuses it byte for
//! byte.
//!
//! ## Labels
//!
//! Every value maps to a [`CrdsValueLabel`] naming the table slot it
//! occupies. Two values with the same label are competing assertions of the
//! same fact and only one survives, per the store's overwrite rules.
//!
//! [`to_bytes`]: CrdsValue::to_bytes
//! [`from_bytes`]: CrdsValue::from_bytes

use {
    crate::crds_data::{CrdsData, DuplicateShredIndex, EpochSlotsIndex, VoteIndex},
    bincode::serialize,
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_sanitize::{Sanitize, SanitizeError},
    solana_signature::Signature,
    solana_signer::Signer,
    std::fmt,
};
#[cfg(test)]
use {rand::Rng, solana_hash::Hash, solana_sha256_hasher::hash};

/// A signed gossip assertion; the unit of replication in the data store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CrdsValue {
    signature: Signature,
    data: CrdsData,
}

impl Sanitize for CrdsValue {
    fn sanitize(&self) -> Result<(), SanitizeError> {
        self.data.sanitize()
    }
}

impl CrdsValue {
    pub fn new_unsigned(data: CrdsData) -> Self {
        Self {
            signature: Signature::default(),
            data,
        }
    }

    pub fn new_signed(data: CrdsData, keypair: &Keypair) -> Self {
        let bytes = serialize(&data).unwrap();
        Self {
            signature: keypair.sign_message(&bytes),
            data,
        }
    }

    /// New random CrdsValue for tests and simulations.
    #[cfg(test)]
    pub(crate) fn new_rand<R: Rng>(rng: &mut R, keypair: Option<&Keypair>) -> Self {
        match keypair {
            None => {
                let keypair = Keypair::new();
                let data = CrdsData::new_rand(rng, Some(keypair.pubkey()));
                Self::new_signed(data, &keypair)
            }
            Some(keypair) => {
                let data = CrdsData::new_rand(rng, Some(keypair.pubkey()));
                Self::new_signed(data, keypair)
            }
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn data(&self) -> &CrdsData {
        &self.data
    }

    /// Checks that the signature covers the canonical encoding of the data.
    /// The store never calls this; front doors verify before inserting.
    pub fn verify(&self) -> bool {
        let bytes = serialize(&self.data).unwrap();
        self.signature.verify(self.pubkey().as_ref(), &bytes)
    }

    pub fn pubkey(&self) -> Pubkey {
        self.data.pubkey()
    }

    pub fn wallclock(&self) -> u64 {
        self.data.wallclock()
    }

    /// The table slot this value occupies. Values with equal labels are
    /// conflicting assertions of the same fact.
    pub fn label(&self) -> CrdsValueLabel {
        let pubkey = self.data.pubkey();
        match &self.data {
            CrdsData::LegacyContactInfo(_) => CrdsValueLabel::LegacyContactInfo(pubkey),
            CrdsData::Vote(ix, _) => CrdsValueLabel::Vote(*ix, pubkey),
            CrdsData::LowestSlot(_, _) => CrdsValueLabel::LowestSlot(pubkey),
            CrdsData::EpochSlots(ix, _) => CrdsValueLabel::EpochSlots(*ix, pubkey),
            CrdsData::NodeInstance(_) => CrdsValueLabel::NodeInstance(pubkey),
            CrdsData::Version(_) => CrdsValueLabel::Version(pubkey),
            CrdsData::DuplicateShred(ix, _) => CrdsValueLabel::DuplicateShred(*ix, pubkey),
            CrdsData::SnapshotHashes(_) => CrdsValueLabel::SnapshotHashes(pubkey),
        }
    }

    /// Canonical wire bytes of this value. The SHA-256 of these bytes is the
    /// value hash used for sharding, purge tracking and tie-breaking.
    pub fn to_bytes(&self) -> bincode::Result<Vec<u8>> {
        serialize(self)
    }

    /// Decodes a value from its canonical wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> bincode::Result<Self> {
        bincode::deserialize(bytes)
    }
}

/// Identifier of the table slot a value occupies.
///
/// Most variants are keyed by the originator alone; subtyped variants carry
/// an index so one node can hold several live values of that kind.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CrdsValueLabel {
    LegacyContactInfo(Pubkey),
    Vote(VoteIndex, Pubkey),
    LowestSlot(Pubkey),
    EpochSlots(EpochSlotsIndex, Pubkey),
    NodeInstance(Pubkey),
    Version(Pubkey),
    DuplicateShred(DuplicateShredIndex, Pubkey),
    SnapshotHashes(Pubkey),
}

impl fmt::Display for CrdsValueLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CrdsValueLabel::LegacyContactInfo(p) => write!(f, "LegacyContactInfo({p})"),
            CrdsValueLabel::Vote(ix, p) => write!(f, "Vote({ix}, {p})"),
            CrdsValueLabel::LowestSlot(p) => write!(f, "LowestSlot({p})"),
            CrdsValueLabel::EpochSlots(ix, p) => write!(f, "EpochSlots({ix}, {p})"),
            CrdsValueLabel::NodeInstance(p) => write!(f, "NodeInstance({p})"),
            CrdsValueLabel::Version(p) => write!(f, "Version({p})"),
            CrdsValueLabel::DuplicateShred(ix, p) => write!(f, "DuplicateShred({ix}, {p})"),
            CrdsValueLabel::SnapshotHashes(p) => write!(f, "SnapshotHashes({p})"),
        }
    }
}

impl CrdsValueLabel {
    pub fn pubkey(&self) -> Pubkey {
        match self {
            CrdsValueLabel::LegacyContactInfo(p)
            | CrdsValueLabel::Vote(_, p)
            | CrdsValueLabel::LowestSlot(p)
            | CrdsValueLabel::EpochSlots(_, p)
            | CrdsValueLabel::NodeInstance(p)
            | CrdsValueLabel::Version(p)
            | CrdsValueLabel::DuplicateShred(_, p)
            | CrdsValueLabel::SnapshotHashes(p) => *p,
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::crds_data::{
            LegacyContactInfo, LowestSlot, NodeInstance, Vote, MAX_DUPLICATE_SHREDS, MAX_VOTES,
        },
        rand::SeedableRng,
        rand_chacha::ChaChaRng,
        solana_clock::Slot,
        std::net::SocketAddr,
    };

    #[test]
    fn test_slot_golden_encoding() {
        let slot: Slot = 4335;
        let bytes = serialize(&slot).unwrap();
        assert_eq!(bytes, [0xEF, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let slot: Slot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(slot, 4335);
    }

    #[test]
    fn test_contact_info_golden_encoding() {
        let id = Pubkey::from([0x11; 32]);
        let localhost = |port: u16| SocketAddr::from(([127, 0, 0, 1], port));
        let info = LegacyContactInfo::new(
            id,
            localhost(8001),
            localhost(8002),
            localhost(8003),
            localhost(8004),
            13,
            42,
        );
        let bytes = serialize(&CrdsData::LegacyContactInfo(info)).unwrap();
        let mut expected = vec![0x00, 0x00, 0x00, 0x00]; // enum tag
        expected.extend_from_slice(&[0x11; 32]); // id
        for port in 8001u16..=8004 {
            expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // V4 tag
            expected.extend_from_slice(&[127, 0, 0, 1]);
            expected.extend_from_slice(&port.to_le_bytes());
        }
        expected.extend_from_slice(&13u64.to_le_bytes()); // wallclock
        expected.extend_from_slice(&42u16.to_le_bytes()); // shred_version
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_variant_wire_tags() {
        let mut rng = ChaChaRng::from_seed([17u8; 32]);
        let pubkey = Pubkey::from(rng.gen::<[u8; 32]>());
        let cases = [
            (
                CrdsData::LegacyContactInfo(LegacyContactInfo::new_localhost(&pubkey, 0)),
                0u32,
            ),
            (CrdsData::Vote(0, Vote::new_rand(&mut rng, None)), 1),
            (CrdsData::LowestSlot(0, LowestSlot::new(pubkey, 1, 2)), 2),
            (
                CrdsData::EpochSlots(0, crate::crds_data::EpochSlots::new_rand(&mut rng, None)),
                3,
            ),
            (CrdsData::NodeInstance(NodeInstance::new(pubkey, 1, 2)), 4),
            (
                CrdsData::Version(crate::crds_data::Version::new(pubkey, 1, 2, 3, 4, None)),
                5,
            ),
            (
                CrdsData::DuplicateShred(
                    MAX_DUPLICATE_SHREDS - 1,
                    crate::crds_data::DuplicateShred::new_rand(&mut rng, None),
                ),
                6,
            ),
            (
                CrdsData::SnapshotHashes(crate::crds_data::SnapshotHashes::new_rand(
                    &mut rng, None,
                )),
                7,
            ),
        ];
        for (data, tag) in cases {
            let bytes = serialize(&data).unwrap();
            assert_eq!(bytes[..4], tag.to_le_bytes()[..], "variant: {data:?}");
        }
        // Subtyped variants put the index right after the tag.
        let vote = CrdsData::Vote(MAX_VOTES - 1, Vote::new_rand(&mut rng, None));
        let bytes = serialize(&vote).unwrap();
        assert_eq!(bytes[4], MAX_VOTES - 1);
    }

    #[test]
    fn test_round_trip_all_variants() {
        let mut rng = ChaChaRng::from_seed([23u8; 32]);
        let keypair = Keypair::new();
        for _ in 0..64 {
            let value = CrdsValue::new_rand(&mut rng, Some(&keypair));
            let bytes = value.to_bytes().unwrap();
            let other = CrdsValue::from_bytes(&bytes).unwrap();
            assert_eq!(value, other);
            assert_eq!(value.label(), other.label());
            // The hash is over the same canonical bytes on both sides.
            assert_eq!(hash(&bytes), hash(&other.to_bytes().unwrap()));
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let mut rng = ChaChaRng::from_seed([29u8; 32]);
        let keypair = Keypair::new();
        let value = CrdsValue::new_rand(&mut rng, Some(&keypair));
        assert!(value.verify());
        assert_eq!(value.pubkey(), keypair.pubkey());
        // An unsigned value does not verify.
        let value = CrdsValue::new_unsigned(CrdsData::new_rand(&mut rng, None));
        assert!(!value.verify());
    }

    #[test]
    fn test_label_pubkey() {
        let mut rng = ChaChaRng::from_seed([31u8; 32]);
        for _ in 0..32 {
            let keypair = Keypair::new();
            let value = CrdsValue::new_rand(&mut rng, Some(&keypair));
            assert_eq!(value.label().pubkey(), keypair.pubkey());
        }
    }

    #[test]
    fn test_hash_differs_on_payload() {
        let pubkey = Pubkey::from([5u8; 32]);
        let a = CrdsValue::new_unsigned(CrdsData::Vote(
            0,
            Vote::new(pubkey, vec![1, 2, 3], 7, None),
        ));
        let b = CrdsValue::new_unsigned(CrdsData::Vote(
            0,
            Vote::new(pubkey, vec![4, 5, 6], 7, None),
        ));
        assert_eq!(a.label(), b.label());
        let hash_a: Hash = hash(&a.to_bytes().unwrap());
        let hash_b: Hash = hash(&b.to_bytes().unwrap());
        assert_ne!(hash_a, hash_b);
    }
}
