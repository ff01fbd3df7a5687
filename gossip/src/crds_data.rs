//! Strongly-Typed Payload Variants Carried by the Gossip Network
//!
//! Every assertion replicated through gossip is one of the variants defined
//! here, wrapped in a signed [`CrdsValue`](crate::crds_value::CrdsValue). The
//! declaration order of [`CrdsData`] fixes the `u32` wire tag of each variant,
//! so variants must never be reordered or removed; new kinds of data are only
//! ever appended.
//!
//! ## Categories
//!
//! Four variants get dedicated secondary indices in the store:
//!
//! - **LegacyContactInfo**: a node's service endpoints, used for peer sampling
//! - **Vote**: consensus votes, scanned in insertion order by the vote tracker
//! - **EpochSlots**: bit-packed slot completion reports
//! - **DuplicateShred**: chunked proofs of duplicate block production
//!
//! All other variants are stored and replicated uniformly with no per-category
//! index.
//!
//! ## Validation
//!
//! Payloads implement [`Sanitize`] so front doors can reject malformed input
//! (out-of-range subtype indices, absurd wallclocks or slots) before it ever
//! reaches the store. The store itself trusts sanitized input and never
//! panics on it.

use {
    solana_clock::Slot,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    solana_sanitize::{Sanitize, SanitizeError},
    std::net::{IpAddr, Ipv4Addr, SocketAddr},
};
#[cfg(test)]
use rand::Rng;

/// Upper bound on author-supplied wallclocks, about 33 thousand years from
/// the epoch in milliseconds. Anything larger is a corrupt or hostile value.
pub(crate) const MAX_WALLCLOCK: u64 = 1_000_000_000_000_000;

/// Upper bound on slot numbers embedded in gossip payloads.
pub(crate) const MAX_SLOT: u64 = 1_000_000_000_000_000;

pub type VoteIndex = u8;
/// Number of votes a node may advertise concurrently; each occupies its own
/// slot in the table.
pub const MAX_VOTES: VoteIndex = 32;

pub type EpochSlotsIndex = u8;

pub type DuplicateShredIndex = u16;
/// Number of duplicate-shred chunks a node may advertise concurrently.
pub const MAX_DUPLICATE_SHREDS: DuplicateShredIndex = 512;

/// The tagged union of gossip payloads.
///
/// The variant, together with the originator (and subtype index where
/// applicable), determines the value's label, i.e. which slot of the
/// replicated store it occupies.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum CrdsData {
    LegacyContactInfo(LegacyContactInfo),
    Vote(VoteIndex, Vote),
    LowestSlot(/*DEPRECATED:*/ u8, LowestSlot),
    EpochSlots(EpochSlotsIndex, EpochSlots),
    NodeInstance(NodeInstance),
    Version(Version),
    DuplicateShred(DuplicateShredIndex, DuplicateShred),
    SnapshotHashes(SnapshotHashes),
}

impl Sanitize for CrdsData {
    fn sanitize(&self) -> Result<(), SanitizeError> {
        match self {
            CrdsData::LegacyContactInfo(val) => val.sanitize(),
            CrdsData::Vote(ix, val) => {
                if *ix >= MAX_VOTES {
                    return Err(SanitizeError::ValueOutOfBounds);
                }
                val.sanitize()
            }
            CrdsData::LowestSlot(ix, val) => {
                if *ix != 0 {
                    return Err(SanitizeError::ValueOutOfBounds);
                }
                val.sanitize()
            }
            CrdsData::EpochSlots(_, val) => val.sanitize(),
            CrdsData::NodeInstance(val) => val.sanitize(),
            CrdsData::Version(val) => val.sanitize(),
            CrdsData::DuplicateShred(ix, val) => {
                if *ix >= MAX_DUPLICATE_SHREDS {
                    return Err(SanitizeError::ValueOutOfBounds);
                }
                val.sanitize()
            }
            CrdsData::SnapshotHashes(val) => val.sanitize(),
        }
    }
}

impl CrdsData {
    /// Timestamp the author embedded when creating the payload.
    pub(crate) fn wallclock(&self) -> u64 {
        match self {
            CrdsData::LegacyContactInfo(info) => info.wallclock,
            CrdsData::Vote(_, vote) => vote.wallclock,
            CrdsData::LowestSlot(_, lowest_slot) => lowest_slot.wallclock,
            CrdsData::EpochSlots(_, epoch_slots) => epoch_slots.wallclock,
            CrdsData::NodeInstance(node_instance) => node_instance.wallclock,
            CrdsData::Version(version) => version.wallclock,
            CrdsData::DuplicateShred(_, shred) => shred.wallclock,
            CrdsData::SnapshotHashes(hashes) => hashes.wallclock,
        }
    }

    pub(crate) fn pubkey(&self) -> Pubkey {
        match self {
            CrdsData::LegacyContactInfo(info) => info.id,
            CrdsData::Vote(_, vote) => vote.from,
            CrdsData::LowestSlot(_, lowest_slot) => lowest_slot.from,
            CrdsData::EpochSlots(_, epoch_slots) => epoch_slots.from,
            CrdsData::NodeInstance(node_instance) => node_instance.from,
            CrdsData::Version(version) => version.from,
            CrdsData::DuplicateShred(_, shred) => shred.from,
            CrdsData::SnapshotHashes(hashes) => hashes.from,
        }
    }

    /// New random CrdsData for tests and simulations.
    #[cfg(test)]
    pub(crate) fn new_rand<R: Rng>(rng: &mut R, pubkey: Option<Pubkey>) -> Self {
        match rng.gen_range(0..8) {
            0 => CrdsData::LegacyContactInfo(LegacyContactInfo::new_rand(rng, pubkey)),
            1 => CrdsData::Vote(
                rng.gen_range(0..MAX_VOTES),
                Vote::new_rand(rng, pubkey),
            ),
            2 => CrdsData::LowestSlot(0, LowestSlot::new_rand(rng, pubkey)),
            3 => CrdsData::EpochSlots(rng.gen(), EpochSlots::new_rand(rng, pubkey)),
            4 => CrdsData::NodeInstance(NodeInstance::new_rand(rng, pubkey)),
            5 => CrdsData::Version(Version::new_rand(rng, pubkey)),
            6 => CrdsData::DuplicateShred(
                rng.gen_range(0..MAX_DUPLICATE_SHREDS),
                DuplicateShred::new_rand(rng, pubkey),
            ),
            _ => CrdsData::SnapshotHashes(SnapshotHashes::new_rand(rng, pubkey)),
        }
    }
}

fn sanitize_wallclock(wallclock: u64) -> Result<(), SanitizeError> {
    if wallclock >= MAX_WALLCLOCK {
        Err(SanitizeError::ValueOutOfBounds)
    } else {
        Ok(())
    }
}

#[cfg(test)]
fn new_rand_pubkey<R: Rng>(rng: &mut R, pubkey: Option<Pubkey>) -> Pubkey {
    pubkey.unwrap_or_else(|| Pubkey::from(rng.gen::<[u8; 32]>()))
}

#[cfg(test)]
pub(crate) fn new_rand_timestamp<R: Rng>(rng: &mut R) -> u64 {
    const DELAY: u64 = 10 * 60 * 1000; // 10 minutes
    solana_time_utils::timestamp() - DELAY + rng.gen_range(0..2 * DELAY)
}

/// A node's service endpoints as advertised over gossip.
///
/// One record per node; re-announcements with a fresher wallclock replace the
/// previous endpoints.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LegacyContactInfo {
    id: Pubkey,
    /// gossip address
    gossip: SocketAddr,
    /// address to connect to for replication
    tvu: SocketAddr,
    /// transactions address
    tpu: SocketAddr,
    /// address to which to send JSON-RPC requests
    rpc: SocketAddr,
    wallclock: u64,
    /// node shred version
    shred_version: u16,
}

impl Sanitize for LegacyContactInfo {
    fn sanitize(&self) -> Result<(), SanitizeError> {
        sanitize_wallclock(self.wallclock)
    }
}

impl LegacyContactInfo {
    pub fn new(
        id: Pubkey,
        gossip: SocketAddr,
        tvu: SocketAddr,
        tpu: SocketAddr,
        rpc: SocketAddr,
        wallclock: u64,
        shred_version: u16,
    ) -> Self {
        Self {
            id,
            gossip,
            tvu,
            tpu,
            rpc,
            wallclock,
            shred_version,
        }
    }

    /// ContactInfo with everything on localhost, for tests and local
    /// development clusters.
    pub fn new_localhost(id: &Pubkey, wallclock: u64) -> Self {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let addr = |port| SocketAddr::new(localhost, port);
        Self::new(
            *id,
            addr(8000),
            addr(8001),
            addr(8002),
            addr(8003),
            wallclock,
            0u16,
        )
    }

    #[cfg(test)]
    pub(crate) fn new_rand<R: Rng>(rng: &mut R, pubkey: Option<Pubkey>) -> Self {
        let mut info = Self::new_localhost(&new_rand_pubkey(rng, pubkey), new_rand_timestamp(rng));
        info.shred_version = rng.gen();
        info
    }

    pub fn pubkey(&self) -> &Pubkey {
        &self.id
    }

    pub fn gossip(&self) -> SocketAddr {
        self.gossip
    }

    pub fn tvu(&self) -> SocketAddr {
        self.tvu
    }

    pub fn tpu(&self) -> SocketAddr {
        self.tpu
    }

    pub fn rpc(&self) -> SocketAddr {
        self.rpc
    }

    pub fn wallclock(&self) -> u64 {
        self.wallclock
    }

    pub fn shred_version(&self) -> u16 {
        self.shred_version
    }

    pub fn set_wallclock(&mut self, wallclock: u64) {
        self.wallclock = wallclock;
    }

    pub fn set_shred_version(&mut self, shred_version: u16) {
        self.shred_version = shred_version;
    }
}

/// A consensus vote relayed over gossip.
///
/// The transaction bytes are opaque to the store; consumers deserialize and
/// verify them downstream.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Vote {
    pub(crate) from: Pubkey,
    /// serialized vote transaction, not interpreted here
    transaction: Vec<u8>,
    pub(crate) wallclock: u64,
    /// slot the transaction voted on, when the relayer extracted it
    slot: Option<Slot>,
}

impl Sanitize for Vote {
    fn sanitize(&self) -> Result<(), SanitizeError> {
        sanitize_wallclock(self.wallclock)?;
        if self.slot.is_some_and(|slot| slot >= MAX_SLOT) {
            return Err(SanitizeError::ValueOutOfBounds);
        }
        Ok(())
    }
}

impl Vote {
    pub fn new(from: Pubkey, transaction: Vec<u8>, wallclock: u64, slot: Option<Slot>) -> Self {
        Self {
            from,
            transaction,
            wallclock,
            slot,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_rand<R: Rng>(rng: &mut R, pubkey: Option<Pubkey>) -> Self {
        let transaction = std::iter::repeat_with(|| rng.gen()).take(64).collect();
        Self::new(
            new_rand_pubkey(rng, pubkey),
            transaction,
            new_rand_timestamp(rng),
            rng.gen::<bool>().then(|| rng.gen_range(0..MAX_SLOT)),
        )
    }

    pub fn transaction(&self) -> &[u8] {
        &self.transaction
    }

    pub fn slot(&self) -> Option<Slot> {
        self.slot
    }

    pub fn wallclock(&self) -> u64 {
        self.wallclock
    }
}

/// Lowest full slot still held by the node, gossiped so repair peers know
/// what they can ask it for.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LowestSlot {
    pub(crate) from: Pubkey,
    pub lowest: Slot,
    pub(crate) wallclock: u64,
}

impl Sanitize for LowestSlot {
    fn sanitize(&self) -> Result<(), SanitizeError> {
        sanitize_wallclock(self.wallclock)?;
        if self.lowest >= MAX_SLOT {
            return Err(SanitizeError::ValueOutOfBounds);
        }
        Ok(())
    }
}

impl LowestSlot {
    pub fn new(from: Pubkey, lowest: Slot, wallclock: u64) -> Self {
        Self {
            from,
            lowest,
            wallclock,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_rand<R: Rng>(rng: &mut R, pubkey: Option<Pubkey>) -> Self {
        Self::new(
            new_rand_pubkey(rng, pubkey),
            rng.gen_range(0..MAX_SLOT),
            new_rand_timestamp(rng),
        )
    }
}

/// Bit-packed report of slots the node has completed, starting at
/// `first_slot`. A node may shard its report across several subtype indices
/// when one value would grow too large for a packet.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EpochSlots {
    pub(crate) from: Pubkey,
    pub first_slot: Slot,
    /// number of slots covered by the bitmap
    pub num: u64,
    /// little-endian bitmap, one bit per slot past first_slot
    pub slots: Vec<u8>,
    pub(crate) wallclock: u64,
}

impl Sanitize for EpochSlots {
    fn sanitize(&self) -> Result<(), SanitizeError> {
        sanitize_wallclock(self.wallclock)?;
        if self.first_slot >= MAX_SLOT || self.num >= MAX_SLOT {
            return Err(SanitizeError::ValueOutOfBounds);
        }
        Ok(())
    }
}

impl EpochSlots {
    pub fn new(from: Pubkey, first_slot: Slot, num: u64, slots: Vec<u8>, wallclock: u64) -> Self {
        Self {
            from,
            first_slot,
            num,
            slots,
            wallclock,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_rand<R: Rng>(rng: &mut R, pubkey: Option<Pubkey>) -> Self {
        let num = rng.gen_range(0..256u64);
        let slots = std::iter::repeat_with(|| rng.gen())
            .take(num.div_ceil(8) as usize)
            .collect();
        Self::new(
            new_rand_pubkey(rng, pubkey),
            rng.gen_range(0..MAX_SLOT),
            num,
            slots,
            new_rand_timestamp(rng),
        )
    }
}

/// Token identifying one running instance of a node, used to detect two
/// processes gossiping with the same identity key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NodeInstance {
    pub(crate) from: Pubkey,
    pub(crate) wallclock: u64,
    /// when the instance was created
    pub timestamp: u64,
    /// randomly generated value at node instantiation
    pub token: u64,
}

impl Sanitize for NodeInstance {
    fn sanitize(&self) -> Result<(), SanitizeError> {
        sanitize_wallclock(self.wallclock)
    }
}

impl NodeInstance {
    pub fn new(from: Pubkey, now: u64, token: u64) -> Self {
        Self {
            from,
            wallclock: now,
            timestamp: now,
            token,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_rand<R: Rng>(rng: &mut R, pubkey: Option<Pubkey>) -> Self {
        Self::new(
            new_rand_pubkey(rng, pubkey),
            new_rand_timestamp(rng),
            rng.gen(),
        )
    }
}

/// Software version advertisement.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Version {
    pub(crate) from: Pubkey,
    pub(crate) wallclock: u64,
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub commit: Option<u32>,
}

impl Sanitize for Version {
    fn sanitize(&self) -> Result<(), SanitizeError> {
        sanitize_wallclock(self.wallclock)
    }
}

impl Version {
    pub fn new(
        from: Pubkey,
        wallclock: u64,
        major: u16,
        minor: u16,
        patch: u16,
        commit: Option<u32>,
    ) -> Self {
        Self {
            from,
            wallclock,
            major,
            minor,
            patch,
            commit,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_rand<R: Rng>(rng: &mut R, pubkey: Option<Pubkey>) -> Self {
        Self::new(
            new_rand_pubkey(rng, pubkey),
            new_rand_timestamp(rng),
            rng.gen_range(0..3),
            rng.gen_range(0..20),
            rng.gen_range(0..20),
            rng.gen::<bool>().then(|| rng.gen()),
        )
    }
}

/// One chunk of a proof that a leader produced two versions of the same
/// shred. Chunks are reassembled by consumers once all `num_chunks` arrive.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DuplicateShred {
    pub(crate) from: Pubkey,
    pub(crate) wallclock: u64,
    pub slot: Slot,
    pub shred_index: u32,
    pub num_chunks: u8,
    pub chunk_index: u8,
    pub chunk: Vec<u8>,
}

impl Sanitize for DuplicateShred {
    fn sanitize(&self) -> Result<(), SanitizeError> {
        sanitize_wallclock(self.wallclock)?;
        if self.slot >= MAX_SLOT {
            return Err(SanitizeError::ValueOutOfBounds);
        }
        if self.chunk_index >= self.num_chunks {
            return Err(SanitizeError::IndexOutOfBounds);
        }
        Ok(())
    }
}

impl DuplicateShred {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        from: Pubkey,
        wallclock: u64,
        slot: Slot,
        shred_index: u32,
        num_chunks: u8,
        chunk_index: u8,
        chunk: Vec<u8>,
    ) -> Self {
        Self {
            from,
            wallclock,
            slot,
            shred_index,
            num_chunks,
            chunk_index,
            chunk,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_rand<R: Rng>(rng: &mut R, pubkey: Option<Pubkey>) -> Self {
        let num_chunks = rng.gen_range(1..8);
        let chunk = std::iter::repeat_with(|| rng.gen()).take(32).collect();
        Self::new(
            new_rand_pubkey(rng, pubkey),
            new_rand_timestamp(rng),
            rng.gen_range(0..MAX_SLOT),
            rng.gen(),
            num_chunks,
            rng.gen_range(0..num_chunks),
            chunk,
        )
    }
}

/// Hashes of the node's latest full and incremental snapshots, so peers can
/// pick a matching snapshot provider at boot.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SnapshotHashes {
    pub(crate) from: Pubkey,
    pub full: (Slot, Hash),
    pub incremental: Vec<(Slot, Hash)>,
    pub(crate) wallclock: u64,
}

impl Sanitize for SnapshotHashes {
    fn sanitize(&self) -> Result<(), SanitizeError> {
        sanitize_wallclock(self.wallclock)?;
        if self.full.0 >= MAX_SLOT {
            return Err(SanitizeError::ValueOutOfBounds);
        }
        for (slot, _) in &self.incremental {
            if *slot >= MAX_SLOT {
                return Err(SanitizeError::ValueOutOfBounds);
            }
        }
        Ok(())
    }
}

impl SnapshotHashes {
    pub fn new(
        from: Pubkey,
        full: (Slot, Hash),
        incremental: Vec<(Slot, Hash)>,
        wallclock: u64,
    ) -> Self {
        Self {
            from,
            full,
            incremental,
            wallclock,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_rand<R: Rng>(rng: &mut R, pubkey: Option<Pubkey>) -> Self {
        let new_hash = |rng: &mut R| (rng.gen_range(0..MAX_SLOT), Hash::new_from_array(rng.gen()));
        let full = new_hash(rng);
        let incremental_count = rng.gen_range(0..3);
        let incremental = std::iter::repeat_with(|| new_hash(rng))
            .take(incremental_count)
            .collect();
        Self::new(
            new_rand_pubkey(rng, pubkey),
            full,
            incremental,
            new_rand_timestamp(rng),
        )
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rand::SeedableRng, rand_chacha::ChaChaRng};

    #[test]
    fn test_vote_index_bounds() {
        let mut rng = ChaChaRng::from_seed([7u8; 32]);
        let vote = Vote::new_rand(&mut rng, None);
        assert_eq!(CrdsData::Vote(0, vote.clone()).sanitize(), Ok(()));
        assert_eq!(
            CrdsData::Vote(MAX_VOTES, vote).sanitize(),
            Err(SanitizeError::ValueOutOfBounds)
        );
    }

    #[test]
    fn test_duplicate_shred_bounds() {
        let mut rng = ChaChaRng::from_seed([8u8; 32]);
        let shred = DuplicateShred::new_rand(&mut rng, None);
        assert_eq!(CrdsData::DuplicateShred(0, shred.clone()).sanitize(), Ok(()));
        assert_eq!(
            CrdsData::DuplicateShred(MAX_DUPLICATE_SHREDS, shred.clone()).sanitize(),
            Err(SanitizeError::ValueOutOfBounds)
        );
        let mut shred = shred;
        shred.chunk_index = shred.num_chunks;
        assert_eq!(
            CrdsData::DuplicateShred(0, shred).sanitize(),
            Err(SanitizeError::IndexOutOfBounds)
        );
    }

    #[test]
    fn test_wallclock_bounds() {
        let pubkey = Pubkey::from([3u8; 32]);
        let mut info = LegacyContactInfo::new_localhost(&pubkey, 0);
        assert_eq!(info.sanitize(), Ok(()));
        info.set_wallclock(MAX_WALLCLOCK);
        assert_eq!(info.sanitize(), Err(SanitizeError::ValueOutOfBounds));
    }

    #[test]
    fn test_lowest_slot_bounds() {
        let pubkey = Pubkey::from([4u8; 32]);
        let lowest = LowestSlot::new(pubkey, MAX_SLOT, 0);
        assert_eq!(
            CrdsData::LowestSlot(0, lowest.clone()).sanitize(),
            Err(SanitizeError::ValueOutOfBounds)
        );
        // The legacy index is fixed at zero.
        let lowest = LowestSlot::new(pubkey, 0, 0);
        assert_eq!(
            CrdsData::LowestSlot(1, lowest).sanitize(),
            Err(SanitizeError::ValueOutOfBounds)
        );
    }
}
