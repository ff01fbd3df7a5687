#![allow(clippy::arithmetic_side_effects)]

//! # Cluster Replicated Data Store
//!
//! This library implements the replicated data store at the heart of a
//! cluster gossip network: the in-memory, thread-safe, indexed registry of
//! signed values that nodes exchange through push messages, pull requests
//! and pull responses. Every gossip round reads or writes this table, so its
//! conflict resolution, cursor discipline and shard integrity decide whether
//! the cluster converges on one view.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        GOSSIP PROTOCOL LAYER                     │
//! │   push ingest        pull-request builder      pull responder    │
//! └───────┬────────────────────┬──────────────────────┬──────────────┘
//!         │ insert_values      │ purged / cursors     │ bitmask find
//!         ▼                    ▼                      ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ CrdsTable: one RW lock around the store           (crds_table)   │
//! │ ┌──────────────────────────────────────────────────────────────┐ │
//! │ │ Crds: label-keyed records + category indices          (crds) │ │
//! │ │   CrdsShards: 4096 hash-prefix buckets         (crds_shards) │ │
//! │ │   PurgedQueue: FIFO of displaced hashes               (crds) │ │
//! │ └──────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//!         ▲
//!         │ signed containers, canonical encoding, labels
//! ┌───────┴──────────────────────────────────────────────────────────┐
//! │ CrdsValue / CrdsValueLabel (crds_value)   CrdsData (crds_data)   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Guarantees
//!
//! - **Deterministic conflict resolution**: values sharing a label are
//!   ordered by author wallclock, then by value hash, so all nodes keep the
//!   same winner regardless of arrival order.
//! - **Cursor monotonicity**: every accepted write gets the next ordinal of
//!   a gap-free table-wide sequence; readers drain categories through their
//!   own cursors and see each record exactly once.
//! - **Shard integrity**: each stored value sits in exactly the hash-prefix
//!   bucket its canonical encoding dictates, which is what makes
//!   bitmask-scoped pull responses cheap and exact.
//! - **Atomic visibility**: all indices of one insert are updated under one
//!   exclusive lock acquisition; readers never see a half-applied write.
//!
//! The transport, the push/pull protocol state machines, and signature
//! verification live above this crate and are its callers.

/// Distributed data store core: the label-keyed table, its category and
/// cursor indices, the overwrite rule and the purge queue.
pub mod crds;

/// Strongly-typed payload variants carried in gossip values.
pub mod crds_data;

/// Typed single-label lookups into the store.
pub mod crds_entry;

/// Hash-prefix shard index powering bitmask-matched enumeration.
pub mod crds_shards;

/// Read-write-locked envelope and batch write driver.
pub mod crds_table;

/// Cryptographically signed containers and the canonical wire encoding.
pub mod crds_value;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

#[macro_use]
extern crate serde_derive;
