//! A Kademlia routing table with liveness-driven eviction and crash-safe persistence.
//!
//! The table is split into [`HASH_SIZE`] buckets, each owned by its own tokio task. A candidate
//! peer is routed to the bucket matching the position of the first bit its identifier differs
//! from ours by, and that bucket alone decides whether to insert it, replace a dead peer with it
//! or reject it. No locks guard bucket state, only message passing reaches it.
//!
//! ## Eviction
//!
//! A full bucket first reuses a slot already known to be dead. Failing that, it probes every
//! peer whose liveness check is older than the configured expiry (in parallel, each probe bounded
//! by a timeout) and waits until every slot has settled before deciding. A timeout or transport
//! error counts as dead.
//!
//! ## Persistence
//!
//! Every insertion reported by [`RoutingTable::add_peer`] is a commit the caller appends to the
//! write-ahead log through [`Persistence`]. The log is periodically rotated into a snapshot, and
//! on startup [`Persistence::open`] reconciles whatever snapshots and log segments survived into
//! a single [`TableImage`] to seed the table with.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use kadvault::{Config, LivenessRpc, Persistence, PersistenceConfig, PeerId, RoutingTable};
//! # async fn run(rpc: Arc<dyn LivenessRpc>) -> Result<(), Box<dyn std::error::Error>> {
//! // Buckets are addressed relative to the local identifier, it must be stable across restarts.
//! let config = Config::new(PeerId::new([7; 32]));
//!
//! let (mut persistence, mut image) = Persistence::open(PersistenceConfig::new("/var/lib/kad"))?;
//! if image.conform(&config.local_id, config.bucket_size) {
//!     persistence.rotate(&image)?;
//! }
//! let table = RoutingTable::spawn_with_image(config, rpc, image);
//!
//! let peer = kadvault::Peer::new(PeerId::rand(), "10.0.0.7", 4000);
//! let response = table.insert(peer.clone()).await?;
//! persistence.commit(&peer, &response)?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(doc_cfg, feature(doc_cfg))]

pub mod cache;
pub mod liveness;
pub mod persistence;
pub mod snapshot;
pub mod table;
pub mod wal;

mod core;

pub use crate::{
    core::{
        config::{Config, PersistenceConfig},
        error,
        id::{PeerId, HASH_SIZE},
        peer::Peer,
    },
    liveness::{LivenessChecker, LivenessRpc},
    persistence::Persistence,
    table::{AddPeerResponse, RoutingTable, TableImage},
};
#[cfg(feature = "sync")]
pub use crate::persistence::SyncPersistence;
