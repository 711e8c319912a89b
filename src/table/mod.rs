//! The routing table: one actor per bucket, addressed by XOR distance to the local identifier.

mod actor;

use std::{collections::HashSet, sync::Arc};

use bincode::{Decode, Encode};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub use actor::AddPeerResponse;
use actor::{BucketActor, BucketCommand, PeerRequest};

use crate::{
    core::{
        config::Config,
        error::RoutingError,
        id::{PeerId, HASH_SIZE},
        peer::Peer,
    },
    liveness::{LivenessChecker, LivenessRpc},
};

/// A point-in-time copy of every bucket, the unit persisted by snapshots and rebuilt by
/// recovery.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct TableImage {
    buckets: Vec<Vec<Peer>>,
}

impl Default for TableImage {
    fn default() -> Self {
        Self::new()
    }
}

impl TableImage {
    /// Creates an image with [`HASH_SIZE`] empty buckets.
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); HASH_SIZE],
        }
    }

    pub(crate) fn from_buckets(buckets: Vec<Vec<Peer>>) -> Self {
        debug_assert_eq!(buckets.len(), HASH_SIZE);
        Self { buckets }
    }

    /// Returns the peers of bucket `i`, in slot order.
    ///
    /// # Panics
    ///
    /// If `i` is not below [`HASH_SIZE`].
    pub fn bucket(&self, i: usize) -> &[Peer] {
        &self.buckets[i]
    }

    pub fn buckets(&self) -> &[Vec<Peer>] {
        &self.buckets
    }

    pub(crate) fn into_buckets(self) -> Vec<Vec<Peer>> {
        self.buckets
    }

    /// Returns the total number of peers across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    /// Writes the peer at `(bucket, slot)`, appending if the slot is past the bucket's end and
    /// overwriting otherwise, the same addressing the bucket actors commit with.
    ///
    /// # Panics
    ///
    /// If `bucket` is not below [`HASH_SIZE`].
    pub fn place(&mut self, bucket: usize, slot: usize, peer: Peer) {
        let bucket = &mut self.buckets[bucket];

        if slot >= bucket.len() {
            bucket.push(peer);
        } else {
            bucket[slot] = peer;
        }
    }

    /// Reshapes the image for a table owned by `local_id` holding at most `bucket_size` peers per
    /// bucket, returning whether anything changed.
    ///
    /// Bucket positions depend on the local identifier, which is not persisted. Peers are moved to
    /// the bucket they map to, in bucket then slot order. The local identifier itself, repeated
    /// identifiers and peers past a bucket's capacity are dropped.
    pub fn conform(&mut self, local_id: &PeerId, bucket_size: usize) -> bool {
        let mut buckets = vec![Vec::new(); HASH_SIZE];
        let mut seen = HashSet::new();

        for peer in self.buckets.iter().flatten() {
            let Some(bucket) = local_id.bucket_index(&peer.id) else {
                warn!(peer = %peer, "dropping the local identifier from the image");
                continue;
            };

            if !seen.insert(peer.id) {
                warn!(peer = %peer, "dropping a repeated peer from the image");
                continue;
            }

            if buckets[bucket].len() >= bucket_size {
                warn!(bucket, peer = %peer, "bucket is over capacity, dropping peer");
                continue;
            }

            buckets[bucket].push(peer.clone());
        }

        if buckets == self.buckets {
            return false;
        }

        self.buckets = buckets;
        true
    }
}

/// A cheaply cloneable handle to the running bucket actors.
#[derive(Clone)]
pub struct RoutingTable {
    local_id: PeerId,
    request_timeout: std::time::Duration,
    buckets: Arc<Vec<mpsc::Sender<BucketCommand>>>,
}

impl RoutingTable {
    /// Spawns an empty table. Must be called from within a tokio runtime.
    pub fn spawn(config: Config, rpc: Arc<dyn LivenessRpc>) -> Self {
        Self::spawn_with_image(config, rpc, TableImage::new())
    }

    /// Spawns a table seeded with a recovered image.
    ///
    /// The image is first [conformed](TableImage::conform) to the configuration. When that
    /// changes it, the persisted state no longer matches the table's slots: conform the image
    /// and rotate it into a new snapshot before spawning.
    ///
    /// Seeded peers start unchecked, they will be probed the first time their bucket fills up.
    pub fn spawn_with_image(
        config: Config,
        rpc: Arc<dyn LivenessRpc>,
        mut image: TableImage,
    ) -> Self {
        if image.conform(&config.local_id, config.bucket_size) {
            warn!(peers = image.len(), "recovered image didn't match the configuration");
        }

        let checker = LivenessChecker::new(rpc, config.probe_timeout);

        let buckets = image
            .into_buckets()
            .into_iter()
            .enumerate()
            .map(|(i, peers)| {
                let (tx, rx) = mpsc::channel(config.queue_depth);
                let actor = BucketActor::new(
                    i,
                    config.bucket_size,
                    config.cache_expiry,
                    peers,
                    checker.clone(),
                    rx,
                );
                tokio::spawn(actor.run());

                tx
            })
            .collect();

        Self {
            local_id: config.local_id,
            request_timeout: config.request_timeout,
            buckets: Arc::new(buckets),
        }
    }

    /// Returns this table's local identifier.
    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    /// Submits a candidate peer to the bucket it maps to and waits for the decision.
    ///
    /// A timeout doesn't cancel the decision, the bucket still commits it and the late response
    /// is discarded.
    pub async fn add_peer(
        &self,
        domain: impl Into<String>,
        port: u16,
        id: PeerId,
    ) -> Result<AddPeerResponse, RoutingError> {
        self.insert(Peer::new(id, domain, port)).await
    }

    /// Same as [`add_peer`](Self::add_peer) for an already assembled peer.
    pub async fn insert(&self, peer: Peer) -> Result<AddPeerResponse, RoutingError> {
        let bucket = self
            .local_id
            .bucket_index(&peer.id)
            .ok_or(RoutingError::LocalPeer)?;

        let (responder, response) = oneshot::channel();
        let request = BucketCommand::AddPeer(PeerRequest { peer, responder });

        let exchange = async {
            self.buckets[bucket]
                .send(request)
                .await
                .map_err(|_| RoutingError::Unavailable { bucket })?;

            response
                .await
                .map_err(|_| RoutingError::Unavailable { bucket })
        };

        match tokio::time::timeout(self.request_timeout, exchange).await {
            Ok(result) => result,
            Err(_elapsed) => {
                debug!(bucket, "add_peer timed out");
                Err(RoutingError::Timeout { bucket })
            }
        }
    }

    /// Returns the current contents of a bucket, in slot order.
    pub async fn bucket(&self, i: usize) -> Result<Vec<Peer>, RoutingError> {
        let bucket = self
            .buckets
            .get(i)
            .ok_or(RoutingError::OutOfRange { bucket: i })?;

        let (tx, rx) = oneshot::channel();
        bucket
            .send(BucketCommand::Peers(tx))
            .await
            .map_err(|_| RoutingError::Unavailable { bucket: i })?;

        rx.await.map_err(|_| RoutingError::Unavailable { bucket: i })
    }

    /// Collects every bucket into an image, e.g. for a snapshot.
    ///
    /// Buckets are read one after another, mutations racing with the collection may or may not
    /// be reflected.
    pub async fn image(&self) -> Result<TableImage, RoutingError> {
        let mut buckets = Vec::with_capacity(HASH_SIZE);
        for i in 0..self.buckets.len() {
            buckets.push(self.bucket(i).await?);
        }

        Ok(TableImage::from_buckets(buckets))
    }

    /// Returns up to `n` known peers closest to `target` by XOR distance, the data source for
    /// the closest-nodes RPC.
    pub async fn closest(&self, target: &PeerId, n: usize) -> Result<Vec<Peer>, RoutingError> {
        let mut peers: Vec<Peer> = self.image().await?.into_buckets().concat();

        peers.sort_unstable_by_key(|peer| peer.id.distance(target));
        peers.truncate(n);

        Ok(peers)
    }
}
