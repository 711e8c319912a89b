use std::{cmp::Ordering, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinSet,
};
use tracing::{debug, error, trace};

use crate::{cache::LivenessCache, core::peer::Peer, liveness::LivenessChecker};

/// The outcome of submitting a peer to its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddPeerResponse {
    /// The bucket the peer maps to.
    pub bucket: usize,
    /// The slot the peer occupies, `None` if it was rejected.
    pub slot: Option<usize>,
    /// Whether liveness probes were sent to reach the decision.
    pub ping: bool,
    /// Whether the peer was written into the bucket. Every `true` is a commit the caller must
    /// record in the write-ahead log.
    pub inserted: bool,
}

impl AddPeerResponse {
    fn inserted(bucket: usize, slot: usize, ping: bool) -> Self {
        Self {
            bucket,
            slot: Some(slot),
            ping,
            inserted: true,
        }
    }

    fn seen(bucket: usize, slot: usize) -> Self {
        Self {
            bucket,
            slot: Some(slot),
            ping: false,
            inserted: false,
        }
    }

    fn rejected(bucket: usize) -> Self {
        Self {
            bucket,
            slot: None,
            ping: true,
            inserted: false,
        }
    }

    /// Returns the `(bucket, slot)` address written to, if the peer was inserted.
    pub fn committed(&self) -> Option<(usize, usize)> {
        match (self.inserted, self.slot) {
            (true, Some(slot)) => Some((self.bucket, slot)),
            _ => None,
        }
    }
}

pub(crate) struct PeerRequest {
    pub(crate) peer: Peer,
    pub(crate) responder: oneshot::Sender<AddPeerResponse>,
}

pub(crate) enum BucketCommand {
    AddPeer(PeerRequest),
    Peers(oneshot::Sender<Vec<Peer>>),
}

/// Exclusive owner of one bucket and its slice of the liveness cache.
///
/// Commands are handled one at a time in arrival order, no other task ever touches this state.
pub(crate) struct BucketActor {
    index: usize,
    bucket_size: usize,
    cache_expiry: Duration,
    peers: Vec<Peer>,
    cache: LivenessCache,
    checker: LivenessChecker,
    rx: mpsc::Receiver<BucketCommand>,
}

impl BucketActor {
    pub(crate) fn new(
        index: usize,
        bucket_size: usize,
        cache_expiry: Duration,
        peers: Vec<Peer>,
        checker: LivenessChecker,
        rx: mpsc::Receiver<BucketCommand>,
    ) -> Self {
        // A recovered bucket can't be larger than what the running table allows.
        assert!(
            peers.len() <= bucket_size,
            "bucket {index} holds {} peers, capacity is {bucket_size}",
            peers.len()
        );

        Self {
            index,
            bucket_size,
            cache_expiry,
            cache: LivenessCache::unchecked(peers.len()),
            peers,
            checker,
            rx,
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                BucketCommand::AddPeer(PeerRequest { peer, responder }) => {
                    let response = self.decide(peer).await;
                    // The caller may have timed out and dropped the receiver, the decision stands
                    // regardless.
                    if responder.send(response).is_err() {
                        debug!(bucket = self.index, "caller went away before the response");
                    }
                }
                BucketCommand::Peers(responder) => {
                    let _ = responder.send(self.peers.clone());
                }
            }
        }

        trace!(bucket = self.index, "bucket actor stopped");
    }

    async fn decide(&mut self, peer: Peer) -> AddPeerResponse {
        // Seen again: refresh its liveness, nothing is written.
        if let Some(col) = self.peers.iter().position(|p| p.id == peer.id) {
            self.cache.set(col, false);
            trace!(bucket = self.index, slot = col, "peer already present");

            return AddPeerResponse::seen(self.index, col);
        }

        match self.peers.len().cmp(&self.bucket_size) {
            Ordering::Less => {
                let col = self.peers.len();
                debug!(bucket = self.index, slot = col, peer = %peer, "inserting peer");

                self.peers.push(peer);
                self.cache.set(col, false);

                AddPeerResponse::inserted(self.index, col, false)
            }
            Ordering::Equal => self.evict(peer).await,
            Ordering::Greater => {
                // Bucket is over capacity, this should never happen.
                unreachable!(
                    "bucket {} holds {} peers, capacity is {}",
                    self.index,
                    self.peers.len(),
                    self.bucket_size
                )
            }
        }
    }

    async fn evict(&mut self, peer: Peer) -> AddPeerResponse {
        if let Some(col) = self.cache.first_dead() {
            self.replace(col, peer);
            return AddPeerResponse::inserted(self.index, col, false);
        }

        self.probe_stale().await;

        match self.cache.first_dead() {
            Some(col) => {
                self.replace(col, peer);
                AddPeerResponse::inserted(self.index, col, true)
            }
            None => {
                debug!(bucket = self.index, peer = %peer, "bucket full, rejecting peer");
                AddPeerResponse::rejected(self.index)
            }
        }
    }

    fn replace(&mut self, col: usize, peer: Peer) {
        debug!(
            bucket = self.index,
            slot = col,
            evicted = %self.peers[col],
            peer = %peer,
            "replacing dead peer"
        );

        self.peers[col] = peer;
        self.cache.set(col, false);
    }

    /// Probes every stale slot concurrently and returns once each slot of the bucket has settled
    /// for this round. Fresh slots settle immediately as alive.
    async fn probe_stale(&mut self) {
        let mut probes = JoinSet::new();
        let mut settled = 0;

        for (col, peer) in self.peers.iter().enumerate() {
            if self.cache.is_stale(col, self.cache_expiry) {
                let checker = self.checker.clone();
                let peer = peer.clone();
                probes.spawn(async move { (col, checker.is_alive(&peer).await) });
            } else {
                settled += 1;
            }
        }

        while let Some(outcome) = probes.join_next().await {
            match outcome {
                Ok((col, alive)) => {
                    trace!(bucket = self.index, slot = col, alive, "probe settled");
                    self.cache.set(col, !alive);
                }
                Err(e) => error!(bucket = self.index, error = %e, "probe task failed"),
            }

            settled += 1;
        }

        // The barrier is sized to the bucket as it is now, not to its capacity.
        debug_assert_eq!(settled, self.peers.len());
    }
}
