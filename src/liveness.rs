//! Liveness probing, the only point where the routing core reaches out to the network.

use std::{io, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::trace;

use crate::core::{error::ProbeError, peer::Peer};

/// The liveness RPC consumed by the routing table.
///
/// Implementors dial the peer and ask whether it is alive, transport and decoding failures are
/// reported as errors. Kadvault makes no assumption about the transport used.
#[async_trait]
pub trait LivenessRpc: Send + Sync + 'static {
    async fn ping(&self, peer: &Peer) -> io::Result<bool>;
}

/// Races a [`LivenessRpc`] call against a fixed timeout.
#[derive(Clone)]
pub struct LivenessChecker {
    rpc: Arc<dyn LivenessRpc>,
    timeout: Duration,
}

impl LivenessChecker {
    pub fn new(rpc: Arc<dyn LivenessRpc>, timeout: Duration) -> Self {
        Self { rpc, timeout }
    }

    /// Probes the peer, never running longer than the configured timeout.
    ///
    /// On timeout the in-flight call is dropped, releasing whatever connection it held.
    pub async fn check(&self, peer: &Peer) -> Result<bool, ProbeError> {
        match tokio::time::timeout(self.timeout, self.rpc.ping(peer)).await {
            Ok(Ok(alive)) => Ok(alive),
            Ok(Err(e)) => Err(ProbeError::Transport(e)),
            Err(_elapsed) => Err(ProbeError::Timeout),
        }
    }

    /// Probes the peer and folds every failure into "not alive".
    pub async fn is_alive(&self, peer: &Peer) -> bool {
        match self.check(peer).await {
            Ok(alive) => alive,
            Err(e) => {
                trace!(peer = %peer, error = %e, "probe failed, assuming dead");
                false
            }
        }
    }
}
