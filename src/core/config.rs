//! Start-time parameters, none of which can change while the table is running.

use std::{path::PathBuf, time::Duration};

use crate::core::id::PeerId;

/// Default maximum number of peers held per bucket.
pub const DEFAULT_BUCKET_SIZE: usize = 20;
/// Default bound on a single liveness probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default age after which a cached liveness result is re-checked.
pub const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(60);
/// Default bound on how long a caller waits for a bucket to answer.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Routing table configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The node's local identifier.
    pub local_id: PeerId,
    /// The maximum number of peers that can be contained in a bucket (K).
    pub bucket_size: usize,
    /// How long a liveness probe may run before the peer is considered dead.
    pub probe_timeout: Duration,
    /// How old a cache entry can get before the peer is probed again.
    pub cache_expiry: Duration,
    /// How long `add_peer` waits for the bucket actor's response.
    pub request_timeout: Duration,
    /// Capacity of each bucket actor's inbound queue.
    pub queue_depth: usize,
}

impl Config {
    pub fn new(local_id: PeerId) -> Self {
        Self {
            local_id,
            bucket_size: DEFAULT_BUCKET_SIZE,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            cache_expiry: DEFAULT_CACHE_EXPIRY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            queue_depth: 64,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(PeerId::rand())
    }
}

/// Where the write-ahead log segments and the snapshots live.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub log_dir: PathBuf,
    pub snapshot_dir: PathBuf,
}

impl PersistenceConfig {
    /// Places the `log` and `dht` directories under a common root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();

        Self {
            log_dir: root.join("log"),
            snapshot_dir: root.join("dht"),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("log"),
            snapshot_dir: PathBuf::from("dht"),
        }
    }
}
