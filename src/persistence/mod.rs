//! Durability for the routing table: the active log segment, rotation and startup recovery.
//!
//! On disk the state is always a snapshot at generation `g - 1` plus the log at generation `g`
//! holding every commit made since that snapshot was taken:
//!
//! ```text
//! dht/dht-0   log/log-1      <- right after recovery
//! dht/dht-1   log/log-2      <- after the first rotation
//! ```
//!
//! The log has a single writer. Commits must be appended in the order the bucket actors made
//! them, which [`Persistence`] doesn't enforce: callers funnel every commit through one handle.

mod recovery;
#[cfg(feature = "sync")]
mod sync;

use std::{fs, path::Path};

use tracing::info;

pub use recovery::{recover, Recovered};
use recovery::{dir_error, remove_all_but, RECOVERED_LOG};
#[cfg(feature = "sync")]
pub use sync::SyncPersistence;

use crate::{
    core::{
        config::PersistenceConfig,
        error::{PersistenceError, WalError},
        peer::Peer,
    },
    snapshot::{FileKind, SnapshotStore},
    table::{AddPeerResponse, TableImage},
    wal::{LogRecord, LogWriter},
};

/// The process-wide owner of the active log segment.
#[derive(Debug)]
pub struct Persistence {
    config: PersistenceConfig,
    store: SnapshotStore,
    writer: LogWriter,
    generation: u64,
}

impl Persistence {
    /// Creates the directories if needed, recovers the persisted table and opens a fresh log.
    ///
    /// Returns the handle along with the recovered image to seed the routing table with.
    pub fn open(config: PersistenceConfig) -> Result<(Self, TableImage), PersistenceError> {
        for dir in [&config.log_dir, &config.snapshot_dir] {
            fs::create_dir_all(dir).map_err(|e| dir_error(dir, e))?;
        }

        let Recovered { image, writer, .. } = recover(&config)?;

        let persistence = Self {
            store: SnapshotStore::new(&config.snapshot_dir),
            config,
            writer,
            generation: RECOVERED_LOG,
        };

        Ok((persistence, image))
    }

    /// Returns the generation of the active log.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the path of the active log.
    pub fn log_path(&self) -> &Path {
        self.writer.path()
    }

    /// Durably records that `peer` was written at `(bucket, slot)`.
    ///
    /// If this fails the in-memory table already holds the peer, the commit is simply not
    /// guaranteed to survive a crash.
    pub fn append(&mut self, peer: &Peer, bucket: usize, slot: usize) -> Result<(), WalError> {
        let record = LogRecord::new(peer.clone(), bucket, slot)?;
        self.writer.append(&record)
    }

    /// Appends the commit described by an [`AddPeerResponse`], if there is one. Returns whether a
    /// record was written.
    pub fn commit(&mut self, peer: &Peer, response: &AddPeerResponse) -> Result<bool, WalError> {
        match response.committed() {
            Some((bucket, slot)) => self.append(peer, bucket, slot).map(|_| true),
            None => Ok(false),
        }
    }

    /// Starts a new log generation and snapshots `image` as the state it builds upon, then
    /// deletes every superseded log and snapshot.
    ///
    /// `image` must include every commit appended so far, no commit may be appended until this
    /// returns.
    pub fn rotate(&mut self, image: &TableImage) -> Result<(), PersistenceError> {
        let generation = self.generation + 1;
        let log = self.config.log_dir.join(FileKind::Log.file_name(generation));

        let writer = LogWriter::create(&log)?;
        let snapshot = match self.store.save(self.generation, image) {
            Ok(path) => path,
            Err(e) => {
                // Keep appending to the current log, the empty one is harmless but pointless.
                let _ = fs::remove_file(&log);
                return Err(e.into());
            }
        };

        self.writer = writer;
        self.generation = generation;

        remove_all_but(&self.config.log_dir, FileKind::Log, &log)?;
        remove_all_but(&self.config.snapshot_dir, FileKind::Snapshot, &snapshot)?;

        info!(generation, peers = image.len(), "rotated log");

        Ok(())
    }
}
