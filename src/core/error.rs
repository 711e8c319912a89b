//! Error types for every fallible boundary of the crate.

use std::{io, path::PathBuf};

use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

/// Errors surfaced to callers of [`RoutingTable::add_peer`](crate::RoutingTable::add_peer).
///
/// A rejected peer is not an error, it is reported through the response.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("the local identifier can't be inserted into its own routing table")]
    LocalPeer,
    #[error("bucket {bucket} didn't respond in time")]
    Timeout { bucket: usize },
    #[error("bucket {bucket} is no longer running")]
    Unavailable { bucket: usize },
    #[error("there is no bucket {bucket}")]
    OutOfRange { bucket: usize },
}

/// Reasons a liveness probe didn't produce an answer, all of them count as "dead".
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("liveness probe timed out")]
    Timeout,
    #[error("liveness probe failed: {0}")]
    Transport(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum WalError {
    #[error("log i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode log record: {0}")]
    Encode(#[from] EncodeError),
    #[error("failed to decode log record: {0}")]
    Decode(#[from] DecodeError),
    #[error("log ends mid-record at byte {position}")]
    Truncated { position: u64 },
    #[error("log record length {len} exceeds the maximum of {max}")]
    Oversized { len: u64, max: u64 },
    #[error("log record addresses an invalid slot ({bucket}, {slot})")]
    InvalidAddress { bucket: i64, slot: i64 },
}

#[derive(Debug, Error)]
#[error("illegal file name {name:?}, the expected format is '{prefix}-<generation>'")]
pub struct FileNameError {
    pub name: String,
    pub prefix: &'static str,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] EncodeError),
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] DecodeError),
    #[error("snapshot holds {found} buckets, expected {expected}")]
    Shape { found: usize, expected: usize },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to access {path:?}: {source}")]
    Dir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
