use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    core::{config::PersistenceConfig, error::PersistenceError},
    snapshot::{discover, FileKind, GenerationFile, SnapshotStore},
    table::TableImage,
    wal::{LogReader, LogWriter},
};

/// The generation of the snapshot written at the end of recovery.
pub(crate) const RECOVERED_SNAPSHOT: u64 = 0;
/// The generation of the log opened at the end of recovery.
pub(crate) const RECOVERED_LOG: u64 = 1;

/// The result of reconciling the on-disk state.
#[derive(Debug)]
pub struct Recovered {
    /// The reconciled table.
    pub image: TableImage,
    /// The generation of the snapshot recovery started from, `None` if it started empty.
    pub base: Option<u64>,
    /// The log generations replayed on top of the base, in order.
    pub replayed: Vec<u64>,
    /// The fresh, empty log to append to from now on.
    pub writer: LogWriter,
}

/// Reconciles snapshots and log segments into one table, then compacts the directories down to
/// `dht-0` holding that table and an empty `log-1`.
///
/// Recovery favours availability: a corrupt snapshot is skipped in favour of an older one, and
/// replay stops at the first generation gap, unreadable log or undecodable record, discarding
/// whatever follows.
pub fn recover(config: &PersistenceConfig) -> Result<Recovered, PersistenceError> {
    let store = SnapshotStore::new(&config.snapshot_dir);

    // Both newest first.
    let logs = list(&config.log_dir, FileKind::Log)?;
    let snapshots = list(&config.snapshot_dir, FileKind::Snapshot)?;

    let mut pending: Vec<&GenerationFile> = Vec::new();
    let mut base: Option<(u64, TableImage)> = None;
    let (mut i, mut j) = (0, 0);

    while i < logs.len() && j < snapshots.len() {
        let (log, snapshot) = (&logs[i], &snapshots[j]);

        // Mutations not yet captured by this snapshot.
        if log.generation > snapshot.generation {
            pending.push(log);
            i += 1;
            continue;
        }

        match load(snapshot) {
            Some(image) => {
                base = Some((snapshot.generation, image));
                break;
            }
            None => j += 1,
        }
    }

    // The logs ran out before a usable snapshot was found, keep looking.
    if base.is_none() {
        base = snapshots[j..]
            .iter()
            .find_map(|snapshot| load(snapshot).map(|image| (snapshot.generation, image)));
    }

    let (base, mut next, mut image) = match base {
        Some((generation, image)) => (Some(generation), generation + 1, image),
        None => {
            // Nothing loads: start empty and replay every remaining log from the oldest.
            pending.extend(logs[i..].iter());
            let next = pending.last().map_or(RECOVERED_LOG, |log| log.generation);

            (None, next, TableImage::new())
        }
    };

    let mut replayed = Vec::new();

    // The stack was filled newest first, popping yields ascending generations.
    while let Some(log) = pending.pop() {
        if log.generation != next {
            warn!(
                expected = next,
                found = log.generation,
                "generation gap, discarding the remaining logs"
            );
            break;
        }

        let mut reader = match LogReader::open(&log.path) {
            Ok(reader) => reader,
            Err(e) => {
                warn!(log = %log.path.display(), "can't open log, discarding it: {e}");
                break;
            }
        };

        if let Err(e) = reader.replay_into(&mut image) {
            warn!(
                log = %log.path.display(),
                position = reader.position(),
                "log replay aborted: {e}"
            );
            break;
        }

        replayed.push(log.generation);
        next += 1;
    }

    let writer = compact(config, &store, &image)?;

    info!(
        base = ?base,
        replayed = ?replayed,
        peers = image.len(),
        "recovered routing table"
    );

    Ok(Recovered {
        image,
        base,
        replayed,
        writer,
    })
}

/// Persists the reconciled image as `dht-0`, deletes every other snapshot and log, and opens a
/// fresh `log-1`.
fn compact(
    config: &PersistenceConfig,
    store: &SnapshotStore,
    image: &TableImage,
) -> Result<LogWriter, PersistenceError> {
    // The new snapshot lands before anything is deleted, a crash in between replays onto the same
    // placements.
    let snapshot = store.save(RECOVERED_SNAPSHOT, image)?;
    remove_all_but(&config.snapshot_dir, FileKind::Snapshot, &snapshot)?;

    let log = config.log_dir.join(FileKind::Log.file_name(RECOVERED_LOG));
    remove_all_but(&config.log_dir, FileKind::Log, &log)?;

    Ok(LogWriter::create(log)?)
}

/// Deletes every file of `kind` in `dir` except `keep`. Failures are reported and left for the
/// next compaction.
pub(crate) fn remove_all_but(
    dir: &Path,
    kind: FileKind,
    keep: &Path,
) -> Result<(), PersistenceError> {
    for file in list(dir, kind)? {
        if file.path == keep {
            continue;
        }

        if let Err(e) = fs::remove_file(&file.path) {
            warn!(file = %file.path.display(), "failed to remove superseded file: {e}");
        }
    }

    Ok(())
}

fn list(dir: &Path, kind: FileKind) -> Result<Vec<GenerationFile>, PersistenceError> {
    discover(dir, kind).map_err(|source| dir_error(dir, source))
}

pub(crate) fn dir_error(path: &Path, source: io::Error) -> PersistenceError {
    PersistenceError::Dir {
        path: PathBuf::from(path),
        source,
    }
}

fn load(snapshot: &GenerationFile) -> Option<TableImage> {
    match SnapshotStore::load_path(&snapshot.path) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!(snapshot = %snapshot.path.display(), "skipping unusable snapshot: {e}");
            None
        }
    }
}
