//! Snapshot files and generation-tagged file discovery.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    core::{
        error::{FileNameError, SnapshotError},
        id::HASH_SIZE,
    },
    table::TableImage,
};

/// Upper bound on the decoded size of a snapshot.
const SNAPSHOT_LIMIT: usize = 64 * 1024 * 1024;

/// The two kinds of generation-tagged files kept on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Log,
    Snapshot,
}

impl FileKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            FileKind::Log => "log",
            FileKind::Snapshot => "dht",
        }
    }

    /// Returns the file name for a generation, e.g. `log-3`.
    pub fn file_name(&self, generation: u64) -> String {
        format!("{}-{generation}", self.prefix())
    }

    /// Parses the generation out of a file name such as `dht-12`.
    pub fn parse_generation(&self, name: &str) -> Result<u64, FileNameError> {
        let invalid = || FileNameError {
            name: name.to_owned(),
            prefix: self.prefix(),
        };

        let (prefix, generation) = name.split_once('-').ok_or_else(invalid)?;
        if prefix != self.prefix() || !generation.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        generation.parse().map_err(|_| invalid())
    }
}

/// A generation-tagged file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationFile {
    pub generation: u64,
    pub path: PathBuf,
}

/// Lists the files of one kind in `dir`, newest generation first.
///
/// Files whose names don't parse are reported and skipped, they never stop discovery.
pub fn discover(dir: &Path, kind: FileKind) -> std::io::Result<Vec<GenerationFile>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        match kind.parse_generation(&name) {
            Ok(generation) => files.push(GenerationFile {
                generation,
                path: entry.path(),
            }),
            Err(e) => warn!(dir = %dir.display(), "skipping file: {e}"),
        }
    }

    files.sort_unstable_by(|a, b| b.generation.cmp(&a.generation));

    Ok(files)
}

/// Reads and writes full table images, one file per generation.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, generation: u64) -> PathBuf {
        self.dir.join(FileKind::Snapshot.file_name(generation))
    }

    /// Lists the snapshots on disk, newest first.
    pub fn discover(&self) -> std::io::Result<Vec<GenerationFile>> {
        discover(&self.dir, FileKind::Snapshot)
    }

    /// Durably writes the image as generation `generation`.
    ///
    /// The image is written to a side file first and renamed into place once synced, so a
    /// `dht-<n>` file is never observed half-written.
    pub fn save(&self, generation: u64, image: &TableImage) -> Result<PathBuf, SnapshotError> {
        let path = self.path(generation);
        let partial = path.with_extension("partial");

        {
            let mut writer = BufWriter::new(File::create(&partial)?);
            bincode::encode_into_std_write(image, &mut writer, bincode::config::standard())?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&partial, &path)?;

        debug!(snapshot = %path.display(), peers = image.len(), "saved snapshot");

        Ok(path)
    }

    /// Loads the image saved as generation `generation`.
    pub fn load(&self, generation: u64) -> Result<TableImage, SnapshotError> {
        Self::load_path(&self.path(generation))
    }

    pub(crate) fn load_path(path: &Path) -> Result<TableImage, SnapshotError> {
        let mut reader = BufReader::new(File::open(path)?);
        // A corrupt length prefix must not turn into a giant allocation.
        let config = bincode::config::standard().with_limit::<SNAPSHOT_LIMIT>();
        let image: TableImage = bincode::decode_from_std_read(&mut reader, config)?;

        if image.buckets().len() != HASH_SIZE {
            return Err(SnapshotError::Shape {
                found: image.buckets().len(),
                expected: HASH_SIZE,
            });
        }

        Ok(image)
    }
}
