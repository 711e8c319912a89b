use std::{path::PathBuf, sync::Arc};

use parking_lot::Mutex;

use crate::{
    core::{
        config::PersistenceConfig,
        error::{PersistenceError, WalError},
        peer::Peer,
    },
    persistence::Persistence,
    table::{AddPeerResponse, TableImage},
};

#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
#[derive(Debug, Clone)]
/// A persistence handle that can be shared between tasks.
///
/// It wraps [`Persistence`] so every append and rotation goes through the same log writer, one
/// at a time. Appends are durable writes and block, from async code call them on a blocking
/// thread.
pub struct SyncPersistence {
    persistence: Arc<Mutex<Persistence>>,
}

impl SyncPersistence {
    pub fn open(config: PersistenceConfig) -> Result<(Self, TableImage), PersistenceError> {
        let (persistence, image) = Persistence::open(config)?;

        Ok((
            Self {
                persistence: Arc::new(Mutex::new(persistence)),
            },
            image,
        ))
    }

    pub fn generation(&self) -> u64 {
        self.persistence.lock().generation()
    }

    pub fn log_path(&self) -> PathBuf {
        self.persistence.lock().log_path().to_path_buf()
    }

    pub fn append(&self, peer: &Peer, bucket: usize, slot: usize) -> Result<(), WalError> {
        self.persistence.lock().append(peer, bucket, slot)
    }

    pub fn commit(&self, peer: &Peer, response: &AddPeerResponse) -> Result<bool, WalError> {
        self.persistence.lock().commit(peer, response)
    }

    pub fn rotate(&self, image: &TableImage) -> Result<(), PersistenceError> {
        self.persistence.lock().rotate(image)
    }
}
