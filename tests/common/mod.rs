use std::{
    collections::{HashMap, HashSet},
    io,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use kadvault::{Config, LivenessRpc, Peer, PeerId};
use tokio::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

#[allow(dead_code)]
pub fn enable_tracing() {
    fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

/// How a scripted peer answers a liveness probe.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum Answer {
    Alive,
    Dead,
    Unreachable,
    Hang,
}

/// A liveness RPC answering from a script, unscripted peers are alive.
#[derive(Default)]
pub struct ScriptedRpc {
    answers: Mutex<HashMap<PeerId, Answer>>,
    pings: Mutex<Vec<PeerId>>,
}

#[allow(dead_code)]
impl ScriptedRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn set(&self, id: PeerId, answer: Answer) {
        self.answers.lock().await.insert(id, answer);
    }

    pub async fn pinged(&self) -> HashSet<PeerId> {
        self.pings.lock().await.iter().copied().collect()
    }

    pub async fn ping_count(&self) -> usize {
        self.pings.lock().await.len()
    }
}

#[async_trait]
impl LivenessRpc for ScriptedRpc {
    async fn ping(&self, peer: &Peer) -> io::Result<bool> {
        self.pings.lock().await.push(peer.id);

        let answer = self
            .answers
            .lock()
            .await
            .get(&peer.id)
            .copied()
            .unwrap_or(Answer::Alive);

        match answer {
            Answer::Alive => Ok(true),
            Answer::Dead => Ok(false),
            Answer::Unreachable => Err(io::ErrorKind::ConnectionRefused.into()),
            Answer::Hang => std::future::pending().await,
        }
    }
}

/// The local identity used across tests: every candidate whose first bit is `0` lands in
/// bucket 0.
pub fn local_id() -> PeerId {
    PeerId::with_first_byte(0xff)
}

/// A config with entries that are always stale, so full buckets always probe.
#[allow(dead_code)]
pub fn config(bucket_size: usize) -> Config {
    Config {
        bucket_size,
        cache_expiry: Duration::ZERO,
        ..Config::new(local_id())
    }
}

pub fn peer(first: u8) -> Peer {
    Peer::new(PeerId::with_first_byte(first), "127.0.0.1", 8000 + first as u16)
}
