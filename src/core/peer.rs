//! Peer routing information.

use std::fmt;

use bincode::{Decode, Encode};

use crate::core::id::PeerId;

/// A peer as stored in the routing table: its identifier and where to reach it.
///
/// Peers are never modified in place, a slot is only ever overwritten by a whole new peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Peer {
    pub id: PeerId,
    pub domain: String,
    pub port: u16,
}

impl Peer {
    pub fn new(id: PeerId, domain: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            domain: domain.into(),
            port,
        }
    }

    /// Returns the `domain:port` pair used to dial the peer.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.domain, self.port)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr() {
        let peer = Peer::new(PeerId::with_first_byte(1), "127.0.0.1", 10000);
        assert_eq!(peer.addr(), "127.0.0.1:10000");
    }
}
