//! Peer identifier types.

use std::fmt;

use bincode::{Decode, Encode};

/// The number of buckets in the routing table, one per bit of identifier length.
pub const HASH_SIZE: usize = PeerId::BITS;

/// A 256-bit peer identifier that implements a non-euclidian XOR-based distance metric.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct PeerId {
    bytes: [u8; Self::BYTES],
}

impl PeerId {
    /// The size of the identifier in bytes.
    pub const BYTES: usize = 32;

    /// The size of the identifier in bits.
    pub const BITS: usize = Self::BYTES * 8;

    /// Creates a new identifier from the supplied bytes.
    pub fn new(bytes: [u8; Self::BYTES]) -> Self {
        PeerId { bytes }
    }

    /// Returns the bytes backing the identifier.
    pub fn bytes(&self) -> [u8; Self::BYTES] {
        self.bytes
    }

    #[doc(hidden)]
    /// Convenience function for building identifiers whose first byte is significant, the rest
    /// of the identifier is left zeroed.
    pub fn with_first_byte(first: u8) -> Self {
        let mut bytes = [0u8; Self::BYTES];
        bytes[0] = first;

        Self { bytes }
    }

    /// Generates a random identifier.
    pub fn rand() -> Self {
        use rand::{thread_rng, Fill};

        let mut rng = thread_rng();
        let mut bytes = [0u8; Self::BYTES];
        let _res = bytes.try_fill(&mut rng);
        // Sanity check this doesn't fail in debug mode.
        debug_assert!(_res.is_ok());

        Self { bytes }
    }

    /// Returns the XOR distance between two identifiers, comparable byte-for-byte.
    pub fn distance(&self, other: &PeerId) -> [u8; Self::BYTES] {
        let mut distance = [0u8; Self::BYTES];
        for (d, (a, b)) in distance
            .iter_mut()
            .zip(self.bytes.iter().zip(other.bytes.iter()))
        {
            *d = a ^ b;
        }

        distance
    }

    /// Computes the index of the bucket `other` belongs to from this identifier's point of view,
    /// `None` if both identifiers are the same.
    ///
    /// The index is the position of the first differing bit, read most-significant bit first:
    ///
    /// ```text
    /// [0b0000_0000, 0b0010_0000, ..] <- XOR of both identifiers
    ///       0            1            <- byte index i
    ///
    /// bucket = 8 * i + leading_zeros = 8 * 1 + 2 = 10
    /// ```
    pub fn bucket_index(&self, other: &PeerId) -> Option<usize> {
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(&a, &b)| a ^ b)
            .enumerate()
            .find(|(_, byte)| byte != &0b0)
            // The left shift multiplies the index by 8 to get its value in bits.
            .map(|(i, byte)| (i << 3) + byte.leading_zeros() as usize)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({self})")
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first 8 bytes are plenty to tell peers apart in logs.
        for byte in &self.bytes[..8] {
            write!(f, "{byte:02x}")?;
        }

        Ok(())
    }
}

impl From<[u8; PeerId::BYTES]> for PeerId {
    fn from(bytes: [u8; PeerId::BYTES]) -> Self {
        Self::new(bytes)
    }
}
