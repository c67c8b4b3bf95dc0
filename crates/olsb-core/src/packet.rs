//! Data packets handed to the router by the network layer

use std::fmt::Display;
use std::net::Ipv4Addr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Unique identifier for a data packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PacketId(pub u64);

impl Display for PacketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Default time-to-live for originated packets
pub const DEFAULT_TTL: u8 = 64;

/// A network-layer packet
///
/// The payload is opaque to the router; only the header fields take part in
/// routing decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// Packet identifier (used for duplicate detection while queued)
    pub id: PacketId,
    /// Originating address
    pub source: Ipv4Addr,
    /// Final destination
    pub destination: Ipv4Addr,
    /// Remaining hop budget
    pub ttl: u8,
    /// Opaque payload
    pub payload: Bytes,
}

impl DataPacket {
    /// Create a new packet with the default TTL
    pub fn new(id: PacketId, source: Ipv4Addr, destination: Ipv4Addr, payload: Bytes) -> Self {
        Self {
            id,
            source,
            destination,
            ttl: DEFAULT_TTL,
            payload,
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
