//! Error types for OLSB

use std::net::Ipv4Addr;

use thiserror::Error;

/// Errors surfaced for data packets
///
/// Every packet the router gives up on is reported through its error
/// callback with one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("No usable route to {0}")]
    RouteUnavailable(Ipv4Addr),

    #[error("Host {0} unreachable")]
    HostUnreachable(Ipv4Addr),

    #[error("Packet queue full")]
    QueueFull,

    #[error("Packet waited too long for a route")]
    PacketExpired,

    #[error("Packet is already queued")]
    DuplicatePacket,

    #[error("Routing protocol shut down")]
    Shutdown,
}

/// Errors reported by the control-packet transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Failed to bind control socket on {address}: {reason}")]
    BindFailed { address: Ipv4Addr, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Socket closed")]
    SocketClosed,
}

/// Errors decoding route advertisements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("Malformed route record: {remaining} trailing bytes, expected {expected}")]
    MalformedRecord { remaining: usize, expected: usize },
}
