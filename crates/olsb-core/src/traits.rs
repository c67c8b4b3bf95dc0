//! Collaborator traits for the OLSB routing engine
//!
//! The engine never performs I/O or sleeps on its own. Everything it needs
//! from the outside world comes through these traits, which lets the same
//! state machine run under a discrete-event simulator or a real stack.
//!
//! ## Key Traits
//!
//! - [`Transport`]: Control-packet sockets
//! - [`Scheduler`]: Time and cancellable timers
//! - [`BacklogSource`]: Local outgoing-queue depth per destination
//! - [`InputHandler`]: Forwarding hooks for transit packets

use std::fmt::Display;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::address::{InterfaceAddress, InterfaceIndex};
use crate::error::{RoutingError, TransportError};
use crate::packet::DataPacket;
use crate::routing::Route;

/// Handle to a bound control socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SocketHandle(pub u64);

/// The protocol's timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Recurring full-table broadcast
    Periodic,
    /// One-shot changed-routes broadcast after the settling delay
    Triggered,
    /// One-shot flush of aggregated route changes
    Aggregation,
}

impl Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerKind::Periodic => write!(f, "periodic"),
            TimerKind::Triggered => write!(f, "triggered"),
            TimerKind::Aggregation => write!(f, "aggregation"),
        }
    }
}

/// Identifies one scheduled firing of a timer
///
/// Every scheduling call issues a token with a fresh generation. A token
/// that no longer matches the engine's pending one is stale and its firing
/// is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerToken {
    /// Which timer this firing belongs to
    pub kind: TimerKind,
    /// Generation counter, unique per engine
    pub generation: u64,
}

impl Display for TimerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.kind, self.generation)
    }
}

/// Control-packet transport
///
/// One socket is bound per local interface. Sends are fire-and-forget: the
/// engine logs failures and relies on the next periodic update to recover.
pub trait Transport {
    /// Bind a control socket to a local interface address
    fn bind(&self, local: InterfaceAddress) -> Result<SocketHandle, TransportError>;

    /// Send a datagram from a socket to a destination address
    fn send_to(
        &self,
        socket: SocketHandle,
        bytes: &[u8],
        destination: Ipv4Addr,
    ) -> Result<(), TransportError>;

    /// Close a socket
    fn close(&self, socket: SocketHandle);
}

/// Time and timer abstraction
///
/// The driver must call back into the engine with the token when a
/// scheduled timer fires. Firing a cancelled token is harmless.
pub trait Scheduler {
    /// Current monotonic time
    fn now(&self) -> Instant;

    /// Schedule a timer to fire after a delay
    fn schedule(&self, delay: Duration, timer: TimerToken);

    /// Cancel a previously scheduled timer
    fn cancel(&self, timer: TimerToken);
}

/// Source of the local congestion signal
///
/// Reports this node's outgoing-queue depth toward a destination. The
/// router only propagates the value; it never measures it.
pub trait BacklogSource {
    /// Current queue depth toward a destination
    fn queue_depth(&self, destination: Ipv4Addr) -> u32;
}

/// Backlog source that always reports an empty queue
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBacklog;

impl BacklogSource for NoBacklog {
    fn queue_depth(&self, _destination: Ipv4Addr) -> u32 {
        0
    }
}

impl<F> BacklogSource for F
where
    F: Fn(Ipv4Addr) -> u32,
{
    fn queue_depth(&self, destination: Ipv4Addr) -> u32 {
        self(destination)
    }
}

/// Forwarding hooks for packets arriving from the network
pub trait InputHandler {
    /// Forward a transit packet along a route
    fn unicast_forward(&mut self, route: Route, packet: DataPacket);

    /// Deliver a packet addressed to this node
    fn local_deliver(&mut self, packet: DataPacket, interface: InterfaceIndex);

    /// Report a packet that cannot be routed
    fn error(&mut self, packet: DataPacket, error: RoutingError);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_backlog() {
        assert_eq!(NoBacklog.queue_depth(Ipv4Addr::new(10, 1, 1, 2)), 0);
    }

    #[test]
    fn test_closure_backlog() {
        let depth = |dst: Ipv4Addr| u32::from(dst.octets()[3]);
        assert_eq!(depth.queue_depth(Ipv4Addr::new(10, 1, 1, 7)), 7);
    }

    #[test]
    fn test_timer_token_display() {
        let token = TimerToken {
            kind: TimerKind::Triggered,
            generation: 12,
        };
        assert_eq!(token.to_string(), "triggered@12");
    }
}
