//! Routes and routing outcomes

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::address::InterfaceIndex;
use crate::packet::DataPacket;

/// Interface index used for loopback routes
pub const LOOPBACK_INTERFACE: InterfaceIndex = InterfaceIndex(0);

/// A resolved route for one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Final destination
    pub destination: Ipv4Addr,
    /// Local address to use as the packet source
    pub source: Ipv4Addr,
    /// Next hop toward the destination
    pub gateway: Ipv4Addr,
    /// Outgoing interface
    pub interface: InterfaceIndex,
}

impl Route {
    /// Create a new route
    pub fn new(
        destination: Ipv4Addr,
        source: Ipv4Addr,
        gateway: Ipv4Addr,
        interface: InterfaceIndex,
    ) -> Self {
        Self {
            destination,
            source,
            gateway,
            interface,
        }
    }

    /// Trivial route for a loopback destination
    pub fn loopback(destination: Ipv4Addr) -> Self {
        Self {
            destination,
            source: Ipv4Addr::LOCALHOST,
            gateway: Ipv4Addr::LOCALHOST,
            interface: LOOPBACK_INTERFACE,
        }
    }

    /// Check if this is a loopback route
    pub fn is_loopback(&self) -> bool {
        self.interface == LOOPBACK_INTERFACE && self.gateway.is_loopback()
    }
}

/// Outcome of routing a locally originated packet
#[derive(Debug)]
pub enum OutputRoute {
    /// A usable route exists; the packet is handed back for sending
    Ready {
        /// The route to use
        route: Route,
        /// The packet, returned to the caller
        packet: DataPacket,
    },

    /// No route yet; the packet is queued until one appears
    Pending,
}

impl OutputRoute {
    /// Check if a route was found
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Check if the packet was queued
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Get the route, if any
    pub fn route(&self) -> Option<&Route> {
        match self {
            Self::Ready { route, .. } => Some(route),
            Self::Pending => None,
        }
    }
}
