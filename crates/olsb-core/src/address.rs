//! Interface and address types
//!
//! OLSB runs over IPv4. Each local interface carries one address and mask;
//! control packets are broadcast to the interface's subnet broadcast address.

use std::fmt::Display;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Index of a local network interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterfaceIndex(pub u32);

impl Display for InterfaceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "if{}", self.0)
    }
}

/// Local address and mask of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceAddress {
    /// Address assigned to the interface
    pub local: Ipv4Addr,
    /// Subnet mask
    pub mask: Ipv4Addr,
}

impl InterfaceAddress {
    /// Create a new interface address
    pub fn new(local: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self { local, mask }
    }

    /// Create an interface address from a prefix length (`10.1.1.1/24`)
    pub fn with_prefix(local: Ipv4Addr, prefix_len: u8) -> Self {
        let bits = match prefix_len {
            0 => 0,
            n if n >= 32 => u32::MAX,
            n => u32::MAX << (32 - n),
        };
        Self {
            local,
            mask: Ipv4Addr::from(bits),
        }
    }

    /// Network address of the subnet
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.local) & u32::from(self.mask))
    }

    /// Subnet broadcast address
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.local) | !u32::from(self.mask))
    }

    /// Check if an address lies inside this interface's subnet
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & u32::from(self.mask) == u32::from(self.network())
    }
}

impl Display for InterfaceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.local, u32::from(self.mask).count_ones())
    }
}
