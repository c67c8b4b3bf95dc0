//! # OLSB Core
//!
//! Core types, collaborator traits, and errors for the OLSB routing protocol.
//!
//! OLSB is a proactive distance-vector protocol for multihop wireless
//! networks. It ranks routes by a weighted blend of hop count and a
//! backpressure (queue depth) signal, and keeps them loop-safe with
//! DSDV-style destination sequence numbers.
//!
//! This crate holds everything the routing engine shares with the code that
//! embeds it, so that the same engine runs under the discrete-event simulator
//! and under a real network stack.
//!
//! ## Key Traits
//!
//! - [`Transport`]: Control-packet sockets (bind, send, close)
//! - [`Scheduler`]: Monotonic clock plus cancellable one-shot timers
//! - [`BacklogSource`]: Local queue-depth signal per destination
//! - [`InputHandler`]: Forwarding hooks invoked for transit packets
//!
//! ## Key Types
//!
//! - [`InterfaceAddress`]: Local address and mask of an interface
//! - [`DataPacket`]: A network-layer packet handed to the router
//! - [`Route`]: A resolved next hop for a destination
//! - [`TimerToken`]: Identifies one scheduled firing of a protocol timer

pub mod address;
pub mod error;
pub mod packet;
pub mod routing;
pub mod traits;

// Re-export main types
pub use address::*;
pub use error::*;
pub use packet::*;
pub use routing::*;
pub use traits::*;
