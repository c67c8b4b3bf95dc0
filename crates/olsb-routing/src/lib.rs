//! # OLSB Routing
//!
//! Proactive distance-vector routing for multihop wireless networks.
//!
//! Next hops are chosen by a weighted combination of hop count and a
//! backpressure signal (the queue depth each advertiser reports), layered
//! on DSDV-style destination sequence numbers for loop freedom.
//!
//! ## Core Components
//!
//! - [`RoutingEngine`]: Per-node protocol state machine
//! - [`RoutingTable`]: Best route per destination with the acceptance rule
//! - [`PacketQueue`]: Bounded buffer for packets waiting on a route
//! - [`AdvertisedRoute`]: 16-byte wire record of an advertised route
//! - [`OlsbConfig`]: Validated protocol configuration
//!
//! ## Route Selection
//!
//! A candidate route replaces the current one when:
//!
//! 1. **BROKEN**: there is no current route, or it is broken
//! 2. **NEWER**: it carries a higher sequence number
//! 3. **BETTER**: same sequence number and a strictly lower weighted metric
//!
//! Anything else is rejected.
//!
//! ## Example
//!
//! ```rust,ignore
//! use olsb_routing::{OlsbConfig, RoutingEngine};
//!
//! let mut engine = RoutingEngine::new(OlsbConfig::blended(0.7, 0.3), transport, scheduler)?;
//! engine.notify_interface_up(InterfaceIndex(1), address);
//! engine.start()?;
//!
//! // Driven from outside
//! engine.receive_control(InterfaceIndex(1), sender, &datagram);
//! engine.handle_timer(token);
//! match engine.route_output(packet, callbacks)? {
//!     OutputRoute::Ready { route, packet } => { /* send */ }
//!     OutputRoute::Pending => { /* callbacks fire later */ }
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod queue;
pub mod table;
pub mod timer;
pub mod wire;

// Re-export main types
pub use config::{ConfigError, MAX_DURATION, OlsbConfig};
pub use engine::{EngineState, EngineStats, RoutingEngine};
pub use error::{EngineError, EngineResult};
pub use queue::{Admission, DeliveryCallbacks, PacketQueue, QueueEntry};
pub use table::{
    Acceptance, AdvertisementScope, INFINITE_HOPS, MetricWeights, RejectReason, ReplaceReason,
    RouteEntry, RoutingTable, SweepReport, TableDisplay,
};
pub use timer::Timers;
pub use wire::{AdvertisedRoute, RECORD_LEN, RecordReader, encode_batch};

// Re-export core types for convenience
pub use olsb_core::{OutputRoute, Route, RoutingError};
