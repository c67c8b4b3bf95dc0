//! # OLSB Simulation
//!
//! A discrete-event simulation of networks running the OLSB routing
//! protocol.
//!
//! ## Overview
//!
//! Every node runs an unmodified [`olsb_routing::RoutingEngine`]. The
//! simulator supplies its collaborators:
//!
//! - **Clock and timers**: one virtual clock and event heap for the whole
//!   network; cancelled timer tokens are discarded
//! - **Transport**: broadcasts reach every neighbour whose link is up after
//!   a fixed propagation delay
//! - **Backlog**: each node's serialised transmit queue reports its depth per
//!   destination, which is the backpressure signal the node advertises
//!
//! Radio physics and mobility are not modelled; links are simply up or down.
//!
//! ## Architecture
//!
//! - **Topology** (`topology.rs`): line, ring, grid, random and custom graphs
//! - **World** (`world.rs`): the event loop and the collaborator impls
//! - **Scenarios** (`scenarios.rs`): scripted runs producing reports
//!
//! ## Example
//!
//! ```rust,ignore
//! use olsb_simulation::*;
//!
//! let mut world = SimWorld::new(
//!     TopologyBuilder::new(4).line(),
//!     OlsbConfig::blended(0.7, 0.3),
//!     SimConfig::default(),
//! )?;
//! world.run_for(Duration::from_secs(30));
//! assert!(world.is_converged());
//!
//! world.send_data(0, 3, Bytes::from_static(b"hello"))?;
//! world.run_for(Duration::from_secs(1));
//! assert_eq!(world.stats().packets_delivered, 1);
//! ```

pub mod scenarios;
pub mod topology;
pub mod world;

#[cfg(test)]
mod integration_scenarios;

// Re-export main types
pub use olsb_routing::OlsbConfig;
pub use scenarios::{
    ExperimentConfig, NodeTable, ScenarioReport, default_comparison, run_factor_comparison,
    run_line_convergence, run_link_break, run_until_converged,
};
pub use topology::{NodeId, Topology, TopologyBuilder, from_edges, grid, node_address};
pub use world::{Flow, SimConfig, SimError, SimStats, SimWorld};
