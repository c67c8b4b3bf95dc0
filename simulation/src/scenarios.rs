//! Pre-defined simulation scenarios for OLSB
//!
//! Each scenario builds a [`SimWorld`], drives it through a fixed script and
//! returns a [`ScenarioReport`]. The same reports back the `olsb-sim` CLI
//! and the scenario tests.

use std::fmt::Display;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use olsb_routing::{ConfigError, EngineStats, OlsbConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::topology::{NodeId, Topology, TopologyBuilder};
use crate::world::{Flow, SimConfig, SimError, SimStats, SimWorld};

/// Routing and link parameters for an experiment, loadable from TOML
///
/// ```toml
/// [routing]
/// periodic_update_interval = { secs = 5, nanos = 0 }
/// shortest_path_factor = 0.7
/// backpressure_factor = 0.3
///
/// [sim]
/// seed = 42
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub routing: OlsbConfig,
    pub sim: SimConfig,
}

impl ExperimentConfig {
    /// Parse and validate an experiment configuration
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.routing.validate()?;
        Ok(config)
    }

    /// Load and validate an experiment configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }
}

/// Outcome of one scenario run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub scenario: String,
    /// Protocol variant (factor preset)
    pub variant: String,
    pub nodes: usize,
    pub links: usize,
    /// Time until every node had a route to every other node
    pub convergence_time: Option<Duration>,
    /// Whether a broken route was replaced by a working one
    pub route_repaired: Option<bool>,
    /// Delivery statistics
    pub stats: SimStats,
    /// Engine counters summed over all nodes
    pub engine: EngineStats,
    /// Final routing tables, when the run asked for them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<NodeTable>,
}

/// One node's rendered routing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTable {
    pub address: Ipv4Addr,
    pub table: String,
}

impl ScenarioReport {
    fn new(scenario: &str, variant: &str, world: &SimWorld) -> Self {
        Self {
            scenario: scenario.to_string(),
            variant: variant.to_string(),
            nodes: world.node_count(),
            links: world.topology().edge_count(),
            convergence_time: None,
            route_repaired: None,
            stats: world.stats(),
            engine: world.engine_stats(),
            routes: Vec::new(),
        }
    }
}

/// Every node's routing table if `print_routes` is set, otherwise nothing
fn node_tables(world: &SimWorld, config: &SimConfig) -> Vec<NodeTable> {
    if !config.print_routes {
        return Vec::new();
    }
    (0..world.node_count())
        .filter_map(|node| {
            Some(NodeTable {
                address: world.address(node)?,
                table: world.routing_table(node)?,
            })
        })
        .collect()
}

impl Display for ScenarioReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== {} ({}) ===", self.scenario, self.variant)?;
        writeln!(f, "  Nodes: {}, links: {}", self.nodes, self.links)?;
        match self.convergence_time {
            Some(t) => writeln!(f, "  Converged after: {:.2}s", t.as_secs_f64())?,
            None => writeln!(f, "  Converged after: never")?,
        }
        if let Some(repaired) = self.route_repaired {
            writeln!(f, "  Route repaired: {}", repaired)?;
        }
        writeln!(
            f,
            "  Packets: {} sent, {} delivered ({:.1}%), {} dropped, {} lost on links",
            self.stats.packets_sent,
            self.stats.packets_delivered,
            self.stats.delivery_ratio() * 100.0,
            self.stats.packets_dropped,
            self.stats.link_losses
        )?;
        writeln!(
            f,
            "  Mean hops: {:.2}, mean latency: {:.2}ms",
            self.stats.mean_hops(),
            self.stats.mean_latency().as_secs_f64() * 1000.0
        )?;
        write!(
            f,
            "  Control: {} datagrams, {} bytes, {} routes broken",
            self.stats.control_datagrams, self.stats.control_bytes, self.engine.routes_broken
        )?;
        for node in &self.routes {
            write!(f, "\n\n  Routes at {}:\n{}", node.address, node.table.trim_end())?;
        }
        Ok(())
    }
}

/// Label for the factor preset a configuration uses
pub fn variant_name(routing: &OlsbConfig) -> String {
    match (routing.shortest_path_factor, routing.backpressure_factor) {
        (_, bp) if bp == 0.0 => "shortest-path".to_string(),
        (sp, _) if sp == 0.0 => "backpressure".to_string(),
        (sp, bp) => format!("blended {sp}/{bp}"),
    }
}

/// Advance in steps until every node routes to every other, up to a limit
///
/// Returns the virtual time it took, measured from the call.
pub fn run_until_converged(world: &mut SimWorld, limit: Duration) -> Option<Duration> {
    const STEP: Duration = Duration::from_millis(50);

    let start = world.elapsed();
    while world.elapsed() - start < limit {
        if world.is_converged() {
            return Some(world.elapsed() - start);
        }
        world.run_for(STEP);
    }
    world.is_converged().then(|| world.elapsed() - start)
}

/// Convergence of a line, then a flow end to end
pub fn run_line_convergence(
    nodes: usize,
    config: &ExperimentConfig,
) -> Result<ScenarioReport, SimError> {
    info!(nodes, "=== Running line convergence scenario ===");
    let routing = config.routing.clone();
    let limit = routing.periodic_update_interval * 4;

    let mut world = SimWorld::new(TopologyBuilder::new(nodes).line(), routing, config.sim.clone())?;
    let convergence_time = run_until_converged(&mut world, limit);

    if nodes > 1 {
        world.schedule_flow(Flow::new(0, nodes - 1, 20, Duration::from_millis(50)));
    }
    world.run_for(Duration::from_secs(5));

    let mut report = ScenarioReport::new("line", &variant_name(world.routing_config()), &world);
    report.convergence_time = convergence_time;
    report.routes = node_tables(&world, &config.sim);
    Ok(report)
}

/// A ring carrying a flow loses the link its route uses
///
/// Node 0 sends to node 2 through node 1. The 1-2 link fails after one
/// periodic interval; the route must be rebuilt the other way round.
pub fn run_link_break(config: &ExperimentConfig) -> Result<ScenarioReport, SimError> {
    const NODES: usize = 6;
    const SOURCE: NodeId = 0;
    const DESTINATION: NodeId = 2;
    info!("=== Running link break scenario ===");

    let routing = config.routing.clone();
    let interval = routing.periodic_update_interval;
    let mut world = SimWorld::new(TopologyBuilder::new(NODES).ring(), routing, config.sim.clone())?;
    let convergence_time = run_until_converged(&mut world, interval * 4);

    let flow_length = interval * 6;
    let gap = Duration::from_millis(100);
    let packets = (flow_length.as_millis() / gap.as_millis()) as usize;
    world.schedule_flow(Flow::new(SOURCE, DESTINATION, packets, gap));

    world.run_for(interval);
    world.set_link(1, 2, false);
    world.run_for(flow_length - interval + Duration::from_secs(2));

    let via_other_side = world.address(NODES - 1);
    let repaired = world
        .engine(SOURCE)
        .zip(world.address(DESTINATION))
        .and_then(|(engine, destination)| engine.lookup(destination))
        .is_some_and(|route| Some(route.gateway) == via_other_side);

    let variant = variant_name(world.routing_config());
    let mut report = ScenarioReport::new("link-break", &variant, &world);
    report.convergence_time = convergence_time;
    report.route_repaired = Some(repaired);
    report.routes = node_tables(&world, &config.sim);
    Ok(report)
}

/// The same topology and traffic under each factor preset
///
/// Runs shortest-path-only, an even blend and backpressure-only in turn.
/// Every run uses the same seeds, so the reports differ only by metric.
pub fn run_factor_comparison(
    topology: &Topology,
    flows: &[Flow],
    config: &ExperimentConfig,
) -> Result<Vec<ScenarioReport>, SimError> {
    info!(nodes = topology.node_count(), flows = flows.len(), "=== Running factor comparison ===");

    let traffic_time = flows
        .iter()
        .map(|f| f.start + f.interval * f.packets as u32)
        .max()
        .unwrap_or_default();

    [(1.0, 0.0), (0.5, 0.5), (0.0, 1.0)]
        .into_iter()
        .map(|(sp, bp)| {
            let mut routing = config.routing.clone();
            routing.shortest_path_factor = sp;
            routing.backpressure_factor = bp;
            let variant = variant_name(&routing);
            let warmup = routing.periodic_update_interval * 2;

            let mut world = SimWorld::new(topology.clone(), routing, config.sim.clone())?;
            let convergence_time = run_until_converged(&mut world, warmup);
            for flow in flows {
                world.schedule_flow(*flow);
            }
            world.run_for(traffic_time + Duration::from_secs(5));
            let routes = node_tables(&world, &config.sim);
            world.shutdown();

            let mut report = ScenarioReport::new("compare", &variant, &world);
            report.convergence_time = convergence_time;
            report.routes = routes;
            Ok(report)
        })
        .collect()
}

/// 4×4 grid with four corner-to-corner flows crossing in the middle
pub fn default_comparison() -> (Topology, Vec<Flow>) {
    let topology = crate::topology::grid(4, 4);
    let gap = Duration::from_millis(5);
    let flows = vec![
        Flow::new(0, 15, 400, gap),
        Flow::new(15, 0, 400, gap),
        Flow::new(3, 12, 400, gap),
        Flow::new(12, 3, 400, gap),
    ];
    (topology, flows)
}
