//! OLSB network simulator
//!
//! Runs scripted scenarios over simulated topologies and prints a report per
//! run, as text or JSON.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use olsb_logging::{FileConfig, LogConfig, OlsbSubscriberBuilder};

use olsb_simulation::{
    ExperimentConfig, Flow, ScenarioReport, TopologyBuilder, default_comparison, grid, scenarios,
};

#[derive(Parser)]
#[command(
    name = "olsb-sim",
    about = "Simulate OLSB routing and compare metric factor presets",
    version
)]
struct Cli {
    /// Trace routing decisions (OLSB crates at debug, others at warn)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write JSONL logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Append every node's final routing table to the report
    #[arg(long, global = true)]
    print_routes: bool,

    /// Experiment configuration (TOML with [routing] and [sim] tables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converge a line of nodes and send a flow end to end
    Line {
        /// Number of nodes
        #[arg(short, long, default_value = "5")]
        nodes: usize,
    },

    /// Break the link a flow uses in a ring and watch the route repair
    Break,

    /// Run the same traffic under shortest-path, blended and backpressure metrics
    Compare {
        /// Type of topology: grid, ring, line, random
        #[arg(short, long, default_value = "grid")]
        topology: String,

        /// Number of nodes (grid uses the nearest square)
        #[arg(short, long, default_value = "16")]
        nodes: usize,

        /// Connection probability for random topology
        #[arg(long, default_value = "0.3")]
        connection_prob: f64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::protocol("debug")
    } else {
        LogConfig::development().with_level("info")
    };
    let mut logging = OlsbSubscriberBuilder::new().with_config(log_config);
    if let Some(dir) = &cli.log_dir {
        logging = logging.with_file_output(FileConfig::new(dir.clone()));
    }
    let _guard = logging.init()?;

    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("loading experiment config {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    config.sim.print_routes |= cli.print_routes;

    let reports = match cli.command {
        Commands::Line { nodes } => vec![scenarios::run_line_convergence(nodes, &config)?],
        Commands::Break => vec![scenarios::run_link_break(&config)?],
        Commands::Compare {
            topology,
            nodes,
            connection_prob,
        } => {
            let (topology, flows) = comparison_setup(&topology, nodes, connection_prob, &config)?;
            println!("{}", topology.visualize());
            scenarios::run_factor_comparison(&topology, &flows, &config)?
        }
    };

    print_reports(&reports, cli.json)
}

fn comparison_setup(
    kind: &str,
    nodes: usize,
    connection_prob: f64,
    config: &ExperimentConfig,
) -> anyhow::Result<(olsb_simulation::Topology, Vec<Flow>)> {
    anyhow::ensure!(nodes >= 2, "need at least two nodes, got {nodes}");

    let topology = match kind {
        "grid" if nodes == 16 => return Ok(default_comparison()),
        "grid" => {
            let side = (nodes as f64).sqrt().round().max(2.0) as usize;
            grid(side, side)
        }
        "ring" => TopologyBuilder::new(nodes).ring(),
        "line" => TopologyBuilder::new(nodes).line(),
        "random" => TopologyBuilder::new(nodes).random(connection_prob, config.sim.seed),
        other => anyhow::bail!("unknown topology: {other}"),
    };

    // Two opposing flows between the first and last node
    let last = topology.node_count() - 1;
    let gap = Duration::from_millis(5);
    let flows = vec![Flow::new(0, last, 400, gap), Flow::new(last, 0, 400, gap)];
    Ok((topology, flows))
}

fn print_reports(reports: &[ScenarioReport], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
    } else {
        for report in reports {
            println!("{report}\n");
        }
    }
    Ok(())
}
