//! Scenario-level tests for OLSB routing
//!
//! These run whole networks through the scripted scenarios with short
//! timers so each test covers minutes of protocol time in a few thousand
//! events.

use std::time::Duration;

use bytes::Bytes;
use olsb_routing::OlsbConfig;

use crate::scenarios::{
    ExperimentConfig, run_factor_comparison, run_line_convergence, run_link_break,
    run_until_converged,
};
use crate::topology::{TopologyBuilder, from_edges, grid};
use crate::world::{Flow, SimConfig, SimWorld};

fn fast_routing() -> OlsbConfig {
    OlsbConfig::default()
        .with_periodic_update_interval(Duration::from_secs(2))
        .with_settling_time(Duration::from_millis(200))
}

fn fast_experiment() -> ExperimentConfig {
    ExperimentConfig {
        routing: fast_routing(),
        sim: SimConfig::default(),
    }
}

#[test]
fn test_line_converges_and_delivers() {
    let report = run_line_convergence(5, &fast_experiment()).unwrap();

    assert!(report.convergence_time.is_some());
    assert_eq!(report.stats.packets_sent, 20);
    assert_eq!(report.stats.packets_delivered, 20);
    assert_eq!(report.stats.mean_hops(), 4.0);
    assert_eq!(report.engine.malformed_datagrams, 0);
}

#[test]
fn test_triggered_updates_beat_periodic_propagation() {
    // Periodic updates alone would move each route one hop per interval,
    // needing four intervals to span this line
    let experiment = fast_experiment();
    let report = run_line_convergence(6, &experiment).unwrap();
    let converged = report.convergence_time.unwrap();
    assert!(
        converged < experiment.routing.periodic_update_interval * 2,
        "took {converged:?}"
    );
}

#[test]
fn test_link_break_is_repaired() {
    let report = run_link_break(&fast_experiment()).unwrap();

    assert_eq!(report.route_repaired, Some(true));
    assert!(report.engine.routes_broken > 0);
    assert!(
        report.stats.delivery_ratio() > 0.5,
        "delivered {} of {}",
        report.stats.packets_delivered,
        report.stats.packets_sent
    );
    // The outage costs packets
    assert!(report.stats.packets_delivered < report.stats.packets_sent);
}

#[test]
fn test_factor_comparison_runs_every_preset() {
    let topology = grid(3, 3);
    let flows = vec![Flow::new(0, 8, 50, Duration::from_millis(10))];
    let reports = run_factor_comparison(&topology, &flows, &fast_experiment()).unwrap();

    let variants: Vec<_> = reports.iter().map(|r| r.variant.as_str()).collect();
    assert_eq!(variants, ["shortest-path", "blended 0.5/0.5", "backpressure"]);
    for report in &reports {
        assert_eq!(report.stats.packets_sent, 50);
        assert!(report.convergence_time.is_some());
    }

    // Corner to corner is at least 4 hops; hop-count routing never loops
    let shortest = &reports[0];
    assert_eq!(shortest.stats.packets_delivered, 50);
    assert!(shortest.stats.mean_hops() >= 4.0);
    assert_eq!(shortest.stats.ttl_expired, 0);
}

#[test]
fn test_same_seed_same_outcome() {
    let run = || {
        let mut world = SimWorld::new(grid(3, 3), fast_routing(), SimConfig::default()).unwrap();
        run_until_converged(&mut world, Duration::from_secs(8));
        world.schedule_flow(Flow::new(0, 8, 30, Duration::from_millis(3)));
        world.schedule_flow(Flow::new(2, 6, 30, Duration::from_millis(3)));
        world.run_for(Duration::from_secs(3));
        world.stats()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_partitioned_node_rejoins() {
    let mut world =
        SimWorld::new(TopologyBuilder::new(4).line(), fast_routing(), SimConfig::default())
            .unwrap();
    assert!(run_until_converged(&mut world, Duration::from_secs(8)).is_some());

    // Cut node 3 off; its routes expire after the hold time
    world.set_link(2, 3, false);
    world.run_for(fast_routing().route_lifetime() + Duration::from_secs(2));
    assert!(!world.has_route(0, 3));
    assert!(world.has_route(0, 2));

    world.set_link(2, 3, true);
    assert!(run_until_converged(&mut world, Duration::from_secs(8)).is_some());
    world.send_data(0, 3, Bytes::from_static(b"back")).unwrap();
    world.run_for(Duration::from_millis(100));
    assert_eq!(world.stats().packets_delivered, 1);
}

#[test]
fn test_interface_down_clears_node() {
    let topology = from_edges(&[(0, 1), (1, 2)]);
    let mut world = SimWorld::new(topology, fast_routing(), SimConfig::default()).unwrap();
    assert!(run_until_converged(&mut world, Duration::from_secs(8)).is_some());

    world.set_interface(1, false).unwrap();
    assert!(world.engine(1).unwrap().table().is_empty());
    assert!(!world.has_route(1, 0));

    world.set_interface(1, true).unwrap();
    assert!(run_until_converged(&mut world, Duration::from_secs(8)).is_some());
}
