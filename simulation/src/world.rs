//! Discrete-event world driving many routing engines
//!
//! [`SimWorld`] owns a virtual clock and an event heap shared by every node.
//! Each node's engine gets a [`SimScheduler`] and a [`SimTransport`] that
//! post into that heap, so timers, control datagrams and data frames are all
//! ordinary events processed in time order.
//!
//! Data packets leave a node through a serialised transmit queue: one frame
//! at a time, each taking `transmit_time`. The per-destination depth of that
//! queue is what the node advertises as its backlog. A frame whose link is
//! down when its transmission completes is lost and reported to the sending
//! engine as a link failure.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use olsb_core::{
    BacklogSource, DEFAULT_TTL, DataPacket, InputHandler, InterfaceAddress, InterfaceIndex,
    PacketId, Route, RoutingError, Scheduler, SocketHandle, TimerToken, Transport, TransportError,
};
use olsb_logging::{NodeContextGuard, node_span};
use olsb_routing::{
    DeliveryCallbacks, EngineError, EngineStats, OlsbConfig, OutputRoute, RoutingEngine,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::topology::{MAX_NODES, NodeId, Topology, node_address, node_for_address};

/// The single interface every simulated node runs the protocol on
pub const SIM_INTERFACE: InterfaceIndex = InterfaceIndex(1);

/// Routing engine as driven by the simulator
pub type SimEngine = RoutingEngine<SimTransport, SimScheduler>;

/// Errors setting up or driving a simulation
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Topology has {0} nodes, at most {MAX_NODES} fit the subnet")]
    TooManyNodes(usize),
}

/// Link-layer parameters of the simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Delay between the end of a transmission and its arrival
    pub propagation_delay: Duration,
    /// Time a node spends transmitting one data frame
    pub transmit_time: Duration,
    /// Base seed for per-node jitter streams
    pub seed: u64,
    /// Include every node's routing table in scenario reports
    pub print_routes: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            propagation_delay: Duration::from_millis(1),
            transmit_time: Duration::from_millis(2),
            seed: 1,
            print_routes: false,
        }
    }
}

/// Delivery statistics collected across all nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimStats {
    /// Data packets originated
    pub packets_sent: u64,
    /// Data packets that reached their destination
    pub packets_delivered: u64,
    /// Packets the routers gave up on (no route, queue overflow, expiry)
    pub packets_dropped: u64,
    /// Frames lost on a link that was down
    pub link_losses: u64,
    /// Packets dropped for running out of TTL
    pub ttl_expired: u64,
    /// Sum of hop counts of delivered packets
    pub total_hops: u64,
    /// Sum of end-to-end latencies of delivered packets
    pub total_latency: Duration,
    /// Data frames put on a link
    pub transmissions: u64,
    /// Control datagrams sent
    pub control_datagrams: u64,
    /// Control bytes sent
    pub control_bytes: u64,
}

impl SimStats {
    /// Fraction of sent packets that were delivered
    pub fn delivery_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.packets_delivered as f64 / self.packets_sent as f64
    }

    /// Mean hop count of delivered packets
    pub fn mean_hops(&self) -> f64 {
        if self.packets_delivered == 0 {
            return 0.0;
        }
        self.total_hops as f64 / self.packets_delivered as f64
    }

    /// Mean end-to-end latency of delivered packets
    pub fn mean_latency(&self) -> Duration {
        match u32::try_from(self.packets_delivered) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.total_latency / n,
        }
    }
}

/// A stream of packets between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub source: NodeId,
    pub destination: NodeId,
    /// Number of packets
    pub packets: usize,
    /// Gap between consecutive packets
    pub interval: Duration,
    /// Offset of the first packet from the time the flow is scheduled
    pub start: Duration,
    /// Payload size in bytes
    pub payload_len: usize,
}

impl Flow {
    /// A flow starting immediately with 64-byte payloads
    pub fn new(source: NodeId, destination: NodeId, packets: usize, interval: Duration) -> Self {
        Self {
            source,
            destination,
            packets,
            interval,
            start: Duration::ZERO,
            payload_len: 64,
        }
    }

    /// Delay the first packet
    pub fn starting_after(mut self, start: Duration) -> Self {
        self.start = start;
        self
    }
}

#[derive(Debug)]
enum Event {
    Timer { node: NodeId, token: TimerToken },
    Control { node: NodeId, sender: Ipv4Addr, bytes: Bytes },
    Arrival { node: NodeId, packet: DataPacket },
    TransmitDone { node: NodeId },
    Originate { source: NodeId, destination: NodeId, payload_len: usize },
}

#[derive(Debug)]
struct Scheduled {
    at: Instant,
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the heap pops the earliest event, then the first scheduled
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct TransmitQueue {
    frames: VecDeque<(Route, DataPacket)>,
    busy: bool,
}

/// State shared between the world and every node's collaborators
#[derive(Debug)]
struct Core {
    config: SimConfig,
    now: Instant,
    next_seq: u64,
    events: BinaryHeap<Scheduled>,
    cancelled: BTreeSet<(NodeId, TimerToken)>,
    links: BTreeSet<(NodeId, NodeId)>,
    bound: Vec<bool>,
    transmit: Vec<TransmitQueue>,
    sent_at: BTreeMap<PacketId, Instant>,
    stats: SimStats,
}

impl Core {
    fn push(&mut self, delay: Duration, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Scheduled {
            at: self.now + delay,
            seq,
            event,
        });
    }

    fn link_up(&self, a: NodeId, b: NodeId) -> bool {
        self.links.contains(&(a.min(b), a.max(b)))
    }

    fn neighbors_up(&self, node: NodeId) -> Vec<NodeId> {
        self.links
            .iter()
            .filter_map(|&(a, b)| match node {
                n if n == a => Some(b),
                n if n == b => Some(a),
                _ => None,
            })
            .collect()
    }

    fn enqueue_transmit(&mut self, node: NodeId, route: Route, packet: DataPacket) {
        let transmit_time = self.config.transmit_time;
        let Some(queue) = self.transmit.get_mut(node) else {
            return;
        };
        queue.frames.push_back((route, packet));
        if !queue.busy {
            queue.busy = true;
            self.push(transmit_time, Event::TransmitDone { node });
        }
    }

    /// Pop the frame whose transmission just finished
    fn finish_transmit(&mut self, node: NodeId) -> Option<(Route, DataPacket)> {
        let transmit_time = self.config.transmit_time;
        let queue = self.transmit.get_mut(node)?;
        let frame = queue.frames.pop_front();
        queue.busy = !queue.frames.is_empty();
        if queue.busy {
            self.push(transmit_time, Event::TransmitDone { node });
        }
        frame
    }

    fn backlog(&self, node: NodeId, destination: Ipv4Addr) -> u32 {
        self.transmit.get(node).map_or(0, |queue| {
            queue
                .frames
                .iter()
                .filter(|(route, _)| route.destination == destination)
                .count() as u32
        })
    }

    fn record_delivery(&mut self, packet: &DataPacket) {
        let Some(sent_at) = self.sent_at.remove(&packet.id) else {
            return;
        };
        self.stats.packets_delivered += 1;
        self.stats.total_hops += u64::from(DEFAULT_TTL.saturating_sub(packet.ttl)) + 1;
        self.stats.total_latency += self.now.saturating_duration_since(sent_at);
    }

    fn record_drop(&mut self, id: PacketId, error: &RoutingError) {
        if self.sent_at.remove(&id).is_some() {
            self.stats.packets_dropped += 1;
            debug!(packet = %id, %error, "Packet dropped");
        }
    }
}

/// Control-packet transport of one simulated node
#[derive(Clone)]
pub struct SimTransport {
    node: NodeId,
    core: Arc<Mutex<Core>>,
}

impl Transport for SimTransport {
    fn bind(&self, local: InterfaceAddress) -> Result<SocketHandle, TransportError> {
        let mut core = self.core.lock();
        match core.bound.get_mut(self.node) {
            Some(bound) => {
                *bound = true;
                Ok(SocketHandle(self.node as u64))
            }
            None => Err(TransportError::BindFailed {
                address: local.local,
                reason: "node is not part of the world".to_string(),
            }),
        }
    }

    fn send_to(
        &self,
        _socket: SocketHandle,
        bytes: &[u8],
        destination: Ipv4Addr,
    ) -> Result<(), TransportError> {
        let mut core = self.core.lock();
        if !core.bound.get(self.node).copied().unwrap_or(false) {
            return Err(TransportError::SocketClosed);
        }

        let own = node_address(self.node);
        let receivers = if destination == own.broadcast() || destination == Ipv4Addr::BROADCAST {
            core.neighbors_up(self.node)
        } else {
            match node_for_address(destination) {
                Some(target) if core.link_up(self.node, target) => vec![target],
                _ => {
                    return Err(TransportError::SendFailed(format!(
                        "no link to {destination}"
                    )));
                }
            }
        };

        core.stats.control_datagrams += 1;
        core.stats.control_bytes += bytes.len() as u64;
        let delay = core.config.propagation_delay;
        let bytes = Bytes::copy_from_slice(bytes);
        for node in receivers {
            core.push(
                delay,
                Event::Control {
                    node,
                    sender: own.local,
                    bytes: bytes.clone(),
                },
            );
        }
        Ok(())
    }

    fn close(&self, _socket: SocketHandle) {
        if let Some(bound) = self.core.lock().bound.get_mut(self.node) {
            *bound = false;
        }
    }
}

/// Clock and timers of one simulated node
#[derive(Clone)]
pub struct SimScheduler {
    node: NodeId,
    core: Arc<Mutex<Core>>,
}

impl Scheduler for SimScheduler {
    fn now(&self) -> Instant {
        self.core.lock().now
    }

    fn schedule(&self, delay: Duration, timer: TimerToken) {
        trace!(node = self.node, %timer, ?delay, "Timer scheduled");
        self.core.lock().push(
            delay,
            Event::Timer {
                node: self.node,
                token: timer,
            },
        );
    }

    fn cancel(&self, timer: TimerToken) {
        self.core.lock().cancelled.insert((self.node, timer));
    }
}

/// Reports a node's transmit-queue depth as its backlog
struct TransmitBacklog {
    node: NodeId,
    core: Arc<Mutex<Core>>,
}

impl BacklogSource for TransmitBacklog {
    fn queue_depth(&self, destination: Ipv4Addr) -> u32 {
        self.core.lock().backlog(self.node, destination)
    }
}

/// Collects the decisions of one `route_input` call
#[derive(Default)]
struct Inbox {
    forward: Vec<(Route, DataPacket)>,
    delivered: Vec<DataPacket>,
    errors: Vec<(DataPacket, RoutingError)>,
}

impl InputHandler for Inbox {
    fn unicast_forward(&mut self, route: Route, packet: DataPacket) {
        self.forward.push((route, packet));
    }

    fn local_deliver(&mut self, packet: DataPacket, _interface: InterfaceIndex) {
        self.delivered.push(packet);
    }

    fn error(&mut self, packet: DataPacket, error: RoutingError) {
        self.errors.push((packet, error));
    }
}

struct SimNode {
    address: InterfaceAddress,
    instance_id: Uuid,
    span: tracing::Span,
    engine: SimEngine,
}

/// A simulated network of OLSB nodes
pub struct SimWorld {
    core: Arc<Mutex<Core>>,
    nodes: Vec<SimNode>,
    topology: Topology,
    routing: OlsbConfig,
    started_at: Instant,
    next_packet: u64,
}

impl SimWorld {
    /// Build a world and start every node
    ///
    /// Each node's jitter stream is seeded from `routing.rng_seed` (or the
    /// world seed) plus its index, so runs are reproducible.
    pub fn new(
        topology: Topology,
        routing: OlsbConfig,
        config: SimConfig,
    ) -> Result<Self, SimError> {
        let node_count = topology.node_count();
        if node_count > MAX_NODES {
            return Err(SimError::TooManyNodes(node_count));
        }

        let started_at = Instant::now();
        let base_seed = routing.rng_seed.unwrap_or(config.seed);
        let core = Arc::new(Mutex::new(Core {
            config,
            now: started_at,
            next_seq: 0,
            events: BinaryHeap::new(),
            cancelled: BTreeSet::new(),
            links: topology.edges().collect(),
            bound: vec![false; node_count],
            transmit: (0..node_count).map(|_| TransmitQueue::default()).collect(),
            sent_at: BTreeMap::new(),
            stats: SimStats::default(),
        }));

        let mut nodes = Vec::with_capacity(node_count);
        for node in 0..node_count {
            let address = node_address(node);
            let engine = RoutingEngine::new(
                routing.clone().with_rng_seed(base_seed.wrapping_add(node as u64)),
                SimTransport {
                    node,
                    core: core.clone(),
                },
                SimScheduler {
                    node,
                    core: core.clone(),
                },
            )?
            .with_backlog_source(TransmitBacklog {
                node,
                core: core.clone(),
            });
            nodes.push(SimNode {
                address,
                instance_id: Uuid::new_v4(),
                span: node_span(address.local),
                engine,
            });
        }

        let mut world = Self {
            core,
            nodes,
            topology,
            routing,
            started_at,
            next_packet: 0,
        };
        for node in 0..node_count {
            world
                .enter(node, |engine| {
                    engine.notify_interface_up(SIM_INTERFACE, node_address(node));
                    engine.start()
                })
                .ok_or(SimError::UnknownNode(node))??;
        }
        info!(nodes = node_count, links = world.topology.edge_count(), "Simulation started");
        Ok(world)
    }

    /// Current virtual time
    pub fn now(&self) -> Instant {
        self.core.lock().now
    }

    /// Virtual time since the world was created
    pub fn elapsed(&self) -> Duration {
        self.now().saturating_duration_since(self.started_at)
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The topology the world was built from
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Routing configuration every node runs (apart from its jitter seed)
    pub fn routing_config(&self) -> &OlsbConfig {
        &self.routing
    }

    /// Address of a node
    pub fn address(&self, node: NodeId) -> Option<Ipv4Addr> {
        self.nodes.get(node).map(|n| n.address.local)
    }

    /// A node's routing engine
    pub fn engine(&self, node: NodeId) -> Option<&SimEngine> {
        self.nodes.get(node).map(|n| &n.engine)
    }

    /// Delivery statistics so far
    pub fn stats(&self) -> SimStats {
        self.core.lock().stats.clone()
    }

    /// Engine counters summed over all nodes
    pub fn engine_stats(&self) -> EngineStats {
        self.nodes
            .iter()
            .map(|n| *n.engine.stats())
            .fold(EngineStats::default(), |mut total, s| {
                total.advertisements_sent += s.advertisements_sent;
                total.send_failures += s.send_failures;
                total.records_accepted += s.records_accepted;
                total.records_stale += s.records_stale;
                total.records_rejected += s.records_rejected;
                total.malformed_datagrams += s.malformed_datagrams;
                total.routes_broken += s.routes_broken;
                total.packets_queued += s.packets_queued;
                total.packets_drained += s.packets_drained;
                total.packets_dropped += s.packets_dropped;
                total
            })
    }

    /// Check if a node currently has a usable route to another
    pub fn has_route(&self, from: NodeId, to: NodeId) -> bool {
        match (self.nodes.get(from), self.address(to)) {
            (Some(node), Some(destination)) => node.engine.lookup(destination).is_some(),
            _ => false,
        }
    }

    /// Check if every node has a usable route to every other node
    pub fn is_converged(&self) -> bool {
        (0..self.nodes.len())
            .all(|from| (0..self.nodes.len()).all(|to| from == to || self.has_route(from, to)))
    }

    /// Render a node's routing table at the current virtual time
    pub fn routing_table(&self, node: NodeId) -> Option<String> {
        self.nodes.get(node).map(|n| n.engine.display_table().to_string())
    }

    /// Originate a data packet now
    ///
    /// Router refusals are not errors here; they show up in [`SimStats`].
    pub fn send_data(
        &mut self,
        source: NodeId,
        destination: NodeId,
        payload: Bytes,
    ) -> Result<PacketId, SimError> {
        let source_address = self.address(source).ok_or(SimError::UnknownNode(source))?;
        let destination_address = self
            .address(destination)
            .ok_or(SimError::UnknownNode(destination))?;

        let id = PacketId(self.next_packet);
        self.next_packet += 1;
        let packet = DataPacket::new(id, source_address, destination_address, payload);
        {
            let mut core = self.core.lock();
            core.stats.packets_sent += 1;
            let now = core.now;
            core.sent_at.insert(id, now);
        }

        let callbacks = self.callbacks_for(source);
        let outcome = self
            .enter(source, |engine| engine.route_output(packet, callbacks))
            .ok_or(SimError::UnknownNode(source))?;

        let mut core = self.core.lock();
        match outcome {
            Ok(OutputRoute::Ready { route, packet }) => {
                core.enqueue_transmit(source, route, packet)
            }
            Ok(OutputRoute::Pending) => trace!(packet = %id, source, "Packet waiting for a route"),
            Err(error) => core.record_drop(id, &error),
        }
        Ok(id)
    }

    /// Schedule every packet of a flow
    pub fn schedule_flow(&mut self, flow: Flow) {
        let mut core = self.core.lock();
        for i in 0..flow.packets {
            core.push(
                flow.start + flow.interval * i as u32,
                Event::Originate {
                    source: flow.source,
                    destination: flow.destination,
                    payload_len: flow.payload_len,
                },
            );
        }
    }

    /// Bring a link up or down
    ///
    /// The engines are not told directly; they notice when a transmission
    /// fails or when routes stop being refreshed.
    pub fn set_link(&mut self, a: NodeId, b: NodeId, up: bool) {
        let key = (a.min(b), a.max(b));
        let mut core = self.core.lock();
        let changed = if up {
            core.links.insert(key)
        } else {
            core.links.remove(&key)
        };
        if changed {
            info!(a, b, up, "Link changed");
        }
    }

    /// Bring a node's interface up or down
    pub fn set_interface(&mut self, node: NodeId, up: bool) -> Result<(), SimError> {
        self.enter(node, |engine| {
            if up {
                engine.notify_interface_up(SIM_INTERFACE, node_address(node));
            } else {
                engine.notify_interface_down(SIM_INTERFACE);
            }
        })
        .ok_or(SimError::UnknownNode(node))
    }

    /// Advance virtual time, processing every event due in the window
    pub fn run_for(&mut self, duration: Duration) {
        let deadline = self.now() + duration;
        loop {
            let next = {
                let mut core = self.core.lock();
                if core.events.peek().is_some_and(|s| s.at <= deadline) {
                    core.events.pop().map(|scheduled| {
                        core.now = scheduled.at;
                        scheduled.event
                    })
                } else {
                    None
                }
            };
            let Some(event) = next else {
                break;
            };
            self.dispatch(event);
        }

        let mut core = self.core.lock();
        core.now = core.now.max(deadline);
    }

    /// Stop every engine, failing packets still waiting for a route
    pub fn shutdown(&mut self) {
        for node in 0..self.nodes.len() {
            self.enter(node, |engine| engine.stop());
        }
        info!(stats = ?self.stats(), "Simulation stopped");
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Timer { node, token } => {
                if self.core.lock().cancelled.remove(&(node, token)) {
                    return;
                }
                self.enter(node, |engine| engine.handle_timer(token));
            }
            Event::Control {
                node,
                sender,
                bytes,
            } => {
                self.enter(node, |engine| {
                    engine.receive_control(SIM_INTERFACE, sender, &bytes)
                });
            }
            Event::Arrival { node, packet } => self.arrive(node, packet),
            Event::TransmitDone { node } => self.transmit_done(node),
            Event::Originate {
                source,
                destination,
                payload_len,
            } => {
                let payload = Bytes::from(vec![0; payload_len]);
                if let Err(e) = self.send_data(source, destination, payload) {
                    warn!(source, destination, error = %e, "Flow packet not sent");
                }
            }
        }
    }

    fn arrive(&mut self, node: NodeId, packet: DataPacket) {
        let mut inbox = Inbox::default();
        self.enter(node, |engine| engine.route_input(packet, SIM_INTERFACE, &mut inbox));

        let own = node_address(node).local;
        let mut core = self.core.lock();
        for packet in inbox.delivered {
            if packet.destination == own {
                core.record_delivery(&packet);
            }
        }
        for (route, mut packet) in inbox.forward {
            if packet.ttl <= 1 {
                core.stats.ttl_expired += 1;
                core.sent_at.remove(&packet.id);
                continue;
            }
            packet.ttl -= 1;
            core.enqueue_transmit(node, route, packet);
        }
        for (packet, error) in inbox.errors {
            core.record_drop(packet.id, &error);
        }
    }

    fn transmit_done(&mut self, node: NodeId) {
        let failed_gateway = {
            let mut core = self.core.lock();
            let Some((route, packet)) = core.finish_transmit(node) else {
                return;
            };
            match node_for_address(route.gateway) {
                Some(next) if core.link_up(node, next) => {
                    core.stats.transmissions += 1;
                    let delay = core.config.propagation_delay;
                    core.push(delay, Event::Arrival { node: next, packet });
                    None
                }
                _ => {
                    core.stats.link_losses += 1;
                    core.sent_at.remove(&packet.id);
                    Some(route.gateway)
                }
            }
        };

        if let Some(gateway) = failed_gateway {
            debug!(node, %gateway, "Transmission failed, link down");
            self.enter(node, |engine| engine.notify_link_failure(gateway));
        }
    }

    fn callbacks_for(&self, node: NodeId) -> DeliveryCallbacks {
        let forward_core = self.core.clone();
        let error_core = self.core.clone();
        DeliveryCallbacks::new(
            move |route, packet| forward_core.lock().enqueue_transmit(node, route, packet),
            move |packet, error| error_core.lock().record_drop(packet.id, &error),
        )
    }

    /// Run a closure against a node's engine with its log context set
    ///
    /// The shared core must not be locked by the caller: the engine calls
    /// back into it.
    fn enter<R>(&mut self, node: NodeId, f: impl FnOnce(&mut SimEngine) -> R) -> Option<R> {
        let sim_node = self.nodes.get_mut(node)?;
        let _context =
            NodeContextGuard::with_instance_id(sim_node.address.local, sim_node.instance_id);
        let _span = sim_node.span.enter();
        Some(f(&mut sim_node.engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{TopologyBuilder, from_edges};

    fn fast_config() -> OlsbConfig {
        OlsbConfig::default()
            .with_periodic_update_interval(Duration::from_secs(2))
            .with_settling_time(Duration::from_millis(200))
    }

    #[test]
    fn test_two_nodes_learn_each_other() {
        let mut world = SimWorld::new(from_edges(&[(0, 1)]), fast_config(), SimConfig::default())
            .unwrap();
        assert!(!world.has_route(0, 1));

        world.run_for(Duration::from_millis(100));
        assert!(world.is_converged());
        assert!(world.stats().control_datagrams >= 2);
    }

    #[test]
    fn test_packet_delivered_over_two_hops() {
        let mut world =
            SimWorld::new(TopologyBuilder::new(3).line(), fast_config(), SimConfig::default())
                .unwrap();
        world.run_for(Duration::from_secs(5));
        assert!(world.is_converged());

        world.send_data(0, 2, Bytes::from_static(b"hello")).unwrap();
        world.run_for(Duration::from_millis(50));

        let stats = world.stats();
        assert_eq!(stats.packets_delivered, 1);
        assert_eq!(stats.total_hops, 2);
        assert_eq!(stats.transmissions, 2);
        // Two frames of 2ms plus two 1ms propagation delays
        assert_eq!(stats.mean_latency(), Duration::from_millis(6));
    }

    #[test]
    fn test_packet_queued_until_route_appears() {
        let mut world =
            SimWorld::new(TopologyBuilder::new(3).line(), fast_config(), SimConfig::default())
                .unwrap();

        // Nothing has been advertised yet
        world.send_data(0, 2, Bytes::new()).unwrap();
        assert_eq!(world.engine(0).unwrap().queued_packets(), 1);

        world.run_for(Duration::from_secs(5));
        assert_eq!(world.engine(0).unwrap().queued_packets(), 0);
        assert_eq!(world.stats().packets_delivered, 1);
    }

    #[test]
    fn test_lost_frame_reports_link_failure() {
        let mut world =
            SimWorld::new(TopologyBuilder::new(3).line(), fast_config(), SimConfig::default())
                .unwrap();
        world.run_for(Duration::from_secs(5));

        world.set_link(0, 1, false);
        world.send_data(0, 2, Bytes::new()).unwrap();
        world.run_for(Duration::from_millis(10));

        let stats = world.stats();
        assert_eq!(stats.link_losses, 1);
        assert!(!world.has_route(0, 2));
        assert!(world.engine(0).unwrap().stats().routes_broken >= 2);
    }

    #[test]
    fn test_backlog_follows_transmit_queue() {
        let mut world = SimWorld::new(from_edges(&[(0, 1)]), fast_config(), SimConfig::default())
            .unwrap();
        world.run_for(Duration::from_millis(100));

        for _ in 0..4 {
            world.send_data(0, 1, Bytes::new()).unwrap();
        }
        let destination = world.address(1).unwrap();
        assert_eq!(world.core.lock().backlog(0, destination), 4);

        world.run_for(Duration::from_millis(20));
        assert_eq!(world.core.lock().backlog(0, destination), 0);
        assert_eq!(world.stats().packets_delivered, 4);
    }

    #[test]
    fn test_flow_and_shutdown() {
        let mut world = SimWorld::new(from_edges(&[(0, 1)]), fast_config(), SimConfig::default())
            .unwrap();
        world.set_link(0, 1, false);
        world.schedule_flow(Flow::new(0, 1, 3, Duration::from_millis(10)));
        world.run_for(Duration::from_millis(100));
        assert_eq!(world.stats().packets_sent, 3);

        // Never routable: shutdown fails the queued packets
        world.shutdown();
        let stats = world.stats();
        assert_eq!(stats.packets_dropped, 3);
        assert_eq!(stats.packets_delivered, 0);
    }

    #[test]
    fn test_too_many_nodes() {
        let topology = TopologyBuilder::new(MAX_NODES + 1).line();
        assert!(matches!(
            SimWorld::new(topology, fast_config(), SimConfig::default()),
            Err(SimError::TooManyNodes(_))
        ));
    }

    #[test]
    fn test_invalid_routing_config_rejected() {
        let mut routing = fast_config();
        routing.hold_times = 0;
        assert!(matches!(
            SimWorld::new(from_edges(&[(0, 1)]), routing, SimConfig::default()),
            Err(SimError::Engine(_))
        ));
    }
}
