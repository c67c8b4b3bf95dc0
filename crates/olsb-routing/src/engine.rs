//! OLSB routing engine
//!
//! The [`RoutingEngine`] is the protocol state machine of one node. It owns
//! the routing table, the packet queue and the three protocol timers, and is
//! driven entirely from outside:
//!
//! - the network layer calls [`RoutingEngine::route_output`] and
//!   [`RoutingEngine::route_input`] for data packets, and the `notify_*`
//!   methods for interface changes
//! - the transport hands received control datagrams to
//!   [`RoutingEngine::receive_control`]
//! - the scheduler fires tokens into [`RoutingEngine::handle_timer`]
//!
//! Every call runs to completion. Nothing blocks; waiting is expressed only
//! through scheduled timers.
//!
//! ## Updates
//!
//! A full-table update is broadcast every periodic interval (plus jitter).
//! Route changes in between are advertised by a triggered update, which is
//! delayed by the settling time so a better route for the same destination
//! can arrive first. With aggregation enabled, changes are instead batched
//! for a fixed window measured from the first unflushed change.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use olsb_core::{
    BacklogSource, DataPacket, InputHandler, InterfaceAddress, InterfaceIndex, NoBacklog,
    OutputRoute, Route, RoutingError, Scheduler, SocketHandle, TimerKind, TimerToken, Transport,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::{ConfigError, OlsbConfig};
use crate::error::{EngineError, EngineResult};
use crate::queue::{Admission, DeliveryCallbacks, PacketQueue};
use crate::table::{
    Acceptance, AdvertisementScope, INFINITE_HOPS, MetricWeights, RejectReason, RouteEntry,
    RoutingTable, TableDisplay,
};
use crate::timer::Timers;
use crate::wire::{AdvertisedRoute, RecordReader, encode_batch};

/// Upper bound of the jitter unit, in microseconds
const JITTER_MICROS: u64 = 1000;

/// Jitter units added to each periodic interval
const PERIODIC_JITTER_UNITS: u64 = 25;

/// Lifecycle state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// Not participating in the protocol
    Stopped,
    /// Binding sockets and installing self-routes
    Starting,
    /// Steady operation
    Running,
}

impl Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Starting => write!(f, "starting"),
            EngineState::Running => write!(f, "running"),
        }
    }
}

/// Engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Update datagrams sent (one per interface per update)
    pub advertisements_sent: u64,
    /// Update datagrams the transport failed to send
    pub send_failures: u64,
    /// Records that modified the table
    pub records_accepted: u64,
    /// Records rejected for carrying an older sequence number
    pub records_stale: u64,
    /// Records rejected for any other reason
    pub records_rejected: u64,
    /// Datagrams that ended in a malformed record
    pub malformed_datagrams: u64,
    /// Routes marked broken (link failure, interface loss or expiry)
    pub routes_broken: u64,
    /// Packets admitted to the queue
    pub packets_queued: u64,
    /// Queued packets handed to a route
    pub packets_drained: u64,
    /// Queued packets dropped (eviction, expiry, shutdown)
    pub packets_dropped: u64,
}

#[derive(Debug, Clone, Copy)]
struct Interface {
    address: InterfaceAddress,
    socket: Option<SocketHandle>,
}

/// OLSB routing engine for one node
pub struct RoutingEngine<T, S>
where
    T: Transport,
    S: Scheduler,
{
    config: OlsbConfig,
    state: EngineState,
    transport: T,
    scheduler: S,
    backlog: Box<dyn BacklogSource + Send>,
    interfaces: BTreeMap<InterfaceIndex, Interface>,
    table: RoutingTable,
    queue: PacketQueue,
    timers: Timers,
    own_sequence: u32,
    rng: StdRng,
    stats: EngineStats,
}

impl<T, S> RoutingEngine<T, S>
where
    T: Transport,
    S: Scheduler,
{
    /// Create a stopped engine
    ///
    /// # Arguments
    /// * `config` - Protocol configuration, validated here
    /// * `transport` - Control-packet sockets
    /// * `scheduler` - Clock and timers
    pub fn new(config: OlsbConfig, transport: T, scheduler: S) -> EngineResult<Self> {
        config.validate()?;

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            table: RoutingTable::from_config(&config),
            queue: PacketQueue::from_config(&config),
            config,
            state: EngineState::Stopped,
            transport,
            scheduler,
            backlog: Box::new(NoBacklog),
            interfaces: BTreeMap::new(),
            timers: Timers::new(),
            own_sequence: 0,
            rng,
            stats: EngineStats::default(),
        })
    }

    /// Use a source for the local queue depth advertised with each route
    pub fn with_backlog_source<B>(mut self, source: B) -> Self
    where
        B: BacklogSource + Send + 'static,
    {
        self.backlog = Box::new(source);
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Active configuration
    pub fn config(&self) -> &OlsbConfig {
        &self.config
    }

    /// The routing table
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Engine counters
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// This node's own sequence number
    pub fn own_sequence(&self) -> u32 {
        self.own_sequence
    }

    /// Number of packets waiting for a route
    pub fn queued_packets(&self) -> usize {
        self.queue.len()
    }

    /// The transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The scheduler
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Addresses of the configured interfaces
    pub fn local_addresses(&self) -> Vec<Ipv4Addr> {
        self.interfaces.values().map(|i| i.address.local).collect()
    }

    /// Usable route to a destination, if any
    pub fn lookup(&self, destination: Ipv4Addr) -> Option<Route> {
        self.table
            .lookup_route(destination, self.scheduler.now())
            .map(RouteEntry::to_route)
    }

    /// The routing table as printed for operators, lifetimes as of now
    pub fn display_table(&self) -> TableDisplay<'_> {
        self.table.display_at(self.scheduler.now())
    }

    /// Change the metric weights while running
    ///
    /// Every entry's metric is recomputed. Current routes stay in place until
    /// a competing advertisement is judged under the new weights. Rejected
    /// values leave the configuration unchanged.
    pub fn set_metric_factors(
        &mut self,
        shortest_path: f64,
        backpressure: f64,
    ) -> Result<(), ConfigError> {
        self.reconfigure(|config| {
            config.shortest_path_factor = shortest_path;
            config.backpressure_factor = backpressure;
        })?;
        self.table.set_weights(MetricWeights::from_config(&self.config));
        info!(shortest_path, backpressure, "Metric factors changed");
        Ok(())
    }

    /// Enable or disable buffering of packets that have no route
    ///
    /// Packets already queued stay queued.
    pub fn set_buffering(&mut self, enabled: bool) {
        self.config.enable_buffering = enabled;
    }

    /// Enable or disable the weighted settling time
    pub fn set_weighted_settling_time(&mut self, enabled: bool) {
        self.config.enable_weighted_settling_time = enabled;
    }

    /// Enable or disable route aggregation
    ///
    /// Changes waiting in an open aggregation window are handed to a
    /// triggered update when aggregation is turned off.
    pub fn set_route_aggregation(&mut self, enabled: bool) -> Result<(), ConfigError> {
        self.reconfigure(|config| config.enable_route_aggregation = enabled)?;
        if !enabled && self.timers.cancel(TimerKind::Aggregation, &self.scheduler) {
            let delay = self.config.settling_time;
            self.timers.arm(TimerKind::Triggered, delay, &self.scheduler);
        }
        Ok(())
    }

    fn reconfigure<F>(&mut self, change: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut OlsbConfig),
    {
        let mut config = self.config.clone();
        change(&mut config);
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Start the protocol
    ///
    /// Binds a control socket per interface, installs the self-routes and
    /// schedules the first periodic update after a small jitter. Interfaces
    /// whose socket fails to bind are excluded.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.state != EngineState::Stopped {
            return Err(EngineError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }
        self.state = EngineState::Starting;

        let indices: Vec<_> = self.interfaces.keys().copied().collect();
        for index in indices {
            self.activate_interface(index);
        }

        if !self.interfaces.is_empty() {
            let jitter = self.jitter();
            self.timers.arm(TimerKind::Periodic, jitter, &self.scheduler);
        }

        self.state = EngineState::Running;
        info!(
            interfaces = self.interfaces.len(),
            sequence = self.own_sequence,
            "Routing engine started"
        );
        Ok(())
    }

    /// Stop the protocol
    ///
    /// Cancels every timer, fails queued packets with
    /// [`RoutingError::Shutdown`], closes the sockets and clears the table.
    /// Interfaces stay configured for a later restart.
    pub fn stop(&mut self) {
        if self.state == EngineState::Stopped {
            return;
        }

        self.timers.cancel_all(&self.scheduler);
        let flushed = self.queue.flush(RoutingError::Shutdown);
        self.stats.packets_dropped += flushed as u64;

        for interface in self.interfaces.values_mut() {
            if let Some(socket) = interface.socket.take() {
                self.transport.close(socket);
            }
        }
        self.table.clear();
        self.state = EngineState::Stopped;
        info!(flushed, "Routing engine stopped");
    }

    /// Route a locally originated packet
    ///
    /// Returns the route immediately if one is usable. Otherwise the packet
    /// is queued and [`OutputRoute::Pending`] returned; the callbacks then
    /// report how it leaves the queue. An `Err` means the packet was not
    /// taken and its callbacks will never be invoked.
    pub fn route_output(
        &mut self,
        packet: DataPacket,
        callbacks: DeliveryCallbacks,
    ) -> Result<OutputRoute, RoutingError> {
        let destination = packet.destination;
        if destination.is_loopback() {
            return Ok(OutputRoute::Ready {
                route: Route::loopback(destination),
                packet,
            });
        }
        if self.state != EngineState::Running {
            return Err(RoutingError::Shutdown);
        }
        if let Some(route) = self.broadcast_route(destination) {
            return Ok(OutputRoute::Ready { route, packet });
        }

        let now = self.scheduler.now();
        if let Some(entry) = self.table.lookup_route(destination, now) {
            trace!(%destination, next_hop = %entry.next_hop, "Route found");
            return Ok(OutputRoute::Ready {
                route: entry.to_route(),
                packet,
            });
        }

        if !self.config.enable_buffering {
            debug!(%destination, "No route and buffering disabled");
            return Err(RoutingError::RouteUnavailable(destination));
        }

        self.sweep_queue(now);
        match self.queue.enqueue(packet, callbacks, now)? {
            Admission::Queued => {}
            Admission::QueuedWithEviction { .. } => self.stats.packets_dropped += 1,
        }
        self.stats.packets_queued += 1;
        debug!(%destination, queued = self.queue.len(), "No route, packet queued");
        Ok(OutputRoute::Pending)
    }

    /// Route a packet received from the network
    ///
    /// Returns true if the packet was forwarded or delivered locally. Transit
    /// packets without a usable route are reported through
    /// [`InputHandler::error`] and false is returned. Multicast is not
    /// handled.
    pub fn route_input<H>(
        &mut self,
        packet: DataPacket,
        ingress: InterfaceIndex,
        handler: &mut H,
    ) -> bool
    where
        H: InputHandler + ?Sized,
    {
        if self.state != EngineState::Running {
            return false;
        }

        let destination = packet.destination;
        if destination.is_multicast() {
            return false;
        }
        if self.is_local_address(destination) || self.is_broadcast_address(destination) {
            trace!(%destination, %ingress, "Delivering locally");
            handler.local_deliver(packet, ingress);
            return true;
        }

        let now = self.scheduler.now();
        match self.table.lookup_route(destination, now) {
            Some(entry) => {
                trace!(%destination, next_hop = %entry.next_hop, "Forwarding transit packet");
                handler.unicast_forward(entry.to_route(), packet);
                true
            }
            None => {
                debug!(%destination, source = %packet.source, "No route for transit packet");
                handler.error(packet, RoutingError::HostUnreachable(destination));
                false
            }
        }
    }

    /// Process a received control datagram
    ///
    /// Each record is offered to the table with one extra hop for the link
    /// to `sender`. A malformed record ends processing of the datagram.
    pub fn receive_control(&mut self, interface: InterfaceIndex, sender: Ipv4Addr, bytes: &[u8]) {
        if self.state != EngineState::Running {
            return;
        }
        if self.is_local_address(sender) {
            trace!(%sender, "Ignoring own advertisement");
            return;
        }
        let Some(local) = self.active_address(interface) else {
            debug!(%interface, %sender, "Advertisement on inactive interface");
            return;
        };

        let now = self.scheduler.now();
        for record in RecordReader::new(bytes) {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    self.stats.malformed_datagrams += 1;
                    warn!(%sender, error = %e, "Discarding rest of advertisement");
                    break;
                }
            };
            self.process_record(record, interface, local, sender, now);
        }
    }

    fn process_record(
        &mut self,
        record: AdvertisedRoute,
        interface: InterfaceIndex,
        local: InterfaceAddress,
        sender: Ipv4Addr,
        now: Instant,
    ) {
        let destination = record.destination;

        if self.is_local_address(destination) {
            self.handle_record_about_self(record, now);
            return;
        }

        let hop_count = if record.hop_count == INFINITE_HOPS {
            INFINITE_HOPS
        } else {
            record.hop_count.saturating_add(1)
        };
        let candidate = RouteEntry::new(destination, sender, interface, local, now)
            .with_hops(hop_count)
            .with_sequence(record.sequence_number)
            .with_queue_size(record.queue_size);

        let previous_update = self.table.get(destination).map(|e| e.last_updated);
        match self.table.offer(candidate, now) {
            outcome @ (Acceptance::Inserted | Acceptance::Replaced(_)) => {
                self.stats.records_accepted += 1;
                debug!(
                    %destination,
                    next_hop = %sender,
                    hops = hop_count,
                    seq = record.sequence_number,
                    queue = record.queue_size,
                    ?outcome,
                    "Route accepted"
                );
                self.schedule_update(previous_update, now);
                self.deliver_queued(destination, now);
            }
            Acceptance::Rejected(RejectReason::StaleSequence) => {
                self.stats.records_stale += 1;
                trace!(%destination, %sender, seq = record.sequence_number, "Stale advertisement");
            }
            Acceptance::Rejected(reason) => {
                self.stats.records_rejected += 1;
                trace!(%destination, %sender, ?reason, "Advertisement not accepted");
            }
        }
    }

    /// A neighbor advertised a route to one of our own addresses
    ///
    /// A break report at or above our sequence number is superseded by
    /// jumping to the next even value above it.
    fn handle_record_about_self(&mut self, record: AdvertisedRoute, now: Instant) {
        let seq = record.sequence_number;
        if seq % 2 == 1 && seq >= self.own_sequence {
            self.own_sequence = seq.wrapping_add(1);
            debug!(seq = self.own_sequence, "Superseding reported break of own address");
            self.refresh_self_routes(now);
            self.schedule_update(None, now);
        }
    }

    /// Handle a fired timer token
    ///
    /// Stale tokens (cancelled or replaced) are ignored.
    pub fn handle_timer(&mut self, token: TimerToken) {
        if !self.timers.accept(token) {
            return;
        }
        if self.state != EngineState::Running {
            return;
        }
        match token.kind {
            TimerKind::Periodic => self.periodic_update(),
            TimerKind::Triggered | TimerKind::Aggregation => self.changed_update(),
        }
    }

    /// Notify that an interface came up with an address
    pub fn notify_interface_up(&mut self, index: InterfaceIndex, address: InterfaceAddress) {
        if let Some(existing) = self.interfaces.get(&index) {
            if existing.address == address {
                return;
            }
            self.notify_interface_down(index);
        }

        info!(%index, %address, "Interface up");
        self.interfaces.insert(
            index,
            Interface {
                address,
                socket: None,
            },
        );
        if self.state != EngineState::Running {
            return;
        }

        if self.activate_interface(index) {
            let now = self.scheduler.now();
            if !self.timers.is_pending(TimerKind::Periodic) {
                let jitter = self.jitter();
                self.timers.arm(TimerKind::Periodic, jitter, &self.scheduler);
            }
            self.schedule_update(None, now);
        }
    }

    /// Notify that an interface went down
    ///
    /// Routes through the interface are marked broken and a triggered update
    /// is scheduled. Losing the last interface clears the table.
    pub fn notify_interface_down(&mut self, index: InterfaceIndex) {
        let Some(interface) = self.interfaces.remove(&index) else {
            return;
        };
        info!(%index, address = %interface.address, "Interface down");

        if let Some(socket) = interface.socket {
            self.transport.close(socket);
        }
        if self.state != EngineState::Running {
            return;
        }

        let now = self.scheduler.now();
        self.table.delete_route(interface.address.local);
        let broken = self.table.invalidate_routes_via_interface(index, now);
        self.stats.routes_broken += broken.len() as u64;

        if self.interfaces.values().all(|i| i.socket.is_none()) {
            info!("No interfaces left, clearing routing table");
            self.table.clear();
            self.timers.cancel_all(&self.scheduler);
            return;
        }
        if !broken.is_empty() {
            debug!(count = broken.len(), %index, "Routes broken by interface loss");
            self.schedule_update(None, now);
        }
    }

    /// Notify that an address was assigned to an interface
    ///
    /// Only one address per interface takes part in the protocol; a new
    /// address replaces the old one.
    pub fn notify_add_address(&mut self, index: InterfaceIndex, address: InterfaceAddress) {
        self.notify_interface_up(index, address);
    }

    /// Notify that an address was removed from an interface
    pub fn notify_remove_address(&mut self, index: InterfaceIndex, address: InterfaceAddress) {
        if self.interfaces.get(&index).is_some_and(|i| i.address == address) {
            self.notify_interface_down(index);
        }
    }

    /// Notify that the link to a neighbor failed
    ///
    /// Every route through the neighbor is marked broken and a triggered
    /// update is scheduled.
    pub fn notify_link_failure(&mut self, neighbor: Ipv4Addr) {
        if self.state != EngineState::Running {
            return;
        }
        let now = self.scheduler.now();
        let broken = self.table.invalidate_routes_via_next_hop(neighbor, now);
        if broken.is_empty() {
            return;
        }
        self.stats.routes_broken += broken.len() as u64;
        info!(%neighbor, count = broken.len(), "Link failure, routes broken");
        self.schedule_update(None, now);
    }

    fn periodic_update(&mut self) {
        let now = self.scheduler.now();

        let report = self.table.sweep_expired(now);
        if !report.is_empty() {
            self.stats.routes_broken += report.broken.len() as u64;
            debug!(
                broken = report.broken.len(),
                removed = report.removed.len(),
                "Swept expired routes"
            );
        }
        self.sweep_queue(now);

        self.own_sequence = self.own_sequence.wrapping_add(2);
        self.refresh_self_routes(now);

        self.timers.cancel(TimerKind::Triggered, &self.scheduler);
        self.timers.cancel(TimerKind::Aggregation, &self.scheduler);

        let entries = self.table.snapshot_for_advertisement(AdvertisementScope::Full);
        trace!(routes = entries.len(), seq = self.own_sequence, "Periodic update");
        self.broadcast(&entries);

        for destination in self.queue.destinations() {
            self.deliver_queued(destination, now);
        }

        let jitter = PERIODIC_JITTER_UNITS * self.rng.random_range(0..=JITTER_MICROS);
        let delay = self
            .config
            .periodic_update_interval
            .saturating_add(Duration::from_micros(jitter));
        self.timers.arm(TimerKind::Periodic, delay, &self.scheduler);
    }

    fn changed_update(&mut self) {
        let entries = self.table.snapshot_for_advertisement(AdvertisementScope::ChangedOnly);
        if entries.is_empty() {
            return;
        }
        trace!(routes = entries.len(), "Triggered update");
        self.broadcast(&entries);
    }

    /// Schedule the advertisement of a route change
    ///
    /// Without aggregation the triggered timer is (re)armed with the settling
    /// delay. With aggregation the window is only armed if none is pending.
    fn schedule_update(&mut self, previous_update: Option<Instant>, now: Instant) {
        if self.config.enable_route_aggregation {
            if !self.timers.is_pending(TimerKind::Aggregation) {
                self.timers.arm(
                    TimerKind::Aggregation,
                    self.config.route_aggregation_time,
                    &self.scheduler,
                );
            }
            return;
        }
        let delay = self.settling_delay(previous_update, now);
        self.timers.arm(TimerKind::Triggered, delay, &self.scheduler);
    }

    fn settling_delay(&self, previous_update: Option<Instant>, now: Instant) -> Duration {
        match previous_update {
            Some(previous) if self.config.enable_weighted_settling_time => now
                .saturating_duration_since(previous)
                .mul_f64(self.config.weighted_factor)
                .max(self.config.min_settling_time)
                .min(self.config.periodic_update_interval),
            _ => self.config.settling_time,
        }
    }

    fn broadcast(&mut self, entries: &[RouteEntry]) {
        let records: Vec<_> = entries
            .iter()
            .map(|entry| entry.to_advertisement(self.backlog.queue_depth(entry.destination)))
            .collect();
        let datagram = encode_batch(&records);

        for (index, interface) in &self.interfaces {
            let Some(socket) = interface.socket else {
                continue;
            };
            let destination = interface.address.broadcast();
            match self.transport.send_to(socket, &datagram, destination) {
                Ok(()) => self.stats.advertisements_sent += 1,
                Err(e) => {
                    self.stats.send_failures += 1;
                    warn!(%index, %destination, error = %e, "Failed to send update");
                }
            }
        }
    }

    /// Hand queued packets for a destination to its route, if usable
    fn deliver_queued(&mut self, destination: Ipv4Addr, now: Instant) {
        let Some(route) = self
            .table
            .lookup_route(destination, now)
            .map(RouteEntry::to_route)
        else {
            return;
        };
        self.sweep_queue(now);
        let entries = self.queue.drain(destination);
        if entries.is_empty() {
            return;
        }

        debug!(
            %destination,
            count = entries.len(),
            next_hop = %route.gateway,
            "Releasing queued packets"
        );
        self.stats.packets_drained += entries.len() as u64;
        for entry in entries {
            entry.forward(route);
        }
    }

    fn sweep_queue(&mut self, now: Instant) {
        let expired = self.queue.sweep_expired(now);
        self.stats.packets_dropped += expired as u64;
    }

    /// Bind the interface's socket and install its self-route
    ///
    /// A bind failure excludes the interface.
    fn activate_interface(&mut self, index: InterfaceIndex) -> bool {
        let Some(address) = self.interfaces.get(&index).map(|i| i.address) else {
            return false;
        };
        match self.transport.bind(address) {
            Ok(socket) => {
                if let Some(interface) = self.interfaces.get_mut(&index) {
                    interface.socket = Some(socket);
                }
                let now = self.scheduler.now();
                let own = RouteEntry::local(index, address, self.own_sequence, now);
                self.table.update_route(own);
                debug!(%index, %address, "Control socket bound");
                true
            }
            Err(e) => {
                warn!(%index, %address, error = %e, "Excluding interface");
                self.interfaces.remove(&index);
                false
            }
        }
    }

    fn refresh_self_routes(&mut self, now: Instant) {
        for (index, interface) in &self.interfaces {
            if interface.socket.is_some() {
                self.table.update_route(RouteEntry::local(
                    *index,
                    interface.address,
                    self.own_sequence,
                    now,
                ));
            }
        }
    }

    fn active_address(&self, index: InterfaceIndex) -> Option<InterfaceAddress> {
        self.interfaces
            .get(&index)
            .filter(|i| i.socket.is_some())
            .map(|i| i.address)
    }

    fn is_local_address(&self, address: Ipv4Addr) -> bool {
        self.interfaces.values().any(|i| i.address.local == address)
    }

    fn is_broadcast_address(&self, address: Ipv4Addr) -> bool {
        address.is_broadcast() || self.interfaces.values().any(|i| i.address.broadcast() == address)
    }

    /// Route for a limited or subnet broadcast destination
    fn broadcast_route(&self, destination: Ipv4Addr) -> Option<Route> {
        let (index, interface) = self.interfaces.iter().find(|(_, i)| {
            i.socket.is_some()
                && (destination.is_broadcast() || i.address.broadcast() == destination)
        })?;
        Some(Route::new(
            destination,
            interface.address.local,
            destination,
            *index,
        ))
    }

    fn jitter(&mut self) -> Duration {
        Duration::from_micros(self.rng.random_range(0..=JITTER_MICROS))
    }
}
