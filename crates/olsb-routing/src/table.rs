//! Routing table with sequence-number freshness and weighted metric selection
//!
//! The [`RoutingTable`] maps each destination to the single best route
//! known for it. Candidate routes learned from advertisements go through
//! [`RoutingTable::offer`], which applies the acceptance rule:
//!
//! 1. No entry, or the entry is broken: a live candidate is accepted
//! 2. Newer sequence number: accepted regardless of metric
//! 3. Same sequence number: accepted only with a strictly lower weighted metric
//! 4. Older sequence number: rejected
//!
//! Even sequence numbers mark reachable routes; the following odd number
//! marks a broken one. Broken entries stay in the table as tombstones so the
//! break is advertised, and are removed after a hold window.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use olsb_core::{InterfaceAddress, InterfaceIndex, Route};
use serde::{Deserialize, Serialize};

use crate::config::OlsbConfig;
use crate::wire::AdvertisedRoute;

/// Hop count marking a broken route
pub const INFINITE_HOPS: u32 = u32::MAX;

/// Weights and bounds of the route metric
///
/// `metric = shortest_path * min(hops, max_hop_count) / max_hop_count
///         + backpressure * min(queue, max_queue_size) / max_queue_size`
///
/// Lower is better. Broken routes have an infinite metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricWeights {
    /// Weight of the hop-count term
    pub shortest_path: f64,
    /// Weight of the queue-size term
    pub backpressure: f64,
    /// Hop count at which the hop term saturates
    pub max_hop_count: u32,
    /// Queue size at which the queue term saturates
    pub max_queue_size: u32,
}

impl MetricWeights {
    /// Take the weights and bounds from a configuration
    pub fn from_config(config: &OlsbConfig) -> Self {
        Self {
            shortest_path: config.shortest_path_factor,
            backpressure: config.backpressure_factor,
            max_hop_count: config.max_hop_count,
            max_queue_size: u32::try_from(config.max_queue_len).unwrap_or(u32::MAX),
        }
    }

    /// Compute the weighted metric for a hop count and queue size
    pub fn metric(&self, hop_count: u32, queue_size: u32) -> f64 {
        if hop_count == INFINITE_HOPS {
            return f64::INFINITY;
        }
        self.shortest_path * normalize(hop_count, self.max_hop_count)
            + self.backpressure * normalize(queue_size, self.max_queue_size)
    }
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self::from_config(&OlsbConfig::default())
    }
}

fn normalize(value: u32, bound: u32) -> f64 {
    let bound = bound.max(1);
    f64::from(value.min(bound)) / f64::from(bound)
}

/// Next sequence number marking a break
fn break_sequence(sequence_number: u32) -> u32 {
    if sequence_number % 2 == 0 {
        sequence_number.wrapping_add(1)
    } else {
        sequence_number
    }
}

/// A route to one destination
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    /// Destination address (table key)
    pub destination: Ipv4Addr,
    /// Neighbor to forward through
    pub next_hop: Ipv4Addr,
    /// Interface the neighbor is reached on
    pub interface: InterfaceIndex,
    /// Local address and mask of that interface
    pub interface_address: InterfaceAddress,
    /// Distance in hops ([`INFINITE_HOPS`] when broken)
    pub hop_count: u32,
    /// Destination sequence number
    pub sequence_number: u32,
    /// Queue depth reported by the advertiser
    pub queue_size: u32,
    /// When the route stops being usable
    pub expires_at: Instant,
    /// When the route was last accepted or modified
    pub last_updated: Instant,
    weighted_metric: f64,
    changed: bool,
}

impl RouteEntry {
    /// Create a one-hop route with sequence number 0 and an empty queue
    ///
    /// The route expires at `now` until a lifetime is set; the table sets
    /// the lifetime when it accepts a candidate.
    pub fn new(
        destination: Ipv4Addr,
        next_hop: Ipv4Addr,
        interface: InterfaceIndex,
        interface_address: InterfaceAddress,
        now: Instant,
    ) -> Self {
        let mut entry = Self {
            destination,
            next_hop,
            interface,
            interface_address,
            hop_count: 1,
            sequence_number: 0,
            queue_size: 0,
            expires_at: now,
            last_updated: now,
            weighted_metric: 0.0,
            changed: false,
        };
        entry.refresh_metric(&MetricWeights::default());
        entry
    }

    /// Create the self-route for a local interface address
    pub fn local(
        interface: InterfaceIndex,
        interface_address: InterfaceAddress,
        sequence_number: u32,
        now: Instant,
    ) -> Self {
        Self::new(
            interface_address.local,
            interface_address.local,
            interface,
            interface_address,
            now,
        )
        .with_hops(0)
        .with_sequence(sequence_number)
    }

    /// Set the hop count
    pub fn with_hops(mut self, hop_count: u32) -> Self {
        self.hop_count = hop_count;
        self.refresh_metric(&MetricWeights::default());
        self
    }

    /// Set the sequence number
    pub fn with_sequence(mut self, sequence_number: u32) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    /// Set the reported queue size
    pub fn with_queue_size(mut self, queue_size: u32) -> Self {
        self.queue_size = queue_size;
        self.refresh_metric(&MetricWeights::default());
        self
    }

    /// Set the lifetime, measured from the last update
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.expires_at = self.last_updated + lifetime;
        self
    }

    /// The weighted metric (lower is better)
    pub fn weighted_metric(&self) -> f64 {
        self.weighted_metric
    }

    /// Check if the route is marked broken
    pub fn is_broken(&self) -> bool {
        self.hop_count == INFINITE_HOPS || self.sequence_number % 2 == 1
    }

    /// Check if this is a self-route for a local address
    pub fn is_local(&self) -> bool {
        self.hop_count == 0
    }

    /// Check if the route's lifetime has passed (self-routes never expire)
    pub fn is_expired(&self, now: Instant) -> bool {
        !self.is_local() && now > self.expires_at
    }

    /// Check if the route can be used for forwarding
    pub fn is_usable(&self, now: Instant) -> bool {
        !self.is_broken() && !self.is_expired(now)
    }

    /// Check if the route changed since it was last advertised
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Route for forwarding a packet along this entry
    pub fn to_route(&self) -> Route {
        Route::new(
            self.destination,
            self.interface_address.local,
            self.next_hop,
            self.interface,
        )
    }

    /// Wire record advertising this entry with our own queue depth
    pub fn to_advertisement(&self, queue_size: u32) -> AdvertisedRoute {
        AdvertisedRoute::new(
            self.destination,
            self.hop_count,
            self.sequence_number,
            queue_size,
        )
    }

    fn mark_broken(&mut self, now: Instant) {
        self.hop_count = INFINITE_HOPS;
        self.sequence_number = break_sequence(self.sequence_number);
        self.weighted_metric = f64::INFINITY;
        self.expires_at = now;
        self.last_updated = now;
        self.changed = true;
    }

    fn refresh_metric(&mut self, weights: &MetricWeights) {
        self.weighted_metric = weights.metric(self.hop_count, self.queue_size);
    }
}

/// Why a candidate replaced the current entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceReason {
    /// The current entry was broken
    RepairsBroken,
    /// The candidate carries a newer sequence number
    NewerSequence,
    /// Same sequence number, strictly lower metric
    BetterMetric,
}

/// Why a candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The candidate carries an older sequence number
    StaleSequence,
    /// Same sequence number, metric not strictly lower
    NotBetter,
    /// A broken route for a destination we have no entry for
    UnknownBroken,
    /// The destination is one of our own addresses
    LocalRoute,
}

/// Outcome of offering a candidate route to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// First route for the destination
    Inserted,
    /// The candidate replaced the current entry
    Replaced(ReplaceReason),
    /// The table was not modified
    Rejected(RejectReason),
}

impl Acceptance {
    /// Check if the table was modified
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Which entries an advertisement snapshot includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisementScope {
    /// The whole table (periodic updates)
    Full,
    /// Only entries changed since they were last advertised
    ChangedOnly,
}

/// Result of an expiry sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Destinations whose routes expired and were marked broken
    pub broken: Vec<Ipv4Addr>,
    /// Destinations whose tombstones were removed
    pub removed: Vec<Ipv4Addr>,
}

impl SweepReport {
    /// Check if the sweep changed nothing
    pub fn is_empty(&self) -> bool {
        self.broken.is_empty() && self.removed.is_empty()
    }
}

/// Routing table
///
/// Owned by a single routing engine; entries are kept ordered by
/// destination so snapshots are deterministic.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: BTreeMap<Ipv4Addr, RouteEntry>,
    weights: MetricWeights,
    route_lifetime: Duration,
    hold_window: Duration,
}

impl RoutingTable {
    /// Create a new routing table
    ///
    /// # Arguments
    /// * `weights` - Metric weights used for every comparison
    /// * `route_lifetime` - Lifetime given to accepted routes
    /// * `hold_window` - How long broken tombstones are kept
    pub fn new(weights: MetricWeights, route_lifetime: Duration, hold_window: Duration) -> Self {
        Self {
            routes: BTreeMap::new(),
            weights,
            route_lifetime,
            hold_window,
        }
    }

    /// Create a routing table from a configuration
    pub fn from_config(config: &OlsbConfig) -> Self {
        Self::new(
            MetricWeights::from_config(config),
            config.route_lifetime(),
            config.route_lifetime(),
        )
    }

    /// Current metric weights
    pub fn weights(&self) -> &MetricWeights {
        &self.weights
    }

    /// Replace the metric weights and recompute every entry's metric
    pub fn set_weights(&mut self, weights: MetricWeights) {
        self.weights = weights;
        for entry in self.routes.values_mut() {
            entry.refresh_metric(&weights);
        }
    }

    /// Lifetime given to accepted routes
    pub fn route_lifetime(&self) -> Duration {
        self.route_lifetime
    }

    /// Insert a route for a new destination
    ///
    /// Returns false, leaving the table unchanged, if the destination
    /// already has an entry.
    pub fn add_route(&mut self, mut entry: RouteEntry) -> bool {
        if self.routes.contains_key(&entry.destination) {
            return false;
        }
        entry.refresh_metric(&self.weights);
        entry.changed = true;
        self.routes.insert(entry.destination, entry);
        true
    }

    /// Overwrite the route for a destination
    ///
    /// Marks the entry as changed since last advertised.
    pub fn update_route(&mut self, mut entry: RouteEntry) {
        entry.refresh_metric(&self.weights);
        entry.changed = true;
        self.routes.insert(entry.destination, entry);
    }

    /// Offer a candidate route learned from an advertisement
    ///
    /// The candidate's hop count must already include the hop to the
    /// advertising neighbor. On acceptance the entry's lifetime is reset.
    pub fn offer(&mut self, mut candidate: RouteEntry, now: Instant) -> Acceptance {
        candidate.refresh_metric(&self.weights);
        candidate.last_updated = now;
        candidate.expires_at = if candidate.is_broken() {
            now
        } else {
            now + self.route_lifetime
        };

        let outcome = match self.routes.get(&candidate.destination) {
            None if candidate.is_broken() => Acceptance::Rejected(RejectReason::UnknownBroken),
            None => Acceptance::Inserted,
            Some(current) => Self::judge(current, &candidate),
        };

        if outcome.is_accepted() {
            self.update_route(candidate);
        }
        outcome
    }

    fn judge(current: &RouteEntry, candidate: &RouteEntry) -> Acceptance {
        if current.is_local() {
            return Acceptance::Rejected(RejectReason::LocalRoute);
        }
        if current.is_broken() && !candidate.is_broken() {
            return Acceptance::Replaced(ReplaceReason::RepairsBroken);
        }
        if candidate.sequence_number > current.sequence_number {
            return Acceptance::Replaced(ReplaceReason::NewerSequence);
        }
        if candidate.sequence_number < current.sequence_number {
            return Acceptance::Rejected(RejectReason::StaleSequence);
        }
        if candidate.weighted_metric < current.weighted_metric {
            Acceptance::Replaced(ReplaceReason::BetterMetric)
        } else {
            Acceptance::Rejected(RejectReason::NotBetter)
        }
    }

    /// Look up a usable route
    ///
    /// Returns `None` if there is no entry, or the entry is broken or
    /// expired. Use [`RoutingTable::get`] to tell those cases apart.
    pub fn lookup_route(&self, destination: Ipv4Addr, now: Instant) -> Option<&RouteEntry> {
        self.routes
            .get(&destination)
            .filter(|entry| entry.is_usable(now))
    }

    /// Get the raw entry for a destination, usable or not
    pub fn get(&self, destination: Ipv4Addr) -> Option<&RouteEntry> {
        self.routes.get(&destination)
    }

    /// Remove the route to a destination
    pub fn delete_route(&mut self, destination: Ipv4Addr) -> bool {
        self.routes.remove(&destination).is_some()
    }

    /// Mark every route through a neighbor as broken
    ///
    /// Returns the destinations that became broken.
    pub fn invalidate_routes_via_next_hop(
        &mut self,
        next_hop: Ipv4Addr,
        now: Instant,
    ) -> Vec<Ipv4Addr> {
        self.invalidate_where(now, |entry| entry.next_hop == next_hop)
    }

    /// Mark every route leaving through an interface as broken
    pub fn invalidate_routes_via_interface(
        &mut self,
        interface: InterfaceIndex,
        now: Instant,
    ) -> Vec<Ipv4Addr> {
        self.invalidate_where(now, |entry| entry.interface == interface)
    }

    fn invalidate_where<F>(&mut self, now: Instant, mut predicate: F) -> Vec<Ipv4Addr>
    where
        F: FnMut(&RouteEntry) -> bool,
    {
        let mut broken = Vec::new();
        for entry in self.routes.values_mut() {
            if entry.is_local() || entry.is_broken() || !predicate(entry) {
                continue;
            }
            entry.mark_broken(now);
            broken.push(entry.destination);
        }
        broken
    }

    /// Entries to broadcast, in destination order
    ///
    /// Clears the changed flag on every entry returned.
    pub fn snapshot_for_advertisement(&mut self, scope: AdvertisementScope) -> Vec<RouteEntry> {
        let mut snapshot = Vec::new();
        for entry in self.routes.values_mut() {
            if scope == AdvertisementScope::ChangedOnly && !entry.changed {
                continue;
            }
            entry.changed = false;
            snapshot.push(entry.clone());
        }
        snapshot
    }

    /// Check if any entry changed since it was last advertised
    pub fn has_changes(&self) -> bool {
        self.routes.values().any(|entry| entry.changed)
    }

    /// Break expired routes and remove old tombstones
    ///
    /// A route whose lifetime passed becomes a broken tombstone; a tombstone
    /// is removed once the hold window has elapsed since it broke.
    pub fn sweep_expired(&mut self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();
        let hold_window = self.hold_window;

        self.routes.retain(|destination, entry| {
            if entry.is_local() {
                return true;
            }
            if entry.is_broken() {
                if now >= entry.expires_at + hold_window {
                    report.removed.push(*destination);
                    return false;
                }
            } else if now > entry.expires_at {
                entry.mark_broken(now);
                report.broken.push(*destination);
            }
            true
        });
        report
    }

    /// Number of entries (including broken ones)
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.routes.clear();
    }

    /// Iterate over entries in destination order
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.values()
    }

    /// All destinations with an entry
    pub fn destinations(&self) -> Vec<Ipv4Addr> {
        self.routes.keys().copied().collect()
    }

    /// Printable view of the table, with lifetimes measured from `now`
    pub fn display_at(&self, now: Instant) -> TableDisplay<'_> {
        TableDisplay { table: self, now }
    }
}

/// The routing table rendered at a point in time
///
/// Created by [`RoutingTable::display_at`]. The last column is the time left
/// before each route expires.
pub struct TableDisplay<'a> {
    table: &'a RoutingTable,
    now: Instant,
}

impl Display for TableDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:<16} {:<16} {:<6} {:>5} {:>6} {:>6} {:>8} {:>9}",
            "Destination", "Gateway", "Iface", "Hops", "SeqNo", "Queue", "Metric", "Expires"
        )?;
        for entry in self.table.routes.values() {
            let hops = if entry.hop_count == INFINITE_HOPS {
                "inf".to_string()
            } else {
                entry.hop_count.to_string()
            };
            let expires = if entry.is_local() {
                "never".to_string()
            } else if self.now >= entry.expires_at {
                "expired".to_string()
            } else {
                let left = entry.expires_at.duration_since(self.now);
                format!("{:.2}s", left.as_secs_f64())
            };
            writeln!(
                f,
                "{:<16} {:<16} {:<6} {:>5} {:>6} {:>6} {:>8.4} {:>9}",
                entry.destination.to_string(),
                entry.next_hop.to_string(),
                entry.interface.to_string(),
                hops,
                entry.sequence_number,
                entry.queue_size,
                entry.weighted_metric,
                expires
            )?;
        }
        Ok(())
    }
}
