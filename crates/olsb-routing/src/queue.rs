//! Packet queue for locally originated packets waiting on a route
//!
//! Packets are grouped by destination. Two independent bounds apply: a cap
//! per destination and a global cap across all destinations. When a bound
//! is hit the oldest packet (of that destination, or overall) is evicted
//! and the new packet is admitted. Every packet leaving the queue other
//! than by [`PacketQueue::drain`] has its error callback invoked.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use olsb_core::{DataPacket, PacketId, Route, RoutingError};
use tracing::{debug, trace};

use crate::config::OlsbConfig;

type ForwardFn = Box<dyn FnOnce(Route, DataPacket) + Send>;
type ErrorFn = Box<dyn FnOnce(DataPacket, RoutingError) + Send>;

/// Completion callbacks for a packet handed to the router
///
/// For an admitted packet exactly one of the two is invoked, once.
pub struct DeliveryCallbacks {
    forward: ForwardFn,
    error: ErrorFn,
}

impl DeliveryCallbacks {
    /// Create callbacks from a forward and an error closure
    pub fn new<F, E>(forward: F, error: E) -> Self
    where
        F: FnOnce(Route, DataPacket) + Send + 'static,
        E: FnOnce(DataPacket, RoutingError) + Send + 'static,
    {
        Self {
            forward: Box::new(forward),
            error: Box::new(error),
        }
    }

    /// Callbacks that discard the packet either way
    pub fn discard() -> Self {
        Self::new(|_, _| {}, |_, _| {})
    }

    /// Hand the packet to its route
    pub fn forward(self, route: Route, packet: DataPacket) {
        (self.forward)(route, packet)
    }

    /// Report that the packet was dropped
    pub fn fail(self, packet: DataPacket, error: RoutingError) {
        (self.error)(packet, error)
    }
}

impl Debug for DeliveryCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryCallbacks").finish_non_exhaustive()
    }
}

/// A packet waiting for a route
#[derive(Debug)]
pub struct QueueEntry {
    /// The buffered packet
    pub packet: DataPacket,
    /// When it was admitted
    pub enqueued_at: Instant,
    callbacks: DeliveryCallbacks,
    ticket: u64,
}

impl QueueEntry {
    /// Time spent in the queue
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }

    /// Forward the packet along a route that just became available
    pub fn forward(self, route: Route) {
        self.callbacks.forward(route, self.packet)
    }

    /// Drop the packet, reporting the reason
    pub fn fail(self, error: RoutingError) {
        self.callbacks.fail(self.packet, error)
    }
}

/// Outcome of a successful enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted without displacing anything
    Queued,
    /// Admitted after evicting an older packet
    QueuedWithEviction {
        /// The evicted packet
        evicted: PacketId,
        /// Destination the evicted packet was waiting on
        destination: Ipv4Addr,
    },
}

/// Bounded per-destination packet queue
#[derive(Debug)]
pub struct PacketQueue {
    max_len: usize,
    max_per_destination: usize,
    max_queue_time: Duration,
    by_destination: BTreeMap<Ipv4Addr, VecDeque<QueueEntry>>,
    len: usize,
    next_ticket: u64,
}

impl PacketQueue {
    /// Create an empty queue with the given bounds
    pub fn new(max_len: usize, max_per_destination: usize, max_queue_time: Duration) -> Self {
        Self {
            max_len,
            max_per_destination,
            max_queue_time,
            by_destination: BTreeMap::new(),
            len: 0,
            next_ticket: 0,
        }
    }

    /// Create a queue bounded by a configuration
    pub fn from_config(config: &OlsbConfig) -> Self {
        Self::new(
            config.max_queue_len,
            config.max_queued_packets_per_dst,
            config.max_queue_time,
        )
    }

    /// Admit a packet
    ///
    /// Expired packets are purged first. A packet whose id is already queued
    /// for the same destination is refused with
    /// [`RoutingError::DuplicatePacket`]; its callbacks are dropped without
    /// being invoked.
    pub fn enqueue(
        &mut self,
        packet: DataPacket,
        callbacks: DeliveryCallbacks,
        now: Instant,
    ) -> Result<Admission, RoutingError> {
        self.sweep_expired(now);

        let destination = packet.destination;
        if self.contains(destination, packet.id) {
            debug!(packet = %packet.id, %destination, "Refusing duplicate packet");
            return Err(RoutingError::DuplicatePacket);
        }

        let evicted = if self.len_for(destination) >= self.max_per_destination {
            self.pop_oldest_for(destination)
        } else if self.len >= self.max_len {
            self.pop_oldest_overall()
        } else {
            None
        };

        let admission = match evicted {
            Some(entry) => {
                let admission = Admission::QueuedWithEviction {
                    evicted: entry.packet.id,
                    destination: entry.packet.destination,
                };
                debug!(
                    packet = %entry.packet.id,
                    destination = %entry.packet.destination,
                    "Queue full, evicting oldest packet"
                );
                entry.fail(RoutingError::QueueFull);
                admission
            }
            None => Admission::Queued,
        };

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.by_destination
            .entry(destination)
            .or_default()
            .push_back(QueueEntry {
                packet,
                enqueued_at: now,
                callbacks,
                ticket,
            });
        self.len += 1;
        trace!(%destination, queued = self.len, "Packet queued");

        Ok(admission)
    }

    /// Drop every packet older than the maximum queue time
    ///
    /// Returns the number of packets dropped.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let max_queue_time = self.max_queue_time;
        let mut expired = Vec::new();

        for entries in self.by_destination.values_mut() {
            while entries
                .front()
                .is_some_and(|entry| entry.age(now) > max_queue_time)
            {
                if let Some(entry) = entries.pop_front() {
                    expired.push(entry);
                }
            }
        }
        self.by_destination.retain(|_, entries| !entries.is_empty());

        let count = expired.len();
        self.len -= count;
        for entry in expired {
            debug!(
                packet = %entry.packet.id,
                destination = %entry.packet.destination,
                "Queued packet expired"
            );
            entry.fail(RoutingError::PacketExpired);
        }
        count
    }

    /// Remove every packet for a destination, oldest first
    pub fn drain(&mut self, destination: Ipv4Addr) -> Vec<QueueEntry> {
        let entries: Vec<_> = self
            .by_destination
            .remove(&destination)
            .map(Vec::from)
            .unwrap_or_default();
        self.len -= entries.len();
        entries
    }

    /// Drop every packet with the given error
    pub fn flush(&mut self, error: RoutingError) -> usize {
        let queues = std::mem::take(&mut self.by_destination);
        let count = self.len;
        self.len = 0;
        for entry in queues.into_values().flatten() {
            entry.fail(error.clone());
        }
        count
    }

    /// Check if a packet is queued for a destination
    pub fn contains(&self, destination: Ipv4Addr, id: PacketId) -> bool {
        self.by_destination
            .get(&destination)
            .is_some_and(|entries| entries.iter().any(|entry| entry.packet.id == id))
    }

    /// Total number of queued packets
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of packets queued for a destination
    pub fn len_for(&self, destination: Ipv4Addr) -> usize {
        self.by_destination.get(&destination).map_or(0, VecDeque::len)
    }

    /// Destinations with at least one queued packet
    pub fn destinations(&self) -> Vec<Ipv4Addr> {
        self.by_destination.keys().copied().collect()
    }

    fn pop_oldest_for(&mut self, destination: Ipv4Addr) -> Option<QueueEntry> {
        let entries = self.by_destination.get_mut(&destination)?;
        let entry = entries.pop_front()?;
        if entries.is_empty() {
            self.by_destination.remove(&destination);
        }
        self.len -= 1;
        Some(entry)
    }

    fn pop_oldest_overall(&mut self) -> Option<QueueEntry> {
        let destination = self
            .by_destination
            .iter()
            .filter_map(|(dst, entries)| entries.front().map(|entry| (entry.ticket, *dst)))
            .min()
            .map(|(_, dst)| dst)?;
        self.pop_oldest_for(destination)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{Receiver, channel};

    use bytes::Bytes;
    use olsb_core::InterfaceIndex;

    use super::*;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 1, 1, last)
    }

    fn packet(id: u64, dst: u8) -> DataPacket {
        DataPacket::new(PacketId(id), addr(1), addr(dst), Bytes::from_static(b"data"))
    }

    type Outcome = Result<PacketId, (PacketId, RoutingError)>;

    fn recording() -> (impl Fn() -> DeliveryCallbacks, Receiver<Outcome>) {
        let (tx, rx) = channel();
        let make = move || {
            let ok = tx.clone();
            let err = tx.clone();
            DeliveryCallbacks::new(
                move |_, p: DataPacket| {
                    let _ = ok.send(Ok(p.id));
                },
                move |p: DataPacket, e| {
                    let _ = err.send(Err((p.id, e)));
                },
            )
        };
        (make, rx)
    }

    #[test]
    fn test_enqueue_and_drain_in_order() {
        let now = Instant::now();
        let mut queue = PacketQueue::new(10, 5, Duration::from_secs(30));
        let (callbacks, rx) = recording();

        for id in 0..3 {
            assert_eq!(
                queue.enqueue(packet(id, 4), callbacks(), now),
                Ok(Admission::Queued)
            );
        }
        queue.enqueue(packet(10, 5), callbacks(), now).unwrap();
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.len_for(addr(4)), 3);

        let route = Route::new(addr(4), addr(1), addr(2), InterfaceIndex(1));
        let drained = queue.drain(addr(4));
        assert_eq!(drained.len(), 3);
        for entry in drained {
            entry.forward(route);
        }

        let order: Vec<_> = rx.try_iter().collect();
        assert_eq!(order, vec![Ok(PacketId(0)), Ok(PacketId(1)), Ok(PacketId(2))]);
        assert_eq!(queue.len(), 1);
        assert!(queue.drain(addr(4)).is_empty());
    }

    #[test]
    fn test_per_destination_cap_evicts_oldest_for_destination() {
        let now = Instant::now();
        let mut queue = PacketQueue::new(100, 2, Duration::from_secs(30));
        let (callbacks, rx) = recording();

        queue.enqueue(packet(1, 4), callbacks(), now).unwrap();
        queue.enqueue(packet(2, 9), callbacks(), now).unwrap();
        queue.enqueue(packet(3, 4), callbacks(), now).unwrap();
        let admission = queue.enqueue(packet(4, 4), callbacks(), now).unwrap();

        assert_eq!(
            admission,
            Admission::QueuedWithEviction {
                evicted: PacketId(1),
                destination: addr(4)
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Err((PacketId(1), RoutingError::QueueFull))
        );
        assert_eq!(queue.len_for(addr(4)), 2);
        assert_eq!(queue.len_for(addr(9)), 1);
    }

    #[test]
    fn test_global_cap_evicts_oldest_overall() {
        let now = Instant::now();
        let mut queue = PacketQueue::new(3, 3, Duration::from_secs(30));
        let (callbacks, rx) = recording();

        queue.enqueue(packet(1, 5), callbacks(), now).unwrap();
        queue.enqueue(packet(2, 4), callbacks(), now).unwrap();
        queue.enqueue(packet(3, 4), callbacks(), now).unwrap();
        let admission = queue.enqueue(packet(4, 6), callbacks(), now).unwrap();

        assert_eq!(
            admission,
            Admission::QueuedWithEviction {
                evicted: PacketId(1),
                destination: addr(5)
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Err((PacketId(1), RoutingError::QueueFull))
        );
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.destinations(), vec![addr(4), addr(6)]);
    }

    #[test]
    fn test_sweep_drops_old_packets() {
        let start = Instant::now();
        let mut queue = PacketQueue::new(10, 5, Duration::from_secs(30));
        let (callbacks, rx) = recording();

        queue.enqueue(packet(1, 4), callbacks(), start).unwrap();
        queue
            .enqueue(packet(2, 4), callbacks(), start + Duration::from_secs(20))
            .unwrap();

        assert_eq!(queue.sweep_expired(start + Duration::from_secs(30)), 0);
        assert_eq!(queue.sweep_expired(start + Duration::from_secs(31)), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            Err((PacketId(1), RoutingError::PacketExpired))
        );
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.sweep_expired(start + Duration::from_secs(60)), 1);
        assert!(queue.is_empty());
        assert!(queue.destinations().is_empty());
    }

    #[test]
    fn test_duplicate_refused() {
        let now = Instant::now();
        let mut queue = PacketQueue::new(10, 5, Duration::from_secs(30));
        let (callbacks, rx) = recording();

        queue.enqueue(packet(7, 4), callbacks(), now).unwrap();
        let result = queue.enqueue(packet(7, 4), callbacks(), now);

        assert_eq!(result, Err(RoutingError::DuplicatePacket));
        assert!(rx.try_recv().is_err());
        assert_eq!(queue.len(), 1);

        // Same id to another destination is a different packet
        queue.enqueue(packet(7, 5), callbacks(), now).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_flush_fails_everything() {
        let now = Instant::now();
        let mut queue = PacketQueue::new(10, 5, Duration::from_secs(30));
        let (callbacks, rx) = recording();

        queue.enqueue(packet(1, 4), callbacks(), now).unwrap();
        queue.enqueue(packet(2, 5), callbacks(), now).unwrap();

        assert_eq!(queue.flush(RoutingError::Shutdown), 2);
        assert!(queue.is_empty());

        let errors: Vec<_> = rx.try_iter().collect();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|o| matches!(o, Err((_, RoutingError::Shutdown)))));
    }
}
