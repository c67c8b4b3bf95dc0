//! End-to-end tests for the routing engine
//!
//! Engines are driven by hand: a shared clock, a recording scheduler, and a
//! transport whose sent datagrams are delivered explicitly by the test.

use std::cell::{Cell, RefCell};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use bytes::Bytes;
use olsb_core::{
    DataPacket, InterfaceAddress, InterfaceIndex, PacketId, Scheduler, SocketHandle, TimerKind,
    TimerToken, Transport, TransportError,
};
use olsb_routing::{
    AdvertisedRoute, DeliveryCallbacks, OlsbConfig, OutputRoute, RoutingEngine, RoutingError,
    encode_batch,
};

type Outbox = Rc<RefCell<Vec<(Vec<u8>, Ipv4Addr)>>>;

#[derive(Clone, Default)]
struct ManualTransport {
    outbox: Outbox,
}

impl Transport for ManualTransport {
    fn bind(&self, _local: InterfaceAddress) -> Result<SocketHandle, TransportError> {
        Ok(SocketHandle(1))
    }

    fn send_to(
        &self,
        _socket: SocketHandle,
        bytes: &[u8],
        destination: Ipv4Addr,
    ) -> Result<(), TransportError> {
        self.outbox.borrow_mut().push((bytes.to_vec(), destination));
        Ok(())
    }

    fn close(&self, _socket: SocketHandle) {}
}

#[derive(Clone)]
struct ManualScheduler {
    clock: Rc<Cell<Instant>>,
    pending: Rc<RefCell<Vec<(Instant, TimerToken)>>>,
}

impl ManualScheduler {
    fn new(clock: Rc<Cell<Instant>>) -> Self {
        Self {
            clock,
            pending: Rc::default(),
        }
    }

    /// Remove and return the tokens due at the current time
    fn due(&self) -> Vec<TimerToken> {
        let now = self.clock.get();
        let mut pending = self.pending.borrow_mut();
        let (due, rest): (Vec<_>, Vec<_>) = pending.drain(..).partition(|(at, _)| *at <= now);
        *pending = rest;
        due.into_iter().map(|(_, token)| token).collect()
    }

    fn pending_kind(&self, kind: TimerKind) -> bool {
        self.pending.borrow().iter().any(|(_, t)| t.kind == kind)
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.clock.get()
    }

    fn schedule(&self, delay: Duration, timer: TimerToken) {
        self.pending
            .borrow_mut()
            .push((self.clock.get() + delay, timer));
    }

    fn cancel(&self, timer: TimerToken) {
        self.pending.borrow_mut().retain(|(_, t)| *t != timer);
    }
}

type Engine = RoutingEngine<ManualTransport, ManualScheduler>;

struct Node {
    engine: Engine,
    transport: ManualTransport,
    scheduler: ManualScheduler,
    address: Ipv4Addr,
}

impl Node {
    fn new(last: u8, config: OlsbConfig, clock: &Rc<Cell<Instant>>) -> Self {
        let transport = ManualTransport::default();
        let scheduler = ManualScheduler::new(clock.clone());
        let address = Ipv4Addr::new(10, 1, 1, last);
        let mut engine = RoutingEngine::new(
            config.with_rng_seed(u64::from(last)),
            transport.clone(),
            scheduler.clone(),
        )
        .unwrap();
        engine.notify_interface_up(InterfaceIndex(1), InterfaceAddress::with_prefix(address, 24));
        engine.start().unwrap();
        Self {
            engine,
            transport,
            scheduler,
            address,
        }
    }

    fn fire_due_timers(&mut self) {
        for token in self.scheduler.due() {
            self.engine.handle_timer(token);
        }
    }

    fn take_outbox(&self) -> Vec<Vec<u8>> {
        self.transport
            .outbox
            .borrow_mut()
            .drain(..)
            .map(|(bytes, _)| bytes)
            .collect()
    }
}

fn addr(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 1, 1, last)
}

/// Deliver each node's pending datagrams to its listed neighbors
fn exchange(nodes: &mut [Node], links: &[(usize, usize)]) {
    let outboxes: Vec<_> = nodes.iter().map(Node::take_outbox).collect();
    for (from, datagrams) in outboxes.iter().enumerate() {
        let sender = nodes[from].address;
        for &(a, b) in links {
            let to = match (a == from, b == from) {
                (true, _) => b,
                (_, true) => a,
                _ => continue,
            };
            for datagram in datagrams {
                nodes[to]
                    .engine
                    .receive_control(InterfaceIndex(1), sender, datagram);
            }
        }
    }
}

#[test]
fn test_queued_packet_released_by_advertisement() {
    let clock = Rc::new(Cell::new(Instant::now()));
    let mut a = Node::new(1, OlsbConfig::default(), &clock);

    let (tx, rx) = channel();
    let err_tx = tx.clone();
    let packet = DataPacket::new(PacketId(1), addr(1), addr(4), Bytes::from_static(b"hello"));
    let outcome = a
        .engine
        .route_output(
            packet,
            DeliveryCallbacks::new(
                move |route, packet| {
                    let _ = tx.send(Ok((route.gateway, packet.id)));
                },
                move |packet, error| {
                    let _ = err_tx.send(Err((packet.id, error)));
                },
            ),
        )
        .unwrap();
    assert!(matches!(outcome, OutputRoute::Pending));
    assert_eq!(a.engine.queued_packets(), 1);
    assert!(rx.try_recv().is_err());

    // Neighbor 10.1.1.2 advertises a fresh route to 10.1.1.4
    let datagram = encode_batch(&[AdvertisedRoute::new(addr(4), 2, 6, 0)]);
    a.engine.receive_control(InterfaceIndex(1), addr(2), &datagram);

    assert_eq!(rx.try_recv().unwrap(), Ok((addr(2), PacketId(1))));
    assert_eq!(a.engine.queued_packets(), 0);
    assert_eq!(a.engine.stats().packets_drained, 1);
    assert_eq!(a.engine.table().get(addr(4)).unwrap().hop_count, 3);
}

#[test]
fn test_queued_packet_expires() {
    let clock = Rc::new(Cell::new(Instant::now()));
    let config = OlsbConfig::default().with_queue_limits(10, 5, Duration::from_secs(2));
    let mut a = Node::new(1, config, &clock);

    let (tx, rx) = channel();
    let packet = DataPacket::new(PacketId(9), addr(1), addr(7), Bytes::new());
    a.engine
        .route_output(
            packet,
            DeliveryCallbacks::new(|_, _| {}, move |packet, error| {
                let _ = tx.send((packet.id, error));
            }),
        )
        .unwrap();

    clock.set(clock.get() + Duration::from_secs(3));
    let packet = DataPacket::new(PacketId(10), addr(1), addr(8), Bytes::new());
    a.engine
        .route_output(packet, DeliveryCallbacks::discard())
        .unwrap();

    assert_eq!(rx.try_recv().unwrap(), (PacketId(9), RoutingError::PacketExpired));
    assert_eq!(a.engine.queued_packets(), 1);
}

#[test]
fn test_line_converges_through_periodic_updates() {
    let clock = Rc::new(Cell::new(Instant::now()));
    let config = OlsbConfig::default();
    let mut nodes: Vec<_> = (1..=4).map(|i| Node::new(i, config.clone(), &clock)).collect();
    let links = [(0, 1), (1, 2), (2, 3)];

    // Three periodic rounds carry routes across three hops
    for _ in 0..4 {
        clock.set(clock.get() + Duration::from_secs(16));
        for node in nodes.iter_mut() {
            node.fire_due_timers();
        }
        exchange(&mut nodes, &links);
    }

    let route = nodes[0].engine.lookup(addr(4)).unwrap();
    assert_eq!(route.gateway, addr(2));
    assert_eq!(nodes[0].engine.table().get(addr(4)).unwrap().hop_count, 3);
    assert_eq!(nodes[3].engine.lookup(addr(1)).unwrap().gateway, addr(3));
    for node in &nodes {
        assert_eq!(node.engine.table().len(), 4);
    }
}

#[test]
fn test_break_propagates_by_triggered_update() {
    let clock = Rc::new(Cell::new(Instant::now()));
    let mut nodes: Vec<_> = (1..=3)
        .map(|i| Node::new(i, OlsbConfig::default(), &clock))
        .collect();
    let links = [(0, 1), (1, 2)];

    for _ in 0..3 {
        clock.set(clock.get() + Duration::from_secs(16));
        for node in nodes.iter_mut() {
            node.fire_due_timers();
        }
        exchange(&mut nodes, &links);
    }
    assert!(nodes[0].engine.lookup(addr(3)).is_some());
    for node in &nodes {
        node.take_outbox();
    }

    // Node 2 loses its link to node 3
    nodes[1].engine.notify_link_failure(addr(3));
    assert!(nodes[1].scheduler.pending_kind(TimerKind::Triggered));

    clock.set(clock.get() + Duration::from_secs(5));
    nodes[1].fire_due_timers();
    exchange(&mut nodes, &[(0, 1)]);

    assert!(nodes[0].engine.lookup(addr(3)).is_none());
    let entry = nodes[0].engine.table().get(addr(3)).unwrap();
    assert!(entry.is_broken());
    assert_eq!(entry.sequence_number % 2, 1);
}

#[test]
fn test_expired_route_unusable_without_refresh() {
    let clock = Rc::new(Cell::new(Instant::now()));
    let mut a = Node::new(1, OlsbConfig::default(), &clock);

    let datagram = encode_batch(&[AdvertisedRoute::new(addr(2), 0, 2, 0)]);
    a.engine.receive_control(InterfaceIndex(1), addr(2), &datagram);
    assert!(a.engine.lookup(addr(2)).is_some());

    // hold_times x periodic_update_interval = 45s
    clock.set(clock.get() + Duration::from_secs(46));
    assert!(a.engine.lookup(addr(2)).is_none());

    a.fire_due_timers();
    assert!(a.engine.table().get(addr(2)).unwrap().is_broken());
}
