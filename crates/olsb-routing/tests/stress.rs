//! Stress tests for olsb-routing
//!
//! These tests check that the table and queue keep their bounds and
//! invariants under a high volume of operations.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use olsb_core::{DataPacket, InterfaceAddress, InterfaceIndex, PacketId};
use olsb_routing::{
    AdvertisedRoute, DeliveryCallbacks, MetricWeights, PacketQueue, RecordReader, RouteEntry,
    RoutingTable, encode_batch,
};

fn host(i: u32) -> Ipv4Addr {
    Ipv4Addr::from(0x0a00_0000 + i)
}

fn counting_callbacks(
    forwarded: &Arc<AtomicUsize>,
    failed: &Arc<AtomicUsize>,
) -> DeliveryCallbacks {
    let forwarded = forwarded.clone();
    let failed = failed.clone();
    DeliveryCallbacks::new(
        move |_, _| {
            forwarded.fetch_add(1, Ordering::Relaxed);
        },
        move |_, _| {
            failed.fetch_add(1, Ordering::Relaxed);
        },
    )
}

#[test]
fn test_routing_table_throughput() {
    const ROUTE_COUNT: u32 = 10_000;

    let now = Instant::now();
    let iface = InterfaceAddress::with_prefix(host(1), 8);
    let mut table = RoutingTable::new(
        MetricWeights::default(),
        Duration::from_secs(45),
        Duration::from_secs(45),
    );

    let start = Instant::now();
    for i in 0..ROUTE_COUNT {
        let entry = RouteEntry::new(host(i + 2), host(2 + i % 8), InterfaceIndex(1), iface, now)
            .with_hops(1 + i % 10)
            .with_sequence(2 * (i % 50))
            .with_queue_size(i % 100);
        table.offer(entry, now);
    }
    println!("Offered {} routes in {:?}", ROUTE_COUNT, start.elapsed());
    assert_eq!(table.len(), ROUTE_COUNT as usize);

    // Re-offer everything with a newer sequence number through other neighbors
    for i in 0..ROUTE_COUNT {
        let entry = RouteEntry::new(host(i + 2), host(20), InterfaceIndex(1), iface, now)
            .with_hops(9)
            .with_sequence(2 * (i % 50) + 2);
        assert!(table.offer(entry, now).is_accepted());
    }
    assert!(table.iter().all(|entry| entry.next_hop == host(20)));

    let broken = table.invalidate_routes_via_next_hop(host(20), now);
    assert_eq!(broken.len(), ROUTE_COUNT as usize);
    assert!(table.iter().all(|entry| entry.is_broken()));

    let report = table.sweep_expired(now + Duration::from_secs(45));
    assert_eq!(report.removed.len(), ROUTE_COUNT as usize);
    assert!(table.is_empty());
}

#[test]
fn test_full_table_advertisement_decodes() {
    let now = Instant::now();
    let iface = InterfaceAddress::with_prefix(host(1), 8);
    let mut table = RoutingTable::new(
        MetricWeights::default(),
        Duration::from_secs(45),
        Duration::from_secs(45),
    );
    for i in 0..500 {
        table.add_route(
            RouteEntry::new(host(i + 2), host(2), InterfaceIndex(1), iface, now)
                .with_hops(2)
                .with_sequence(4),
        );
    }

    let records: Vec<AdvertisedRoute> = table
        .snapshot_for_advertisement(olsb_routing::AdvertisementScope::Full)
        .iter()
        .map(|entry| entry.to_advertisement(0))
        .collect();
    let datagram = encode_batch(&records);
    assert_eq!(datagram.len(), 500 * 16);

    let decoded: Vec<_> = RecordReader::new(&datagram)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(decoded, records);
}

#[test]
fn test_queue_bounds_under_load() {
    const MAX_LEN: usize = 500;
    const PER_DST: usize = 5;
    const PACKETS: u64 = 20_000;

    let now = Instant::now();
    let forwarded = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let mut queue = PacketQueue::new(MAX_LEN, PER_DST, Duration::from_secs(30));

    for id in 0..PACKETS {
        let destination = host(1 + (id % 400) as u32);
        let packet = DataPacket::new(PacketId(id), host(0), destination, Bytes::new());
        queue
            .enqueue(packet, counting_callbacks(&forwarded, &failed), now)
            .unwrap();

        assert!(queue.len() <= MAX_LEN);
        assert!(queue.len_for(destination) <= PER_DST);
    }

    // Every packet is either still queued or was reported as dropped
    assert_eq!(queue.len() + failed.load(Ordering::Relaxed), PACKETS as usize);

    let route = olsb_routing::Route::new(host(7), host(0), host(2), InterfaceIndex(1));
    let mut drained = 0;
    for destination in queue.destinations() {
        for entry in queue.drain(destination) {
            entry.forward(route);
            drained += 1;
        }
    }
    assert_eq!(forwarded.load(Ordering::Relaxed), drained);
    assert!(queue.is_empty());
}

#[test]
fn test_queue_expiry_under_load() {
    let start = Instant::now();
    let forwarded = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let mut queue = PacketQueue::new(10_000, 100, Duration::from_secs(30));

    for id in 0..5_000u64 {
        let at = start + Duration::from_millis(id * 5);
        let destination = host(1 + (id % 100) as u32);
        let packet = DataPacket::new(PacketId(id), host(0), destination, Bytes::new());
        queue
            .enqueue(packet, counting_callbacks(&forwarded, &failed), at)
            .unwrap();
    }
    assert_eq!(queue.len(), 5_000);

    // Packets enqueued before t = 20s are past 30s of age at t = 50s
    let dropped = queue.sweep_expired(start + Duration::from_secs(50));
    assert_eq!(dropped, 4_000);
    assert_eq!(failed.load(Ordering::Relaxed), 4_000);
    assert_eq!(queue.len(), 1_000);
    assert_eq!(forwarded.load(Ordering::Relaxed), 0);
}
