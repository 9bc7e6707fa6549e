use std::time::Duration;

use olsr::concepts::link::LinkStatus;
use olsr::concepts::metric::Metric;
use olsr::concepts::packet::{HelloNeighbour, LinkStatusValue, Message};
use olsr::config::{Config, Hysteresis};
use olsr::feedback::DiscardReason;
use olsr::router::Router;

use crate::common::virtual_network::{hello, listed, lone_router, tc, test_config, RouteOp, VirtualSystem, ITF};

mod common;

fn itf() -> String {
    ITF.to_string()
}

fn addr(name: &str) -> String {
    name.to_string()
}

fn link_status(router: &Router<VirtualSystem>, neighbour: &str) -> Option<LinkStatus> {
    router.interfaces[0]
        .links
        .values()
        .find(|link| link.neighbour_addrs.contains(neighbour))
        .map(|link| link.status)
}

/// Everything a HELLO may change about the link to `neighbour`, timers aside
fn link_snapshot(router: &Router<VirtualSystem>, neighbour: &str) -> String {
    let link = router.interfaces[0]
        .links
        .values()
        .find(|link| link.neighbour_addrs.contains(neighbour))
        .unwrap();
    let two_hops: Vec<_> = link
        .two_hops
        .values()
        .map(|n2| (n2.address.clone(), n2.in_metric, n2.out_metric))
        .collect();
    format!(
        "{:?} {:?} {} {} {:?}",
        link.status, link.neighbour_addrs, link.in_metric, link.out_metric, two_hops
    )
}

#[test]
fn hello_exchange_makes_link_symmetric() {
    let mut x = lone_router("x");

    // y has not heard x yet
    x.handle_packet(Duration::from_secs(1), &itf(), &addr("y"), &hello("y", vec![]));
    assert_eq!(link_status(&x, "y"), Some(LinkStatus::Heard));
    assert!(!x.neighbour_by_addr(&addr("y")).unwrap().symmetric);
    assert!(x.routes().is_empty());

    x.handle_packet(
        Duration::from_secs(3),
        &itf(),
        &addr("y"),
        &hello("y", vec![listed("x", LinkStatusValue::Heard)]),
    );
    assert_eq!(link_status(&x, "y"), Some(LinkStatus::Symmetric));
    assert!(x.neighbour_by_addr(&addr("y")).unwrap().symmetric);

    let route = x.routes().get("y").unwrap().clone();
    assert_eq!(route.next_hop, "y");
    assert_eq!(route.source, "x");
    assert_eq!(route.dist, 1);
    assert_eq!(route.itf, ITF);
    assert_eq!(x.route_table.ops, vec![RouteOp::Add(route.clone())]);

    // y no longer lists x, the link falls back to heard and the route goes away
    x.handle_packet(Duration::from_secs(5), &itf(), &addr("y"), &hello("y", vec![]));
    assert_eq!(link_status(&x, "y"), Some(LinkStatus::Heard));
    assert!(x.routes().is_empty());
    assert_eq!(x.route_table.ops.last(), Some(&RouteOp::Delete(route)));
    // and y is advertised as lost
    assert!(x.lost_neighbours.values().any(|lost| lost.address == "y"));
}

#[test]
fn pending_link_waits_for_link_quality() {
    let config = Config {
        hysteresis: Some(Hysteresis {
            initial_quality: 0.1,
            ..Hysteresis::default()
        }),
        ..test_config()
    };
    let mut x = Router::<VirtualSystem>::with_seed(config, 0).unwrap();
    x.add_interface(Duration::ZERO, itf(), vec![addr("x")]);

    // quality goes 0.55, 0.775, 0.8875 and is accepted above 0.8
    let packet = hello("y", vec![listed("x", LinkStatusValue::Symmetric)]);
    let expected = [LinkStatus::Pending, LinkStatus::Pending, LinkStatus::Symmetric];
    for (idx, status) in expected.into_iter().enumerate() {
        x.handle_packet(Duration::from_secs(1 + idx as u64), &itf(), &addr("y"), &packet);
        assert_eq!(link_status(&x, "y"), Some(status));
    }
    assert!(x.neighbour_by_addr(&addr("y")).unwrap().symmetric);
    assert_eq!(x.routes().get("y").unwrap().dist, 1);
}

#[test]
fn hello_is_idempotent() {
    let mut x = lone_router("x");
    let packet = hello(
        "y",
        vec![
            listed("x", LinkStatusValue::Symmetric),
            listed("z", LinkStatusValue::Symmetric),
        ],
    );
    x.handle_packet(Duration::from_secs(1), &itf(), &addr("y"), &packet);
    let before = link_snapshot(&x, "y");
    assert!(x.routes().contains_key("z"));
    let stats = x.stats().clone();
    x.route_table.ops.clear();

    x.handle_packet(Duration::from_secs(2), &itf(), &addr("y"), &packet);
    assert_eq!(link_snapshot(&x, "y"), before);
    assert!(x.route_table.ops.is_empty());
    assert_eq!(x.stats().route_calcs, stats.route_calcs);
    assert_eq!(x.stats().routing_mpr_calcs, stats.routing_mpr_calcs);
}

#[test]
fn two_hop_neighbours_come_from_symmetric_entries() {
    let mut x = lone_router("x");
    let mut lost = listed("w", LinkStatusValue::Lost);
    lost.metrics.n_out = Some(Metric::new(100));
    let packet = hello(
        "y",
        vec![
            listed("x", LinkStatusValue::Symmetric),
            listed("z", LinkStatusValue::Symmetric),
            listed("v", LinkStatusValue::Heard),
            lost,
        ],
    );
    x.handle_packet(Duration::from_secs(1), &itf(), &addr("y"), &packet);

    let link = x.interfaces[0].links.values().next().unwrap();
    let two_hops: Vec<&str> = link.two_hops.values().map(|n2| n2.address.as_str()).collect();
    assert_eq!(two_hops, vec!["z"]);
    assert_eq!(x.routes().get("z").unwrap().dist, 2);
    assert_eq!(x.routes().get("z").unwrap().next_hop, "y");
}

#[test]
fn duplicate_tc_is_processed_and_forwarded_once() {
    let mut x = lone_router("x");
    let now = Duration::from_secs(1);
    let selected = HelloNeighbour {
        flooding_mpr: true,
        routing_mpr: true,
        ..listed("x", LinkStatusValue::Symmetric)
    };
    x.handle_packet(now, &itf(), &addr("y1"), &hello("y1", vec![selected.clone()]));
    x.handle_packet(now, &itf(), &addr("y2"), &hello("y2", vec![selected]));

    let packet = tc("z", 1, 1, &["w"]);
    x.handle_packet(now, &itf(), &addr("y1"), &packet);
    x.handle_packet(now, &itf(), &addr("y2"), &packet);
    x.handle_packet(now, &itf(), &addr("y1"), &packet);

    assert_eq!(x.router_topology.len(), 1);
    assert_eq!(x.stats().discarded(DiscardReason::Duplicate), 2);
    assert_eq!(x.stats().tc_relayed, 1);
    assert_eq!(x.relay_queue.len(), 1);

    x.tick(now + Duration::from_secs(2));
    let relayed: Vec<_> = x
        .drain_outbound()
        .into_iter()
        .filter_map(|out| match out.message {
            Message::Tc(relayed) if relayed.header.originator.as_deref() == Some("z") => Some(relayed),
            _ => None,
        })
        .collect();
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].header.hop_limit, Some(9));
    assert_eq!(relayed[0].header.hop_count, Some(1));
    assert!(x.relay_queue.is_empty());
}

#[test]
fn tc_from_non_selector_is_not_forwarded() {
    let mut x = lone_router("x");
    let now = Duration::from_secs(1);
    x.handle_packet(now, &itf(), &addr("y"), &hello("y", vec![listed("x", LinkStatusValue::Symmetric)]));
    x.handle_packet(now, &itf(), &addr("y"), &tc("z", 1, 1, &["w"]));

    // accepted into the topology, but y did not pick x as relay
    assert_eq!(x.router_topology.len(), 1);
    assert_eq!(x.stats().tc_relayed, 0);
    assert!(x.relay_queue.is_empty());
}

#[test]
fn stale_ansn_is_rejected() {
    let mut x = lone_router("x");
    let now = Duration::from_secs(1);
    x.handle_packet(now, &itf(), &addr("y"), &tc("z", 1, 7, &["a"]));
    let topology = |router: &Router<VirtualSystem>| -> Vec<(String, String, u16)> {
        router
            .router_topology
            .values()
            .map(|tr| (tr.from.clone(), tr.to.clone(), tr.ansn))
            .collect()
    };
    let before = topology(&x);
    assert_eq!(before, vec![(addr("z"), addr("a"), 7)]);

    x.handle_packet(now, &itf(), &addr("y"), &tc("z", 2, 5, &["b"]));
    assert_eq!(topology(&x), before);
    assert_eq!(x.stats().discarded(DiscardReason::StaleAnsn), 1);
    assert_eq!(x.advertising_routers.values().next().unwrap().ansn, 7);

    // a newer complete TC replaces the advertised set
    x.handle_packet(now, &itf(), &addr("y"), &tc("z", 3, 8, &["b"]));
    assert_eq!(topology(&x), vec![(addr("z"), addr("b"), 8)]);
}

#[test]
fn own_and_malformed_messages_are_dropped() {
    let mut x = lone_router("x");
    let now = Duration::from_secs(1);

    x.handle_packet(now, &itf(), &addr("x"), &hello("x", vec![]));
    assert_eq!(x.stats().discarded(DiscardReason::OwnMessage), 1);

    x.handle_packet(now, &addr("eth9"), &addr("y"), &hello("y", vec![]));
    assert_eq!(x.stats().discarded(DiscardReason::UnknownInterface), 1);

    let mut relayed_hello = hello("y", vec![]);
    if let Message::Hello(message) = &mut relayed_hello.messages[0] {
        message.header.hop_limit = Some(2);
    }
    x.handle_packet(now, &itf(), &addr("y"), &relayed_hello);
    assert_eq!(x.stats().discarded(DiscardReason::HelloHopLimit), 1);

    // a TC advertising its own originator
    x.handle_packet(now, &itf(), &addr("y"), &tc("z", 1, 1, &["z"]));
    assert_eq!(x.stats().discarded(DiscardReason::AdvertisesOriginator), 1);

    assert!(x.interfaces[0].links.is_empty());
    assert!(x.router_topology.is_empty());
}
