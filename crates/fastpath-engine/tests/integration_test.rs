//! Integration tests driving the engine through its public handle.
//!
//! A mock collaborator stands in for the driver layer: it records what the
//! engine transmits and which ARP probes it requests, without needing real
//! devices or packets.

use fastpath_engine::{
    ActionFlags, AgeVerdict, BrcRequest, CacheEngine, EngineCallbacks, FastPathEngine, FlowTuple,
    ForwardOutcome, IpcRequest, MacAddress, NatRewrite, Packet, RawDeviceId, VlanId, PROTO_TCP,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

/// Mock driver layer recording everything the engine asks of it.
#[derive(Default)]
struct MockDriver {
    transmitted: Mutex<Vec<(RawDeviceId, Packet)>>,
    arp_probes: Mutex<Vec<(Ipv4Addr, RawDeviceId)>>,
}

impl MockDriver {
    fn transmitted(&self) -> Vec<(RawDeviceId, Packet)> {
        self.transmitted.lock().unwrap().clone()
    }

    fn arp_probes(&self) -> Vec<(Ipv4Addr, RawDeviceId)> {
        self.arp_probes.lock().unwrap().clone()
    }
}

impl EngineCallbacks for MockDriver {
    fn transmit(&self, txif: RawDeviceId, packet: &Packet) {
        self.transmitted.lock().unwrap().push((txif, packet.clone()));
    }

    fn send_arp_request(&self, target: Ipv4Addr, via: RawDeviceId) {
        self.arp_probes.lock().unwrap().push((target, via));
    }
}

const D1: RawDeviceId = 1;
const D2: RawDeviceId = 2;

fn setup() -> (FastPathEngine, Arc<MockDriver>) {
    let engine = FastPathEngine::new("it0");
    let driver = Arc::new(MockDriver::default());
    engine.callbacks_register(Arc::clone(&driver) as Arc<dyn EngineCallbacks>);

    engine.dev_register(D1, "eth0", false).unwrap();
    engine.dev_register(D2, "br0", true).unwrap();
    engine.enable(D1, true).unwrap();
    engine.enable(D2, true).unwrap();
    (engine, driver)
}

fn host_mac() -> MacAddress {
    "aa:bb:cc:dd:ee:ff".parse().unwrap()
}

fn peer_mac() -> MacAddress {
    "00:11:22:33:44:55".parse().unwrap()
}

fn flow() -> FlowTuple {
    FlowTuple::v4(
        Ipv4Addr::new(10, 0, 0, 5),
        1234,
        Ipv4Addr::new(10, 0, 0, 9),
        80,
        PROTO_TCP,
    )
}

/// A learned MAC on a non-bridge port is cut-through forwarded from the
/// bridge interface to that port, with the untag action applied.
#[test]
fn bridged_frame_routes_to_learned_port() {
    let (engine, driver) = setup();

    engine
        .brc_add(BrcRequest::new(
            host_mac(),
            VlanId::NONE,
            D1,
            ActionFlags::UNTAG,
        ))
        .unwrap();

    let mut pkt =
        Packet::l2(host_mac(), peer_mac(), 64).with_vlan(VlanId::new(100).unwrap());
    let outcome = engine.forward(&mut pkt, D2).unwrap();

    assert_eq!(outcome, ForwardOutcome::Forwarded { txif: D1 });
    assert_eq!(pkt.vlan, None);

    let sent = driver.transmitted();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, D1);

    // Same flow again: the hot cache now carries it.
    let mut pkt = Packet::l2(host_mac(), peer_mac(), 64);
    engine.forward(&mut pkt, D2).unwrap();
    assert_eq!(engine.stats().hot_hits, 1);
    assert_eq!(engine.stats().brc_hits, 1);
}

/// Re-adding a connection with a new NAT target updates the one cached
/// entry instead of duplicating it.
#[test]
fn nat_update_keeps_single_connection_entry() {
    let (engine, _driver) = setup();

    let mut req = IpcRequest::new(flow(), host_mac(), peer_mac(), D1, ActionFlags::SNAT);
    req.nat = Some(NatRewrite::new(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), 1111));
    engine.ipc_add(req).unwrap();

    let mut req = IpcRequest::new(flow(), host_mac(), peer_mac(), D1, ActionFlags::SNAT);
    req.nat = Some(NatRewrite::new(IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)), 2222));
    engine.ipc_add(req).unwrap();

    assert_eq!(engine.ipc_count(), 1);

    let entry = engine.ipc_lookup(&flow()).unwrap();
    assert_eq!(
        entry.nat(),
        Some(NatRewrite::new(IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)), 2222))
    );
    engine.ipc_release(&entry);

    // The rewrite is what the forward path applies.
    let mut pkt = Packet::l2(host_mac(), peer_mac(), 256).with_tuple(flow());
    engine.forward(&mut pkt, D2).unwrap();
    let tuple = pkt.tuple.unwrap();
    assert_eq!(tuple.src_ip, IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)));
    assert_eq!(tuple.src_port, 2222);
}

/// A cooling entry triggers exactly one ARP probe toward its recorded
/// source; once cold, the caller's delete also clears the hot slot.
#[test]
fn cooling_entry_probes_then_expires() {
    let (engine, driver) = setup();
    let src = Ipv4Addr::new(10, 0, 0, 5);

    engine
        .brc_add(
            BrcRequest::new(host_mac(), VlanId::NONE, D1, ActionFlags::empty())
                .with_src_ip(src),
        )
        .unwrap();

    // Traffic flows, then stops.
    let mut pkt = Packet::l2(host_mac(), peer_mac(), 64);
    engine.forward(&mut pkt, D2).unwrap();

    assert_eq!(engine.brc_age(&host_mac()).unwrap(), AgeVerdict::Postpone);
    assert_eq!(
        engine.brc_age(&host_mac()).unwrap(),
        AgeVerdict::Cooling { probe: Some(src) }
    );
    assert_eq!(engine.brc_age(&host_mac()).unwrap(), AgeVerdict::Expire);
    assert_eq!(driver.arp_probes(), vec![(src, D1)]);

    // The hot slot is populated from the earlier forward; the delete that
    // follows the Expire verdict must clear it.
    let bank = engine.enable(D2, true).unwrap().expect("bank");
    assert!(bank.probe(&host_mac()).is_some());

    engine.brc_delete(&host_mac()).unwrap();
    assert!(bank.probe(&host_mac()).is_none());
    assert!(engine.brc_lookup(&host_mac()).is_none());
}

/// An entry kept warm by traffic between sweeps never reaches Cold, and
/// the postponed verdict tells the bridge to reset its age timer.
#[test]
fn traffic_postpones_slow_path_expiry() {
    let (engine, _driver) = setup();
    engine
        .brc_add(BrcRequest::new(
            host_mac(),
            VlanId::NONE,
            D1,
            ActionFlags::empty(),
        ))
        .unwrap();

    for _ in 0..5 {
        let mut pkt = Packet::l2(host_mac(), peer_mac(), 64);
        engine.forward(&mut pkt, D2).unwrap();
        assert_eq!(engine.brc_age(&host_mac()).unwrap(), AgeVerdict::Postpone);
    }
}

/// Tearing down an interface drains every entry referencing it before the
/// call returns.
#[test]
fn interface_teardown_drains_both_tables() {
    let (engine, _driver) = setup();

    engine
        .brc_add(BrcRequest::new(
            host_mac(),
            VlanId::NONE,
            D1,
            ActionFlags::empty(),
        ))
        .unwrap();
    engine
        .ipc_add(IpcRequest::new(
            flow(),
            host_mac(),
            peer_mac(),
            D1,
            ActionFlags::empty(),
        ))
        .unwrap();

    engine.dev_unregister(D1).unwrap();

    assert!(engine.brc_lookup(&host_mac()).is_none());
    assert_eq!(engine.ipc_count(), 0);
    assert!(!engine.is_enabled(D1));

    // Forwarding to the drained destination falls back to the slow path.
    let mut pkt = Packet::l2(host_mac(), peer_mac(), 64);
    assert_eq!(engine.forward(&mut pkt, D2).unwrap(), ForwardOutcome::Miss);
}

/// A suspended connection falls back to the slow path until resumed.
#[test]
fn suspended_connection_takes_slow_path() {
    let (engine, driver) = setup();
    engine
        .ipc_add(IpcRequest::new(
            flow(),
            host_mac(),
            peer_mac(),
            D1,
            ActionFlags::empty(),
        ))
        .unwrap();

    let (start, end) = (flow(), flow());
    engine
        .ipc_action(&start, &end, ActionFlags::SUSPEND, true)
        .unwrap();

    let mut pkt = Packet::l2(host_mac(), peer_mac(), 64).with_tuple(flow());
    assert_eq!(engine.forward(&mut pkt, D2).unwrap(), ForwardOutcome::Miss);
    assert!(driver.transmitted().is_empty());

    engine
        .ipc_action(&start, &end, ActionFlags::SUSPEND, false)
        .unwrap();
    let mut pkt = Packet::l2(host_mac(), peer_mac(), 64).with_tuple(flow());
    assert_eq!(
        engine.forward(&mut pkt, D2).unwrap(),
        ForwardOutcome::Forwarded { txif: D1 }
    );
}

/// Device and VLAN registration is bookkeeping only.
#[test]
fn vlan_registration_creates_no_entries() {
    let (engine, _driver) = setup();
    let vid = VlanId::new(100).unwrap();

    engine
        .dev_vlan_add(D1, vid, 10, fastpath_engine::TaggingMode::Tagged)
        .unwrap();
    assert_eq!(engine.brc_count(), 0);
    assert_eq!(engine.ipc_count(), 0);

    engine.dev_vlan_delete(D1, vid).unwrap();
    assert!(engine.is_bridge_interface(D2));
    assert!(!engine.is_bridge_interface(D1));
}
