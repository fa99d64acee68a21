use std::net::Ipv4Addr;
use std::sync::Arc;

use mvirt_stub::frame::{build_ipv4_frame, build_ipv4_packet};
use mvirt_stub::host::memory::HostEvent;
use mvirt_stub::host::{
    DeviceDirectory, DeviceId, HeaderOps, LinkHeader, LinkParams, NetDeviceOps, PacketTransport,
};
use mvirt_stub::neighbor::{AddressFamily, NeighOutput, NeighParms, NudState};
use mvirt_stub::{
    Classification, Delivery, ErrorKind, Frame, Match, MemoryHost, StubConfig, StubRegistry,
    TxStats,
};
use smoltcp::wire::{EthernetAddress, EthernetFrame, EthernetProtocol, Ipv4Packet};

const UPLINK_MAC: EthernetAddress = EthernetAddress([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);
const GATEWAY_MAC: EthernetAddress = EthernetAddress([0x52, 0x54, 0x00, 0x65, 0x43, 0x21]);

/// Host with an addressed, running `eth0` and `count` stubs on it.
fn setup(count: usize, delivery: Delivery) -> (Arc<MemoryHost>, StubRegistry<MemoryHost>) {
    let _ = tracing_subscriber::fmt::try_init();

    let host = Arc::new(MemoryHost::new());
    let eth0 = host.add_ethernet("eth0", UPLINK_MAC).unwrap();
    host.add_address(eth0, "10.0.0.1/24".parse().unwrap());
    host.set_admin_state(eth0, true);

    let config = StubConfig::new("eth0")
        .count(count)
        .debug(true)
        .delivery(delivery);
    let registry = StubRegistry::initialize(config, host.clone()).unwrap();
    (host, registry)
}

fn bring_up(host: &MemoryHost, id: DeviceId, addr: &str) {
    host.add_address(id, addr.parse().unwrap());
    host.set_admin_state(id, true);
}

#[test]
fn test_transmit_on_stub_reaches_uplink() {
    let (host, registry) = setup(2, Delivery::Discard);
    let stub0 = registry.device_id(0).unwrap();
    bring_up(&host, stub0, "10.0.0.7/24");

    let packet = build_ipv4_packet(
        Ipv4Addr::new(10, 0, 0, 7),
        Ipv4Addr::new(10, 0, 0, 1),
        b"hello",
    );
    let len = packet.len();
    host.queue_xmit(Frame::from_ipv4(stub0, packet));

    let sent = host.take_transmitted();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].dev(), registry.uplink().id());
    assert_eq!(sent[0].len(), len);

    let stub = registry.endpoint(0).unwrap();
    assert!(stub.is_up());
    assert_eq!(
        stub.stats(),
        TxStats {
            packets: 1,
            bytes: len as u64
        }
    );
    assert_eq!(registry.endpoint(1).unwrap().stats(), TxStats::default());
}

#[test]
fn test_header_built_by_uplink() {
    let (host, registry) = setup(1, Delivery::Discard);
    let stub0 = registry.device_id(0).unwrap();
    let stub = registry.endpoint(0).unwrap();

    let payload = build_ipv4_packet(
        Ipv4Addr::new(10, 0, 0, 7),
        Ipv4Addr::new(10, 0, 0, 254),
        b"ping",
    );
    let mut frame = Frame::from_ipv4(stub0, payload);
    let header = LinkHeader {
        ethertype: EthernetProtocol::Ipv4,
        dst: Some(GATEWAY_MAC),
        src: None,
        len: frame.len(),
    };

    let ops = stub.header_ops().unwrap();
    assert_eq!(ops.create(&mut frame, &header), Ok(14));
    assert_eq!(frame.dev(), stub0);

    host.queue_xmit(frame);
    let sent = host.take_transmitted();
    assert_eq!(sent.len(), 1);

    let eth = EthernetFrame::new_checked(sent[0].data()).unwrap();
    assert_eq!(eth.src_addr(), UPLINK_MAC);
    assert_eq!(eth.dst_addr(), GATEWAY_MAC);
    assert_eq!(eth.ethertype(), EthernetProtocol::Ipv4);
    let ip = Ipv4Packet::new_checked(eth.payload()).unwrap();
    assert_eq!(ip.dst_addr(), Ipv4Addr::new(10, 0, 0, 254));
}

#[test]
fn test_unresolved_header_then_rebuild() {
    let (_host, registry) = setup(1, Delivery::Discard);
    let stub0 = registry.device_id(0).unwrap();
    let stub = registry.endpoint(0).unwrap();

    let mut frame = Frame::new(stub0, vec![0u8; 20]);
    let header = LinkHeader {
        ethertype: EthernetProtocol::Ipv4,
        dst: None,
        src: None,
        len: 20,
    };

    assert!(stub.create(&mut frame, &header).is_err());
    assert_eq!(frame.dev(), stub0);
    assert!(stub.rebuild(&mut frame).is_err());
    assert_eq!(frame.dev(), stub0);
}

#[test]
fn test_inbound_classification() {
    let (host, registry) = setup(2, Delivery::Forward);
    let stub0 = registry.device_id(0).unwrap();
    let stub1 = registry.device_id(1).unwrap();
    bring_up(&host, stub0, "10.0.0.7/24");
    bring_up(&host, stub1, "10.0.1.7/24");

    let classifier = registry.classifier();
    let uplink = registry.uplink();
    let classify = |dst: Ipv4Addr| {
        let data = build_ipv4_frame(
            UPLINK_MAC,
            GATEWAY_MAC,
            Ipv4Addr::new(192, 0, 2, 1),
            dst,
            b"x",
        );
        classifier.receive(Frame::from_ethernet(uplink.id(), data))
    };

    assert_eq!(
        classify(Ipv4Addr::new(10, 0, 0, 7)),
        Classification::Owned {
            device: stub0,
            name: "stub0".to_string(),
            matched: Match::Exact,
        }
    );

    // eth0 and stub0 share the subnet; stub0 comes later in the table.
    let outcome = classify(Ipv4Addr::new(10, 0, 0, 99));
    assert_eq!(outcome.owner(), Some(stub0));
    assert!(matches!(
        outcome,
        Classification::Owned {
            matched: Match::Subnet,
            ..
        }
    ));

    assert_eq!(classify(Ipv4Addr::new(10, 0, 1, 7)).owner(), Some(stub1));
    assert_eq!(classify(Ipv4Addr::new(10, 0, 0, 1)).owner(), Some(uplink.id()));
    assert_eq!(classify(Ipv4Addr::new(8, 8, 8, 8)), Classification::Unclaimed);

    let delivered: Vec<_> = host.take_delivered().iter().map(Frame::dev).collect();
    assert_eq!(delivered, vec![stub0, stub0, stub1, uplink.id()]);
}

#[test]
fn test_stub_neighbours_never_solicit() {
    let (host, registry) = setup(1, Delivery::Discard);
    let stub0 = registry.device_id(0).unwrap();
    let eth0 = registry.uplink().id();
    let gateway = Ipv4Addr::new(10, 0, 0, 254);

    let (n, solicitations) = host.neighbour_lookup(stub0, gateway).unwrap();
    assert!(n.is_degraded());
    assert_eq!(n.state, NudState::None);
    assert_eq!(n.output, NeighOutput::Direct);
    assert_eq!(solicitations, 0);

    let (n, solicitations) = host.neighbour_lookup(eth0, gateway).unwrap();
    assert!(!n.is_degraded());
    assert_eq!(n.state, NudState::Incomplete);
    assert_eq!(solicitations, 6);
}

#[test]
fn test_stub_ignores_ipv6_neighbour_parms() {
    let (_host, registry) = setup(1, Delivery::Discard);
    let stub = registry.endpoint(0).unwrap();

    let mut v6 = NeighParms::new(AddressFamily::Inet6);
    stub.neigh_setup(&mut v6);
    assert!(v6.neigh_setup.is_none());
}

#[test]
fn test_stub_header_ops_visible_through_directory() {
    let (host, registry) = setup(1, Delivery::Discard);
    let stub0 = registry.device_id(0).unwrap();

    let link = host.link_by_name("stub0").unwrap();
    assert_eq!(link.id, stub0);
    let ops = link.header_ops.expect("stub exposes header ops");

    let mut frame = Frame::new(stub0, vec![0u8; 20]);
    let header = LinkHeader {
        ethertype: EthernetProtocol::Ipv4,
        dst: Some(GATEWAY_MAC),
        src: None,
        len: 20,
    };
    assert_eq!(ops.create(&mut frame, &header), Ok(14));
    assert_eq!(frame.dev(), stub0);

    let eth = EthernetFrame::new_checked(frame.data()).unwrap();
    assert_eq!(eth.src_addr(), UPLINK_MAC);
    assert_eq!(eth.dst_addr(), GATEWAY_MAC);
}

#[test]
fn test_registry_stacked_on_stub() {
    let (host, lower) = setup(1, Delivery::Discard);
    let stub0 = lower.device_id(0).unwrap();

    let config = StubConfig::new("stub0").name_prefix("vstub");
    let upper = StubRegistry::initialize(config, host.clone()).unwrap();
    let vstub0 = upper.device_id(0).unwrap();
    assert_eq!(upper.uplink().id(), stub0);
    assert!(upper.uplink().header_ops().is_some());

    let mut frame = Frame::new(vstub0, vec![0u8; 20]);
    let header = LinkHeader {
        ethertype: EthernetProtocol::Ipv4,
        dst: Some(GATEWAY_MAC),
        src: None,
        len: 20,
    };
    let stub = upper.endpoint(0).unwrap();
    assert_eq!(stub.create(&mut frame, &header), Ok(14));
    assert_eq!(frame.dev(), vstub0);
    let eth = EthernetFrame::new_checked(frame.data()).unwrap();
    assert_eq!(eth.src_addr(), UPLINK_MAC);

    // Transmit walks vstub0 -> stub0 -> eth0.
    let len = frame.len();
    host.queue_xmit(frame);
    let sent = host.take_transmitted();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].dev(), lower.uplink().id());
    assert_eq!(stub.stats().packets, 1);
    assert_eq!(lower.endpoint(0).unwrap().stats().bytes, len as u64);
}

#[test]
fn test_stub_link_params() {
    let (host, registry) = setup(2, Delivery::Discard);
    for index in 0..2 {
        let params = host.link_params(registry.device_id(index).unwrap()).unwrap();
        assert_eq!(params, LinkParams::ETHERNET);
        assert_eq!(params.mtu, 1500);
        assert_eq!(params.header_len, 14);
        assert_eq!(params.tx_queue_len, 1000);
        assert_eq!(params.broadcast, EthernetAddress::BROADCAST);
    }
}

#[test]
fn test_mac_change_visible_to_host() {
    let (host, registry) = setup(1, Delivery::Discard);
    let stub = registry.endpoint(0).unwrap();

    let mac = EthernetAddress([0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0xee]);
    stub.set_mac_address(mac).unwrap();
    assert_eq!(host.link_by_name("stub0").unwrap().hw_addr, mac);

    let err = stub
        .set_mac_address(EthernetAddress::BROADCAST)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AddressAssignment);
    assert_eq!(host.link_by_name("stub0").unwrap().hw_addr, mac);
}

#[test]
fn test_lifecycle() {
    let (host, registry) = setup(3, Delivery::Discard);
    assert_eq!(host.len(), 4);
    let ids: Vec<_> = (0..3).map(|i| registry.device_id(i).unwrap()).collect();
    host.set_admin_state(ids[2], true);

    registry.shutdown();
    assert_eq!(host.len(), 1);
    assert!(host.device_by_name("eth0").is_some());

    let removed: Vec<_> = host
        .events()
        .into_iter()
        .filter_map(|event| match event {
            HostEvent::Unregistered { id, .. } => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(removed, ids);
}

#[test]
fn test_missing_uplink() {
    let _ = tracing_subscriber::fmt::try_init();

    let host = Arc::new(MemoryHost::new());
    let err = StubRegistry::initialize(StubConfig::new("eth0"), host.clone())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(host.is_empty());
}
