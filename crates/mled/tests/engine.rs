use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mled::proto::{Ack, CueFire, CuePrepare, HEADER_SIZE, Pong, WirePayload, encode_packet};
use mled::{
    ApplyRequest, Engine, EngineConfig, EngineError, EngineEvent, EngineState, Header,
    MessageType, PatternSpec, Settings, TargetMode, Targets, build_wire_pattern,
};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

static PORT_COUNTER: AtomicU16 = AtomicU16::new(46000);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(10, Ordering::SeqCst)
}

fn quiet_config(port: u16) -> EngineConfig {
    EngineConfig {
        multicast_port: port,
        discovery_interval: Duration::ZERO,
        beacon_interval: Duration::ZERO,
        ..Default::default()
    }
}

fn capture(engine: &Engine) -> Arc<Mutex<Vec<EngineEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    engine.on_event(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

/// A node-side socket sharing the engine's port and group membership.
fn node_socket(group: Ipv4Addr, port: u16, iface: Ipv4Addr) -> UdpSocket {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).unwrap();
    socket.set_reuse_address(true).unwrap();
    socket
        .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())
        .unwrap();
    socket.join_multicast_v4(&group, &iface).unwrap();
    socket.set_multicast_if_v4(&iface).unwrap();
    socket.set_multicast_loop_v4(true).unwrap();
    socket.set_nonblocking(true).unwrap();
    UdpSocket::from_std(socket.into()).unwrap()
}

async fn recv_matching<F>(socket: &UdpSocket, timeout: Duration, mut accept: F) -> Option<Vec<u8>>
where
    F: FnMut(&Header) -> bool,
{
    let mut buffer = [0u8; 2048];
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let (len, _) = tokio::time::timeout_at(deadline, socket.recv_from(&mut buffer))
            .await
            .ok()?
            .ok()?;
        if let Ok(header) = Header::decode(&buffer[..len]) {
            if accept(&header) {
                return Some(buffer[..len].to_vec());
            }
        }
    }
}

#[test]
fn test_settings_map_onto_engine_config() {
    let settings: Settings = serde_json::from_str(
        r#"{
            "bind_ip": "eth0: 192.168.1.112",
            "multicast_group": "239.255.32.6",
            "multicast_port": 4626,
            "discovery_interval_ms": 2500,
            "offline_threshold_s": 0
        }"#,
    )
    .unwrap();
    let config = EngineConfig::from_settings(&settings);

    assert_eq!(config.bind_addr().unwrap(), Some(Ipv4Addr::new(192, 168, 1, 112)));
    assert_eq!(config.discovery_interval, Duration::from_millis(2500));

    let engine = Engine::new(config);
    assert_eq!(engine.config().offline_threshold, Duration::from_secs(30));
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test]
async fn test_apply_without_nodes_is_a_no_op() {
    let engine = Engine::new(quiet_config(next_port()));
    let pattern = build_wire_pattern(&PatternSpec::new("rainbow", 60)).unwrap();

    let result = engine
        .apply(ApplyRequest::new(Targets::All, pattern))
        .await
        .unwrap();
    assert!(result.sent_to.is_empty());
    assert!(result.failed.is_empty());

    let result = engine
        .apply(ApplyRequest::new(
            Targets::Nodes(vec!["0000BEEF".to_string()]),
            pattern,
        ))
        .await
        .unwrap();
    assert!(result.sent_to.is_empty());
    assert_eq!(result.failed, ["0000BEEF"]);
}

#[tokio::test]
async fn test_start_fails_for_unknown_interface() {
    let config = EngineConfig {
        interface: Some("mled-no-such-if0".to_string()),
        ..quiet_config(next_port())
    };
    let engine = Arc::new(Engine::new(config));

    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, EngineError::InterfaceNotFound(_)));
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a multicast-capable interface"]
async fn test_apply_prepares_then_fires() {
    let port = next_port();
    let engine = Arc::new(Engine::new(quiet_config(port)));
    let events = capture(&engine);
    engine.start().await.unwrap();
    assert_eq!(engine.state(), EngineState::Running);
    assert!(matches!(engine.start().await, Err(EngineError::AlreadyRunning)));

    let iface = engine.interface().unwrap().addr;
    let group: Ipv4Addr = engine.config().multicast_group.parse().unwrap();
    let group_addr = SocketAddr::V4(SocketAddrV4::new(group, port));
    let node = node_socket(group, port, iface);
    let node_id = 0x00C0_FFEE;

    let mut header = Header::new(MessageType::Pong);
    header.sender_id = node_id;
    let mut pong = Pong {
        rssi_dbm: -42,
        ..Default::default()
    };
    pong.set_name("bench");
    node.send_to(&encode_packet(&header, &pong).unwrap(), group_addr)
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while engine.nodes_snapshot().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(engine.nodes_snapshot()[0].name, "bench");

    let spec = PatternSpec::new("breathing", 80).with_param("color", "#00FF00");
    let result = engine
        .apply_pattern(Targets::Nodes(vec!["00c0ffee".to_string()]), &spec)
        .await
        .unwrap();
    assert_eq!(result.sent_to, ["00C0FFEE"]);
    assert!(result.failed.is_empty());
    assert_eq!(engine.pending_acks(), 1);

    let prepare = recv_matching(&node, Duration::from_secs(2), |h| {
        h.msg_type == MessageType::CuePrepare && h.target == node_id
    })
    .await
    .expect("no cue prepare");
    let prepare_header = Header::decode(&prepare).unwrap();
    assert_eq!(prepare_header.target_mode(), Some(TargetMode::Node));
    assert!(prepare_header.ack_requested());
    assert_eq!(prepare_header.epoch_id, engine.epoch_id());
    let cue = CuePrepare::decode(&prepare[HEADER_SIZE..]).unwrap();
    assert_eq!(cue.pattern, build_wire_pattern(&spec).unwrap());

    let mut fires = Vec::new();
    while fires.len() < 3 {
        let fire = recv_matching(&node, Duration::from_secs(2), |h| {
            h.msg_type == MessageType::CueFire
        })
        .await
        .expect("missing cue fire");
        let fire_header = Header::decode(&fire).unwrap();
        let payload = CueFire::decode(&fire[HEADER_SIZE..]).unwrap();
        assert_eq!(payload.cue_id, cue.cue_id);
        fires.push(fire_header.execute_at_ms);
    }
    assert!(fires.iter().all(|&at| at == fires[0]));

    let mut ack_header = Header::new(MessageType::Ack);
    ack_header.sender_id = node_id;
    let ack = Ack {
        ack_for_msg_id: prepare_header.msg_id,
        ..Default::default()
    };
    node.send_to(&encode_packet(&ack_header, &ack).unwrap(), group_addr)
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let acked = events.lock().unwrap().iter().any(|e| {
            matches!(e, EngineEvent::ApplyAck { node_id, success: true } if node_id == "00C0FFEE")
        });
        if acked {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "no apply.ack event");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(engine.pending_acks(), 0);

    engine.stop().await;
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(engine.local_addr().is_none());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a multicast-capable interface"]
async fn test_restart_releases_old_socket() {
    let old_port = next_port();
    let new_port = old_port + 1;
    let engine = Arc::new(Engine::new(quiet_config(old_port)));
    engine.start().await.unwrap();
    assert_eq!(engine.local_addr().unwrap().port(), old_port);

    engine.restart(quiet_config(new_port)).await.unwrap();
    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(engine.local_addr().unwrap().port(), new_port);

    // An exclusive bind only succeeds once nothing else holds the port.
    StdUdpSocket::bind(("0.0.0.0", old_port)).expect("old socket still bound");

    engine.stop().await;
    StdUdpSocket::bind(("0.0.0.0", new_port)).expect("socket still bound after stop");
}

/// Sockets in this network namespace bound to `port`, from the kernel table.
#[cfg(target_os = "linux")]
fn sockets_bound_to(port: u16) -> usize {
    let table = std::fs::read_to_string("/proc/net/udp").unwrap();
    let suffix = format!(":{:04X}", port);
    table
        .lines()
        .skip(1)
        .filter(|line| {
            line.split_whitespace()
                .nth(1)
                .is_some_and(|local| local.ends_with(&suffix))
        })
        .count()
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a multicast-capable interface"]
async fn test_restart_on_same_port_keeps_one_socket() {
    let port = next_port();
    let engine = Arc::new(Engine::new(quiet_config(port)));
    engine.start().await.unwrap();
    assert_eq!(sockets_bound_to(port), 1);

    for _ in 0..3 {
        engine.restart(quiet_config(port)).await.unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(sockets_bound_to(port), 1);
    }

    engine.stop().await;
    assert_eq!(sockets_bound_to(port), 0);
}

#[tokio::test]
#[ignore = "needs a multicast-capable interface"]
async fn test_send_immediately_after_start() {
    let port = next_port();
    let engine = Arc::new(Engine::new(quiet_config(port)));
    let events = capture(&engine);
    engine.start().await.unwrap();

    engine.send_ping().await.unwrap();
    engine.send_beacon().await.unwrap();
    assert_eq!(engine.stats().send_errors, 0);

    engine.stop().await;
    engine.start().await.unwrap();
    engine.send_ping().await.unwrap();

    engine.stop().await;
    assert_eq!(engine.stats().send_errors, 0);
    assert!(
        !events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, EngineEvent::Error { .. }))
    );
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a multicast-capable interface"]
async fn test_periodic_ping_and_beacon() {
    let port = next_port();
    let config = EngineConfig {
        discovery_interval: Duration::from_millis(50),
        beacon_interval: Duration::from_millis(50),
        ..quiet_config(port)
    };
    let engine = Arc::new(Engine::new(config));
    engine.start().await.unwrap();

    let iface = engine.interface().unwrap().addr;
    let group: Ipv4Addr = engine.config().multicast_group.parse().unwrap();
    let node = node_socket(group, port, iface);

    let ping = recv_matching(&node, Duration::from_secs(2), |h| h.msg_type == MessageType::Ping)
        .await
        .expect("no ping");
    let ping = Header::decode(&ping).unwrap();
    assert_eq!(ping.target_mode(), Some(TargetMode::All));
    assert_eq!(ping.payload_len, 0);

    let beacon = recv_matching(&node, Duration::from_secs(2), |h| {
        h.msg_type == MessageType::Beacon
    })
    .await
    .expect("no beacon");
    let beacon = Header::decode(&beacon).unwrap();
    assert_eq!(beacon.epoch_id, engine.epoch_id());
    assert!(beacon.execute_at_ms <= engine.show_ms());

    engine.stop().await;
    assert!(engine.stats().packets_sent >= 2);
}
