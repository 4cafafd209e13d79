mod common;

use common::*;
use holepunch_wire::error::TraversalError;
use holepunch_wire::socket_helpers::get_udp_socket;
use holepunch_wire::udp_traversal::interfaces::NatEvent;
use holepunch_wire::udp_traversal::pinger::Pinger;
use holepunch_wire::udp_traversal::punch_config::PingerConfig;
use holepunch_wire::udp_traversal::punched_socket::PunchedUdpSocket;
use holepunch_wire::udp_traversal::{PingParams, ServiceType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

struct Harness {
    pinger: Arc<Pinger>,
    parser: Arc<RecordingParser>,
    proxy: Arc<RecordingProxy>,
    ports: Arc<CountingPorts>,
    handoffs: UnboundedReceiver<(ServiceType, PunchedUdpSocket)>,
}

fn harness(event: NatEvent, proxy_available: bool, config: PingerConfig) -> Harness {
    let parser = Arc::new(RecordingParser::default());
    let (proxy, handoffs) = RecordingProxy::new(proxy_available);
    let proxy = Arc::new(proxy);
    let ports = Arc::new(CountingPorts::default());
    let pinger = Pinger::new(
        Arc::new(FixedEventWaiter(event)),
        parser.clone(),
        proxy.clone(),
        ports.clone(),
        config,
    )
    .expect("valid config");

    Harness {
        pinger: Arc::new(pinger),
        parser,
        proxy,
        ports,
        handoffs,
    }
}

fn spawn_dispatch(pinger: &Arc<Pinger>) -> tokio::task::JoinHandle<()> {
    let pinger = pinger.clone();
    tokio::spawn(async move { pinger.start().await })
}

fn mapping_failed() -> NatEvent {
    NatEvent::failure("port_mapping", "no gateway")
}

#[tokio::test]
async fn port_mapping_success_skips_punching() {
    holepunch_logging::setup_log();
    let h = harness(NatEvent::success("port_mapping"), true, fast_config());

    tokio::time::timeout(Duration::from_secs(1), h.pinger.start())
        .await
        .expect("pinger should return right away");

    let res = h
        .pinger
        .ping_target(PingParams::new(descriptor("127.0.0.1", 5000, "wireguard"), 0))
        .await;
    assert!(matches!(res, Err(TraversalError::NotRunning)));
    assert!(h.parser.parsed.lock().is_empty());
}

#[tokio::test]
async fn wireguard_request_is_punched_and_handed_off() -> Result<(), anyhow::Error> {
    holepunch_logging::setup_log();
    let config = PingerConfig::default();
    let mut h = harness(mapping_failed(), true, config.clone());
    let _dispatch = spawn_dispatch(&h.pinger);

    let peer = get_udp_socket("127.0.0.1:0")?;
    let peer_addr = peer.local_addr()?;
    let start = Instant::now();
    h.pinger
        .ping_target(PingParams::new(
            descriptor("127.0.0.1", peer_addr.port(), "wireguard"),
            0,
        ))
        .await?;

    // the simulated peer answers at t=600ms
    let buf = &mut [0u8; 512];
    let (_, punch_source) = peer.recv_from(buf).await?;
    tokio::time::sleep_until(start + Duration::from_millis(600)).await;
    peer.send_to(b"pong", punch_source).await?;
    let replied_at = Instant::now();

    let (service_type, punched) =
        tokio::time::timeout(Duration::from_secs(3), h.handoffs.recv())
            .await?
            .expect("handoff");
    assert!(replied_at.elapsed() >= config.success_hold);
    assert_eq!(service_type, ServiceType::from("wireguard"));
    assert_eq!(punched.remote_addr, peer_addr);
    assert_eq!(punched.local_addr()?.port(), punch_source.port());
    assert_eq!(h.ports.count(), 1);
    Ok(())
}

#[tokio::test]
async fn unavailable_proxy_opens_no_socket() -> Result<(), anyhow::Error> {
    holepunch_logging::setup_log();
    let mut h = harness(mapping_failed(), false, fast_config());
    let _dispatch = spawn_dispatch(&h.pinger);

    let peer = get_udp_socket("127.0.0.1:0")?;
    h.pinger
        .ping_target(PingParams::new(
            descriptor("127.0.0.1", peer.local_addr()?.port(), "wireguard"),
            0,
        ))
        .await?;

    let buf = &mut [0u8; 512];
    assert!(tokio::time::timeout(Duration::from_millis(300), peer.recv_from(buf))
        .await
        .is_err());
    assert!(h.handoffs.try_recv().is_err());
    assert_eq!(h.ports.count(), 0);
    assert_eq!(h.proxy.checks(), 1);
    Ok(())
}

#[tokio::test]
async fn decode_failure_drops_request() -> Result<(), anyhow::Error> {
    holepunch_logging::setup_log();
    let h = harness(mapping_failed(), true, fast_config());
    let _dispatch = spawn_dispatch(&h.pinger);

    h.pinger
        .ping_target(PingParams::new(&b"{garbage"[..], 0))
        .await?;
    // a portless request behind it is still served
    h.pinger
        .ping_target(PingParams::new(descriptor("", 0, "wireguard"), 0))
        .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.parser.parsed.lock().len(), 2);
    assert_eq!(h.proxy.checks(), 1);
    Ok(())
}

#[tokio::test]
async fn zero_remote_port_opens_no_socket() -> Result<(), anyhow::Error> {
    holepunch_logging::setup_log();
    let mut h = harness(mapping_failed(), true, fast_config());
    let _dispatch = spawn_dispatch(&h.pinger);

    h.pinger
        .ping_target(PingParams::new(descriptor("127.0.0.1", 0, "wireguard"), 0))
        .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.proxy.checks(), 1);
    assert_eq!(h.ports.count(), 0);
    assert!(h.handoffs.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn requests_are_served_one_at_a_time() -> Result<(), anyhow::Error> {
    holepunch_logging::setup_log();
    let config = fast_config();
    let mut h = harness(mapping_failed(), true, config.clone());
    let _dispatch = spawn_dispatch(&h.pinger);

    // neither peer ever answers, so each attempt runs until its deadline
    let peer_a = get_udp_socket("127.0.0.1:0")?;
    let peer_b = get_udp_socket("127.0.0.1:0")?;
    let a = PingParams::new(
        descriptor("127.0.0.1", peer_a.local_addr()?.port(), "wireguard"),
        0,
    );
    let b = PingParams::new(
        descriptor("127.0.0.1", peer_b.local_addr()?.port(), "wireguard"),
        0,
    );

    h.pinger.ping_target(a.clone()).await?;
    h.pinger.ping_target(b.clone()).await?;
    let b_dequeued = Instant::now();

    tokio::time::sleep(config.ping_timeout + Duration::from_millis(200)).await;

    let parsed = h.parser.parsed.lock().clone();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].1, a.request_config);
    assert_eq!(parsed[1].1, b.request_config);
    assert!(parsed[1].0 - parsed[0].0 >= config.ping_timeout);
    assert!(b_dequeued - parsed[0].0 >= config.ping_timeout);
    assert!(h.handoffs.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn dispatch_loop_starts_once() {
    holepunch_logging::setup_log();
    let h = harness(mapping_failed(), true, fast_config());
    let _dispatch = spawn_dispatch(&h.pinger);
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(1), h.pinger.start())
        .await
        .expect("second start should return right away");

    // the first loop is still serving
    h.pinger
        .ping_target(PingParams::new(descriptor("", 0, "wireguard"), 0))
        .await
        .unwrap();
}

#[tokio::test]
async fn service_port_binding_reaches_proxy() {
    holepunch_logging::setup_log();
    let h = harness(mapping_failed(), true, fast_config());
    h.pinger.bind_service_port("wireguard".into(), 51820);
    assert_eq!(
        h.proxy.registered.lock().clone(),
        vec![(ServiceType::from("wireguard"), 51820)]
    );
    h.pinger.stop();
}
