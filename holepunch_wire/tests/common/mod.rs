#![allow(dead_code)]

use async_trait::async_trait;
use holepunch_io::Mutex;
use holepunch_wire::error::TraversalError;
use holepunch_wire::port_pool::PortPool;
use holepunch_wire::session_descriptor::JsonConfigParser;
use holepunch_wire::udp_traversal::interfaces::{
    ConfigParser, NatEvent, NatEventWaiter, NatProxy, PortSupplier, SessionTarget,
};
use holepunch_wire::udp_traversal::punch_config::PingerConfig;
use holepunch_wire::udp_traversal::punched_socket::PunchedUdpSocket;
use holepunch_wire::udp_traversal::ServiceType;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

pub fn fast_config() -> PingerConfig {
    PingerConfig {
        ping_interval: Duration::from_millis(20),
        ping_timeout: Duration::from_millis(300),
        success_hold: Duration::from_millis(40),
        provider_setup_grace: Duration::from_millis(20),
        ..Default::default()
    }
}

pub fn descriptor(ip: &str, port: u16, service_type: &str) -> Vec<u8> {
    JsonConfigParser::encode(&SessionTarget {
        ip: ip.to_string(),
        port,
        service_type: service_type.into(),
    })
    .unwrap()
}

pub struct FixedEventWaiter(pub NatEvent);

#[async_trait]
impl NatEventWaiter for FixedEventWaiter {
    async fn wait_for_event(&self) -> NatEvent {
        self.0.clone()
    }
}

/// Decodes JSON and records when each descriptor was parsed
#[derive(Default)]
pub struct RecordingParser {
    pub parsed: Mutex<Vec<(Instant, Vec<u8>)>>,
}

impl ConfigParser for RecordingParser {
    fn parse(&self, config: &[u8]) -> Result<SessionTarget, TraversalError> {
        self.parsed.lock().push((Instant::now(), config.to_vec()));
        JsonConfigParser.parse(config)
    }
}

pub struct RecordingProxy {
    pub available: bool,
    pub availability_checks: AtomicUsize,
    pub registered: Mutex<Vec<(ServiceType, u16)>>,
    handoffs: UnboundedSender<(ServiceType, PunchedUdpSocket)>,
}

impl RecordingProxy {
    pub fn new(available: bool) -> (Self, UnboundedReceiver<(ServiceType, PunchedUdpSocket)>) {
        let (handoffs, rx) = unbounded_channel();
        (
            Self {
                available,
                availability_checks: AtomicUsize::new(0),
                registered: Mutex::new(Vec::new()),
                handoffs,
            },
            rx,
        )
    }

    pub fn checks(&self) -> usize {
        self.availability_checks.load(Ordering::SeqCst)
    }
}

impl NatProxy for RecordingProxy {
    fn hand_off(&self, service_type: ServiceType, socket: PunchedUdpSocket) {
        let _ = self.handoffs.send((service_type, socket));
    }

    fn register_service_port(&self, service_type: ServiceType, port: u16) {
        self.registered.lock().push((service_type, port));
    }

    fn is_available(&self, _service_type: &ServiceType) -> bool {
        self.availability_checks.fetch_add(1, Ordering::SeqCst);
        self.available
    }
}

#[derive(Default)]
pub struct CountingPorts {
    pub acquired: AtomicUsize,
    pool: PortPool,
}

impl CountingPorts {
    pub fn count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

impl PortSupplier for CountingPorts {
    fn acquire(&self) -> Result<u16, TraversalError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.pool.acquire()
    }
}
