use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use holepunch_io::tokio_util::sync::CancellationToken;
use holepunch_io::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::TraversalError;
use crate::socket_helpers::get_udp_socket;
use crate::udp_traversal::interfaces::NatProxy;
use crate::udp_traversal::punch_session::is_punch_payload;
use crate::udp_traversal::punched_socket::PunchedUdpSocket;
use crate::udp_traversal::ServiceType;

const MAX_DATAGRAM: usize = 65535;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// A relay with no traffic in either direction for this long is torn down
    #[serde(with = "serde_millis")]
    pub idle_timeout: Duration,
    /// Address the local services listen on
    pub service_ip: IpAddr,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            service_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

/// A [`NatProxy`] that forwards datagrams between a punched socket and the local port the
/// service registered, so the service sees punched traffic as ordinary local traffic.
///
/// Punch packets still arriving from the peer after handoff are dropped, never forwarded.
pub struct UdpRelayProxy {
    service_ports: RwLock<HashMap<ServiceType, u16>>,
    config: RelayConfig,
    shutdown: CancellationToken,
    active_relays: Arc<AtomicUsize>,
}

impl UdpRelayProxy {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            service_ports: RwLock::new(HashMap::new()),
            config,
            shutdown: CancellationToken::new(),
            active_relays: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_relays(&self) -> usize {
        self.active_relays.load(Ordering::SeqCst)
    }

    /// Stops every running relay. Sockets are closed as the relays exit
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Default for UdpRelayProxy {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl Drop for UdpRelayProxy {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl NatProxy for UdpRelayProxy {
    fn hand_off(&self, service_type: ServiceType, socket: PunchedUdpSocket) {
        let Some(port) = self.service_ports.read().get(&service_type).copied() else {
            log::warn!(target: "holepunch", "No service port registered for {service_type}; closing {socket}");
            return;
        };

        let service_addr = SocketAddr::new(self.config.service_ip, port);
        log::info!(target: "holepunch", "Handing off {socket} to {service_type} @ {service_addr}");

        let guard = RelayGuard::new(self.active_relays.clone());
        let idle_timeout = self.config.idle_timeout;
        let shutdown = self.shutdown.child_token();
        holepunch_io::spawn(async move {
            let _guard = guard;
            if let Err(err) = relay(socket, service_addr, idle_timeout, shutdown).await {
                log::warn!(target: "holepunch", "{service_type} relay ended with error: {err}");
            }
        });
    }

    fn register_service_port(&self, service_type: ServiceType, port: u16) {
        log::info!(target: "holepunch", "Registered {service_type} service port {port}");
        self.service_ports.write().insert(service_type, port);
    }

    fn is_available(&self, service_type: &ServiceType) -> bool {
        self.service_ports.read().contains_key(service_type)
    }
}

struct RelayGuard(Arc<AtomicUsize>);

impl RelayGuard {
    fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn relay(
    punched: PunchedUdpSocket,
    service_addr: SocketAddr,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<(), TraversalError> {
    let stale = punched.cleanse()?;
    if stale > 0 {
        log::trace!(target: "holepunch", "Dropped {stale} queued datagrams before relaying {punched}");
    }

    let bind_ip = if service_addr.is_ipv4() {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    } else {
        IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
    };
    let service = get_udp_socket(SocketAddr::new(bind_ip, 0))?;
    service.connect(service_addr).await?;

    let mut from_peer = vec![0u8; MAX_DATAGRAM];
    let mut from_service = vec![0u8; MAX_DATAGRAM];
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::trace!(target: "holepunch", "Relay for {punched} shut down");
                return Ok(());
            }

            _ = tokio::time::sleep_until(last_activity + idle_timeout) => {
                log::info!(target: "holepunch", "Relay for {punched} idle for {idle_timeout:?}; closing");
                return Ok(());
            }

            res = punched.recv(&mut from_peer) => {
                let len = match res {
                    Ok(len) => len,
                    Err(err) if err.kind() == ErrorKind::ConnectionRefused => continue,
                    Err(err) => return Err(err.into()),
                };

                last_activity = Instant::now();
                if is_punch_payload(&from_peer[..len]) {
                    log::trace!(target: "holepunch", "Dropping late punch packet on {punched}");
                    continue;
                }

                if let Err(err) = service.send(&from_peer[..len]).await {
                    log::warn!(target: "holepunch", "Unable to forward to service {service_addr}: {err}");
                }
            }

            res = service.recv(&mut from_service) => {
                let len = match res {
                    Ok(len) => len,
                    Err(err) if err.kind() == ErrorKind::ConnectionRefused => continue,
                    Err(err) => return Err(err.into()),
                };

                last_activity = Instant::now();
                punched.send(&from_service[..len]).await?;
            }
        }
    }
}
