use std::net::SocketAddr;
use std::sync::Arc;

use holepunch_io::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};

use crate::error::TraversalError;
use crate::socket_helpers::{get_connected_udp_socket, resolve_udp4};
use crate::udp_traversal::interfaces::{ConfigParser, NatEventWaiter, NatProxy, PortSupplier};
use crate::udp_traversal::punch_config::PingerConfig;
use crate::udp_traversal::punch_session::PunchSession;
use crate::udp_traversal::{PingParams, ServiceType};

struct QueuedTarget {
    params: PingParams,
    dequeued: oneshot::Sender<()>,
}

/// Coordinates NAT punching for this node.
///
/// Provider side, [`Pinger::start`] runs the dispatch loop: punch requests queued with
/// [`Pinger::ping_target`] are served strictly one at a time, and every punched socket is
/// handed to the [`NatProxy`]. Consumer side, [`Pinger::ping_provider`] punches toward a
/// provider from the port registered with [`Pinger::bind_consumer_port`].
///
/// The work queue is created with the pinger and lives as long as it does. Its receiving end
/// belongs to the dispatch loop, so the loop can be started only once.
pub struct Pinger {
    ping_target_tx: mpsc::Sender<QueuedTarget>,
    ping_target_rx: Mutex<Option<mpsc::Receiver<QueuedTarget>>>,
    nat_event_waiter: Arc<dyn NatEventWaiter>,
    config_parser: Arc<dyn ConfigParser>,
    nat_proxy: Arc<dyn NatProxy>,
    port_pool: Arc<dyn PortSupplier>,
    consumer_port: Mutex<Option<u16>>,
    config: PingerConfig,
}

impl Pinger {
    /// Fails with [`TraversalError::Config`] if `config` does not validate
    pub fn new(
        nat_event_waiter: Arc<dyn NatEventWaiter>,
        config_parser: Arc<dyn ConfigParser>,
        nat_proxy: Arc<dyn NatProxy>,
        port_pool: Arc<dyn PortSupplier>,
        config: PingerConfig,
    ) -> Result<Self, TraversalError> {
        config
            .validate()
            .map_err(|err| TraversalError::Config(err.to_string()))?;

        // capacity 1 + the dequeue acknowledgement gives a rendezvous handoff
        let (ping_target_tx, ping_target_rx) = mpsc::channel(1);
        Ok(Self {
            ping_target_tx,
            ping_target_rx: Mutex::new(Some(ping_target_rx)),
            nat_event_waiter,
            config_parser,
            nat_proxy,
            port_pool,
            consumer_port: Mutex::new(None),
            config,
        })
    }

    pub fn config(&self) -> &PingerConfig {
        &self.config
    }

    /// Runs the provider-side dispatch loop for the life of the process.
    ///
    /// Returns immediately if the host's automatic port mapping succeeded, since nothing
    /// needs punching then. Failures of a single request are logged and never end the loop.
    #[cfg_attr(
        feature = "localhost-testing",
        tracing::instrument(level = "trace", target = "holepunch", skip_all)
    )]
    pub async fn start(&self) {
        log::info!(target: "holepunch", "Starting a NAT pinger");
        let ping_targets = self.ping_target_rx.lock().take();
        let Some(mut ping_targets) = ping_targets else {
            log::warn!(target: "holepunch", "{}", TraversalError::AlreadyStarted);
            return;
        };

        let event = self.nat_event_waiter.wait_for_event().await;
        if event.is_success() {
            log::info!(target: "holepunch", "NAT port mapping succeeded at stage {:?}; NAT pinger not needed", event.stage);
            return;
        }

        log::info!(target: "holepunch", "NAT port mapping unavailable ({:?}); serving punch requests", event.error);

        while let Some(QueuedTarget { params, dequeued }) = ping_targets.recv().await {
            let _ = dequeued.send(());
            log::info!(target: "holepunch", "Pinging peer with {}", String::from_utf8_lossy(&params.request_config));

            match self.handle_ping_target(params).await {
                Ok(()) => {}
                Err(err @ (TraversalError::Decode(_) | TraversalError::ProxyUnavailable(_))) => {
                    log::warn!(target: "holepunch", "Dropping punch request: {err}");
                }
                Err(err @ TraversalError::Timeout) => {
                    log::error!(target: "holepunch", "ping receiver error: {err}");
                }
                Err(err @ (TraversalError::PortPoolExhausted | TraversalError::Connect(_))) => {
                    log::error!(target: "holepunch", "failed to get connection: {err}");
                }
                Err(err) => {
                    log::error!(target: "holepunch", "Punch attempt failed: {err}");
                }
            }
        }

        log::warn!(target: "holepunch", "NAT pinger work queue closed");
    }

    /// Intentionally a no-op: the provider pinger answers punch requests for the whole
    /// process lifetime
    pub fn stop(&self) {}

    /// Queues a punch request, returning once the dispatch loop has dequeued it (not once the
    /// attempt completes). A second caller waits until the first request has been dequeued
    pub async fn ping_target(&self, params: PingParams) -> Result<(), TraversalError> {
        let (dequeued, on_dequeue) = oneshot::channel();
        self.ping_target_tx
            .send(QueuedTarget { params, dequeued })
            .await
            .map_err(|_| TraversalError::NotRunning)?;
        on_dequeue.await.map_err(|_| TraversalError::NotRunning)
    }

    /// Records the local port the consumer side punches from
    pub fn bind_consumer_port(&self, port: u16) {
        *self.consumer_port.lock() = Some(port);
    }

    /// Tells the proxy which local port punched traffic for `service_type` is redirected to
    pub fn bind_service_port(&self, service_type: ServiceType, port: u16) {
        self.nat_proxy.register_service_port(service_type, port)
    }

    /// Consumer side: punches toward a provider at `ip:port` from the bound consumer port.
    ///
    /// The socket is closed on return whatever the outcome; on success the tunnel layer can
    /// use the consumer port for a short grace window
    pub async fn ping_provider(&self, ip: &str, port: u16) -> Result<(), TraversalError> {
        log::info!(target: "holepunch", "NAT pinging to provider");
        let consumer_port = (*self.consumer_port.lock()).ok_or(TraversalError::ConsumerPortUnbound)?;

        let socket = self
            .get_connection(ip, port, consumer_port)
            .await
            .map_err(|err| {
                TraversalError::Socket(format!("unable to establish P2P path: {err}"))
            })?;

        let punched = PunchSession::new(socket, self.config.clone())?
            .execute(Some(self.config.ping_interval))
            .await?;

        // wait for provider to set up its NAT proxy connection
        tokio::time::sleep(self.config.provider_setup_grace).await;
        log::info!(target: "holepunch", "NAT punched toward provider: {punched}");

        Ok(())
    }

    async fn handle_ping_target(&self, params: PingParams) -> Result<(), TraversalError> {
        let target = self.config_parser.parse(&params.request_config)?;

        if !self.nat_proxy.is_available(&target.service_type) {
            return Err(TraversalError::ProxyUnavailable(target.service_type));
        }

        log::info!(target: "holepunch", "ping target received: {target}");
        if target.port == 0 {
            // the peer did not send a port to ping toward; it is expected to initiate instead
            log::info!(target: "holepunch", "No remote port for {}; waiting for the peer to punch", target.service_type);
            return Ok(());
        }

        let local_port = if params.port == 0 {
            self.port_pool.acquire()?
        } else {
            params.port
        };

        let socket = self
            .get_connection(&target.ip, target.port, local_port)
            .await
            .map_err(|err| TraversalError::Connect(err.to_string()))?;
        let punched = PunchSession::new(socket, self.config.clone())?
            .execute(None)
            .await?;

        log::info!(target: "holepunch", "ping received, waiting for a new connection on {punched}");
        self.nat_proxy.hand_off(target.service_type, punched);
        Ok(())
    }

    async fn get_connection(
        &self,
        ip: &str,
        port: u16,
        local_port: u16,
    ) -> Result<UdpSocket, TraversalError> {
        let remote: SocketAddr = resolve_udp4(ip, port).await?;
        log::info!(target: "holepunch", "remote socket: {remote}");

        let socket = get_connected_udp_socket(local_port, remote).await?;
        log::info!(target: "holepunch", "local socket: {}", socket.local_addr()?);

        Ok(socket)
    }
}
