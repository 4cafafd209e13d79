use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use holepunch_io::ScopedTask;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use crate::error::TraversalError;
use crate::udp_traversal::punch_config::PingerConfig;
use crate::udp_traversal::punched_socket::PunchedUdpSocket;
use crate::udp_traversal::{PunchId, PunchState};

/// Every punch packet starts with this marker. Receivers never look at it; relays use it to
/// drop punch packets that arrive after handoff
pub const PUNCH_MARKER: &[u8] = b"continuously pinging to ";

pub fn punch_payload(remote: SocketAddr) -> Vec<u8> {
    let mut payload = PUNCH_MARKER.to_vec();
    payload.extend_from_slice(remote.to_string().as_bytes());
    payload
}

pub fn is_punch_payload(packet: &[u8]) -> bool {
    packet.starts_with(PUNCH_MARKER)
}

/// The TTL schedule of the sender: `1, 2, .., ramp_limit`, then `traversed_ttl` forever.
///
/// Low TTLs expire at routers close to the sender, opening NAT/firewall state hop by hop
/// without flooding the peer's access network. After a few rounds the path is assumed
/// traversed.
#[derive(Clone, Debug)]
pub struct TtlRamp {
    next: u32,
    ramp_limit: u32,
    traversed_ttl: u32,
}

impl TtlRamp {
    pub fn new(ramp_limit: u32, traversed_ttl: u32) -> Self {
        Self {
            next: 1,
            ramp_limit,
            traversed_ttl,
        }
    }
}

impl Iterator for TtlRamp {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.ramp_limit {
            return Some(self.traversed_ttl);
        }

        let ttl = self.next;
        self.next += 1;
        Some(ttl)
    }
}

/// One punch attempt bound to a single connected UDP socket.
///
/// A sender task writes a punch packet every `ping_interval`, ramping the TTL, while the
/// receiver waits for the first datagram from the peer or the `ping_timeout` deadline.
/// Either way the receiver cancels the sender exactly once and the sender is joined before
/// the socket leaves the session, so a handed-off socket is never written to by the sender
/// again. On failure the socket is closed when the session is dropped.
pub struct PunchSession {
    id: PunchId,
    socket: Arc<UdpSocket>,
    remote_addr: SocketAddr,
    config: PingerConfig,
    state: watch::Sender<PunchState>,
}

impl PunchSession {
    /// `socket` must already be connected to the peer
    pub fn new(socket: UdpSocket, config: PingerConfig) -> Result<Self, TraversalError> {
        config
            .validate()
            .map_err(|err| TraversalError::Config(err.to_string()))?;
        let remote_addr = socket.peer_addr()?;
        let (state, _) = watch::channel(PunchState::Idle);
        Ok(Self {
            id: PunchId::new(),
            socket: Arc::new(socket),
            remote_addr,
            config,
            state,
        })
    }

    pub fn id(&self) -> PunchId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PunchState> {
        self.state.subscribe()
    }

    /// Runs the send/receive race. `head_start` delays the first read (the sender starts
    /// immediately) to give the peer's responder time to come up
    #[cfg_attr(
        feature = "localhost-testing",
        tracing::instrument(level = "trace", target = "holepunch", skip_all, ret, err(Debug))
    )]
    pub async fn execute(
        self,
        head_start: Option<Duration>,
    ) -> Result<PunchedUdpSocket, TraversalError> {
        let Self {
            id,
            socket,
            remote_addr,
            config,
            state,
        } = self;

        let default_ttl = socket.ttl().ok();
        log::trace!(target: "holepunch", "[{id}] Default TTL: {:?}", default_ttl);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        state.send_replace(PunchState::Punching);
        let sender = ScopedTask::spawn(send_punches(
            socket.clone(),
            remote_addr,
            config.clone(),
            id,
            cancel_rx,
        ));

        if let Some(head_start) = head_start {
            tokio::time::sleep(head_start).await;
        }

        let res = receive_until(&socket, &config, id, cancel_tx).await;

        match sender.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                log::warn!(target: "holepunch", "[{id}] Error while pinging: {err}");
            }
            Err(err) => {
                log::warn!(target: "holepunch", "[{id}] Punch sender did not finish cleanly: {err}");
            }
        }

        if let Some(default_ttl) = default_ttl {
            if let Err(err) = socket.set_ttl(default_ttl) {
                log::warn!(target: "holepunch", "[{id}] Unable to restore TTL {default_ttl}: {err}");
            }
        }

        match res {
            Ok(()) => {
                state.send_replace(PunchState::Succeeded);
                let socket = Arc::try_unwrap(socket).map_err(|_| {
                    TraversalError::Socket("punch socket still shared after sender exit".into())
                })?;
                Ok(PunchedUdpSocket::new(id, socket)?)
            }

            Err(err) => {
                state.send_replace(PunchState::TimedOut);
                Err(err)
            }
        }
    }
}

/// Writes punch packets until cancelled. Only TTL and write failures end it early
async fn send_punches(
    socket: Arc<UdpSocket>,
    remote_addr: SocketAddr,
    config: PingerConfig,
    id: PunchId,
    mut cancelled: oneshot::Receiver<()>,
) -> Result<(), TraversalError> {
    let payload = punch_payload(remote_addr);
    let mut ttls = config.ttl_ramp();

    loop {
        tokio::select! {
            biased;

            _ = &mut cancelled => {
                log::trace!(target: "holepunch", "[{id}] Punch sender cancelled");
                return Ok(());
            }

            _ = tokio::time::sleep(config.ping_interval) => {
                let ttl = ttls.next().unwrap_or(config.traversed_ttl);
                socket.set_ttl(ttl).map_err(|err| {
                    TraversalError::Socket(format!("pinger setting ttl failed: {err}"))
                })?;

                log::trace!(target: "holepunch", "[{id}] pinging {remote_addr} with TTL={ttl}");
                match socket.send(&payload).await {
                    Ok(_) => {}
                    // deferred ICMP unreachable from an earlier packet. Nothing was sent this tick
                    Err(err) if err.kind() == ErrorKind::ConnectionRefused => {
                        log::trace!(target: "holepunch", "[{id}] {remote_addr} unreachable so far: {err}");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }
}

/// Waits for the first datagram or the deadline. Signals `cancel` exactly once before returning
async fn receive_until(
    socket: &UdpSocket,
    config: &PingerConfig,
    id: PunchId,
    cancel: oneshot::Sender<()>,
) -> Result<(), TraversalError> {
    let deadline = Instant::now() + config.ping_timeout;
    let mut buf = vec![0u8; config.read_buffer];

    loop {
        match tokio::time::timeout_at(deadline, socket.recv(&mut buf)).await {
            Err(_) => {
                let _ = cancel.send(());
                return Err(TraversalError::Timeout);
            }

            Ok(Err(err)) => {
                log::error!(target: "holepunch", "[{id}] Failed to read remote peer: {:?} cause: {err}", socket.peer_addr().ok());
                let retry_at = std::cmp::min(Instant::now() + config.ping_interval, deadline);
                tokio::time::sleep_until(retry_at).await;
            }

            Ok(Ok(len)) => {
                log::info!(target: "holepunch", "[{id}] remote peer data received ({len} bytes)");
                // keep punching a little longer so that the peer's in-flight pings land and
                // its NAT state opens in the reverse direction too
                tokio::time::sleep(config.success_hold).await;
                let _ = cancel.send(());
                return Ok(());
            }
        }
    }
}
