use crate::udp_traversal::PunchId;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// A UDP socket, connected to the peer, through which a hole has been punched
#[derive(Debug)]
pub struct PunchedUdpSocket {
    pub id: PunchId,
    pub(crate) socket: UdpSocket,
    pub remote_addr: SocketAddr,
}

impl PunchedUdpSocket {
    pub(crate) fn new(id: PunchId, socket: UdpSocket) -> std::io::Result<Self> {
        let remote_addr = socket.peer_addr()?;
        Ok(Self {
            id,
            socket,
            remote_addr,
        })
    }

    pub async fn send(&self, buf: &[u8]) -> std::io::Result<usize> {
        log::trace!(target: "holepunch", "Sending {} bytes to {}", buf.len(), self.remote_addr);
        tokio::time::timeout(Duration::from_secs(2), self.socket.send(buf))
            .await
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::TimedOut, err.to_string()))?
    }

    pub async fn recv(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.socket.recv(buf).await
    }

    /// Discards every datagram already queued on the socket, returning how many were dropped.
    /// The peer's last punch packets may still be queued right after the attempt succeeds
    pub fn cleanse(&self) -> std::io::Result<usize> {
        let buf = &mut [0u8; 4096];
        let mut dropped = 0;
        loop {
            match self.socket.try_recv(buf) {
                Ok(_) => {
                    dropped += 1;
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(dropped),
                // ICMP errors from earlier punch packets surface here; they carry no data
                Err(ref e) if e.kind() == std::io::ErrorKind::ConnectionRefused => continue,
                Err(e) => {
                    return Err(e);
                }
            }
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn into_socket(self) -> UdpSocket {
        self.socket
    }
}

impl Display for PunchedUdpSocket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.socket.local_addr() {
            Ok(local) => write!(f, "[{}] {} -> {}", self.id, local, self.remote_addr),
            Err(_) => write!(f, "[{}] ? -> {}", self.id, self.remote_addr),
        }
    }
}
