//! Capabilities consumed by the [`Pinger`](crate::udp_traversal::pinger::Pinger).
//!
//! The pinger never decodes session descriptors, allocates ports or tunnels
//! traffic itself. It is handed one implementation of each trait below at
//! construction; [`crate::standard`] contains the default implementations.

use crate::error::TraversalError;
use crate::udp_traversal::punched_socket::PunchedUdpSocket;
use crate::udp_traversal::ServiceType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Decoded punch request: where to punch toward, and for which service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTarget {
    pub ip: String,
    /// Zero when the peer did not supply a port to punch toward
    pub port: u16,
    pub service_type: ServiceType,
}

impl Display for SessionTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} ({})", self.ip, self.port, self.service_type)
    }
}

/// Decodes the opaque session descriptor carried by a punch request
pub trait ConfigParser: Send + Sync {
    fn parse(&self, config: &[u8]) -> Result<SessionTarget, TraversalError>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NatEventKind {
    Success,
    Failure,
}

/// Outcome of the host's automatic NAT configuration (UPnP/NAT-PMP port mapping)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatEvent {
    pub stage: String,
    pub kind: NatEventKind,
    pub error: Option<String>,
}

impl NatEvent {
    pub fn success<T: Into<String>>(stage: T) -> Self {
        Self {
            stage: stage.into(),
            kind: NatEventKind::Success,
            error: None,
        }
    }

    pub fn failure<T: Into<String>, E: Display>(stage: T, err: E) -> Self {
        Self {
            stage: stage.into(),
            kind: NatEventKind::Failure,
            error: Some(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == NatEventKind::Success
    }
}

/// Blocks until the host's port mapping attempt reports an outcome
#[async_trait]
pub trait NatEventWaiter: Send + Sync {
    async fn wait_for_event(&self) -> NatEvent;
}

/// Takes ownership of punched sockets and presents them to the tunnel layer
pub trait NatProxy: Send + Sync {
    /// Transfers ownership of `socket`. Must return without waiting on the socket's traffic
    fn hand_off(&self, service_type: ServiceType, socket: PunchedUdpSocket);
    /// Records the local port that traffic punched for `service_type` is redirected to
    fn register_service_port(&self, service_type: ServiceType, port: u16);
    fn is_available(&self, service_type: &ServiceType) -> bool;
}

/// Allocates a local UDP port for a session
pub trait PortSupplier: Send + Sync {
    fn acquire(&self) -> Result<u16, TraversalError>;
}
