//! UDP NAT Traversal
//!
//! This module drives TTL-ramping UDP hole punching between two peers that sit
//! behind NATs without a usable port mapping, and hands the punched socket to
//! the service that will tunnel over it.
//!
//! # Architecture
//!
//! - [`pinger::Pinger`]: the long-lived coordinator. Owns the work queue of
//!   punch requests and serializes attempts (provider side), and exposes the
//!   synchronous consumer-side entry [`pinger::Pinger::ping_provider`]
//! - [`punch_session::PunchSession`]: one attempt over one socket. A sender
//!   task ramps the TTL (`1, 2, 3, 4, 128, 128, ...`) while the receiver races
//!   the first inbound datagram against a fixed deadline
//! - [`interfaces`]: the capabilities the pinger consumes (session descriptor
//!   parsing, NAT proxy, NAT event waiting, port allocation)
//! - [`punched_socket::PunchedUdpSocket`]: the socket that leaves a successful
//!   attempt
//!
//! # Important Notes
//!
//! - Only one attempt is mid-flight inside the provider dispatch loop
//! - A punched socket is either handed off to exactly one proxy or closed
//! - The punch payload is never interpreted; any datagram means success

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod interfaces;
pub mod pinger;
pub mod punch_config;
pub mod punch_session;
pub mod punched_socket;

/// Tag identifying the tunneling service a punched path will serve (e.g. "wireguard")
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ServiceType(String);

impl ServiceType {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ServiceType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for ServiceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a single punch attempt in logs
#[derive(Serialize, Deserialize, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Copy, Clone)]
pub struct PunchId(Uuid);

impl PunchId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PunchId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PunchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_simple())
    }
}

/// One request to establish reachability with a peer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PingParams {
    /// Opaque session descriptor, decoded by a [`interfaces::ConfigParser`]
    pub request_config: Vec<u8>,
    /// Local port to punch from. Zero lets the port supplier pick one
    pub port: u16,
}

impl PingParams {
    pub fn new<T: Into<Vec<u8>>>(request_config: T, port: u16) -> Self {
        Self {
            request_config: request_config.into(),
            port,
        }
    }
}

/// Per-attempt state. `Succeeded` and `TimedOut` are terminal
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PunchState {
    Idle,
    Punching,
    Succeeded,
    TimedOut,
}

impl PunchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PunchState::Succeeded | PunchState::TimedOut)
    }
}
