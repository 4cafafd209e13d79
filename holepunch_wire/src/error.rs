use crate::udp_traversal::ServiceType;
use std::fmt::Formatter;
use std::io::Error;

#[derive(Debug)]
pub enum TraversalError {
    /// The opaque session descriptor could not be decoded
    Decode(String),
    /// No proxy can accept a punched socket for this service type
    ProxyUnavailable(ServiceType),
    /// Resolve, bind, TTL, read or write failure
    Socket(String),
    /// The punch socket toward the peer could not be resolved or bound
    Connect(String),
    /// Rejected [`PingerConfig`](crate::udp_traversal::punch_config::PingerConfig)
    Config(String),
    /// No datagram arrived before the punch deadline
    Timeout,
    /// `ping_provider` was called before `bind_consumer_port`
    ConsumerPortUnbound,
    PortPoolExhausted,
    /// The dispatch loop may only be started once per pinger
    AlreadyStarted,
    /// The dispatch loop is gone, or exited because port mapping made punching unnecessary
    NotRunning,
}

impl TraversalError {
    pub fn std(self) -> std::io::Error {
        let kind = match self {
            TraversalError::Timeout => std::io::ErrorKind::TimedOut,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, self.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TraversalError::Timeout)
    }
}

impl std::fmt::Display for TraversalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TraversalError::Decode(err) => write!(f, "unable to parse ping message: {err}"),
            TraversalError::ProxyUnavailable(service_type) => {
                write!(f, "{service_type} NAT proxy is not available")
            }
            TraversalError::Socket(err) => write!(f, "{err}"),
            TraversalError::Connect(err) => write!(f, "unable to open punch socket: {err}"),
            TraversalError::Config(err) => write!(f, "invalid pinger config: {err}"),
            TraversalError::Timeout => write!(f, "NAT punch attempt timed out"),
            TraversalError::ConsumerPortUnbound => {
                write!(f, "consumer port must be bound before pinging a provider")
            }
            TraversalError::PortPoolExhausted => write!(f, "no free port left in the port pool"),
            TraversalError::AlreadyStarted => write!(f, "NAT pinger already started"),
            TraversalError::NotRunning => {
                write!(f, "NAT pinger is not accepting punch requests")
            }
        }
    }
}

impl std::error::Error for TraversalError {}

impl From<TraversalError> for std::io::Error {
    fn from(val: TraversalError) -> Self {
        val.std()
    }
}

impl From<std::io::Error> for TraversalError {
    fn from(err: Error) -> Self {
        TraversalError::Socket(err.to_string())
    }
}

impl From<anyhow::Error> for TraversalError {
    fn from(err: anyhow::Error) -> Self {
        TraversalError::Socket(err.to_string())
    }
}

impl From<serde_json::Error> for TraversalError {
    fn from(err: serde_json::Error) -> Self {
        TraversalError::Decode(err.to_string())
    }
}
