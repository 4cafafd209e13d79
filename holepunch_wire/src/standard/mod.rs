//! Default implementations of the capabilities consumed by the pinger.
//!
//! - [`port_pool::PortPool`]: random free UDP port from a range
//! - [`nat_events::NatEventTracker`]: records the port-mapping outcome
//! - [`session_descriptor::JsonConfigParser`]: JSON session descriptors
//! - [`relay_proxy::UdpRelayProxy`]: relays punched traffic to a local service port
pub mod nat_events;
pub mod port_pool;
pub mod relay_proxy;
pub mod session_descriptor;
