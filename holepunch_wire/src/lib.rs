//! TTL-ramping UDP hole punching for peers behind NATs without usable port mapping.
//!
//! The [`udp_traversal::pinger::Pinger`] answers punch requests from remote peers
//! (provider side) and punches toward providers (consumer side). A punched socket is
//! handed to a [`udp_traversal::interfaces::NatProxy`], which presents it to the
//! tunneling layer.
#![forbid(unsafe_code)]

pub mod error;
pub mod socket_helpers;
pub mod udp_traversal;

pub(crate) mod standard;

pub use standard::*;
