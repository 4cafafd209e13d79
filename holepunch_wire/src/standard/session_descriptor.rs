use crate::error::TraversalError;
use crate::udp_traversal::interfaces::{ConfigParser, SessionTarget};
use std::net::IpAddr;

/// Decodes session descriptors of the form
/// `{"ip": "10.0.0.5", "port": 51000, "service_type": "wireguard"}`
#[derive(Default, Copy, Clone, Debug)]
pub struct JsonConfigParser;

impl JsonConfigParser {
    pub fn encode(target: &SessionTarget) -> Result<Vec<u8>, TraversalError> {
        Ok(serde_json::to_vec(target)?)
    }
}

impl ConfigParser for JsonConfigParser {
    fn parse(&self, config: &[u8]) -> Result<SessionTarget, TraversalError> {
        let target: SessionTarget = serde_json::from_slice(config)?;

        // a peer that punches toward us may leave out its own address entirely
        if target.port == 0 && target.ip.is_empty() {
            return Ok(target);
        }

        target
            .ip
            .parse::<IpAddr>()
            .map_err(|err| TraversalError::Decode(format!("bad ip {:?}: {err}", target.ip)))?;

        Ok(target)
    }
}
