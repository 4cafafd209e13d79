use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::udp_traversal::punch_session::TtlRamp;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(10_000);
/// TTL used once the ramp is over; large enough to cross any realistic path
pub const TRAVERSED_TTL: u32 = 128;
/// Last TTL of the ramp before jumping to [`TRAVERSED_TTL`]
pub const RAMP_LIMIT: u32 = 4;
pub const READ_BUFFER_SIZE: usize = 512;

/// Timings and limits of the punch protocol. Durations are (de)serialized as milliseconds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingerConfig {
    /// Spacing between punch packets. Also the back-off after a failed read
    #[serde(with = "serde_millis")]
    pub ping_interval: Duration,
    /// Overall deadline of the receive race, measured from its entry
    #[serde(with = "serde_millis")]
    pub ping_timeout: Duration,
    /// How long the receiver keeps the sender running after the first datagram
    #[serde(with = "serde_millis")]
    pub success_hold: Duration,
    /// Consumer side: pause after success so the provider can finish its handoff
    #[serde(with = "serde_millis")]
    pub provider_setup_grace: Duration,
    pub ramp_limit: u32,
    pub traversed_ttl: u32,
    pub read_buffer: usize,
}

impl Default for PingerConfig {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            success_hold: DEFAULT_PING_INTERVAL * 2,
            provider_setup_grace: Duration::from_millis(200),
            ramp_limit: RAMP_LIMIT,
            traversed_ttl: TRAVERSED_TTL,
            read_buffer: READ_BUFFER_SIZE,
        }
    }
}

impl PingerConfig {
    /// Loads a config from JSON. Absent fields keep their defaults
    pub fn from_json<T: AsRef<[u8]>>(raw: T) -> Result<Self, anyhow::Error> {
        let this: Self = serde_json::from_slice(raw.as_ref())?;
        this.validate()?;
        Ok(this)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.ping_interval.is_zero() {
            return Err(anyhow::Error::msg("ping_interval must be non-zero"));
        }

        if self.ping_timeout < self.ping_interval {
            return Err(anyhow::Error::msg(
                "ping_timeout must be at least one ping_interval",
            ));
        }

        if self.ramp_limit == 0
            || self.traversed_ttl < self.ramp_limit
            || self.traversed_ttl > 255
        {
            return Err(anyhow::Error::msg(format!(
                "invalid TTL ramp: ramp_limit={} traversed_ttl={}",
                self.ramp_limit, self.traversed_ttl
            )));
        }

        if self.read_buffer == 0 {
            return Err(anyhow::Error::msg("read_buffer must be non-zero"));
        }

        Ok(())
    }

    pub fn ttl_ramp(&self) -> TtlRamp {
        TtlRamp::new(self.ramp_limit, self.traversed_ttl)
    }
}
