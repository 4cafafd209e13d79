use crate::error::TraversalError;
use crate::socket_helpers::is_udp_port_available;
use crate::udp_traversal::interfaces::PortSupplier;
use rand::Rng;
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_ATTEMPTS: usize = 64;

/// Inclusive range of local ports a [`PortPool`] hands out. Never empty and never contains
/// port 0, however it was built
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPortRange", into = "RawPortRange")]
pub struct PortRange {
    start: u16,
    end: u16,
}

#[derive(Serialize, Deserialize)]
struct RawPortRange {
    start: u16,
    end: u16,
}

impl TryFrom<RawPortRange> for PortRange {
    type Error = anyhow::Error;

    fn try_from(raw: RawPortRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl From<PortRange> for RawPortRange {
    fn from(range: PortRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 40000,
            end: 50000,
        }
    }
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Result<Self, anyhow::Error> {
        if start == 0 || start > end {
            return Err(anyhow::Error::msg(format!("invalid port range {start}..={end}")));
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn capacity(&self) -> usize {
        usize::from(self.end.saturating_sub(self.start)) + 1
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

/// Supplies random ports from a [`PortRange`] that are free to bind at the time of the call
pub struct PortPool {
    range: PortRange,
    max_attempts: usize,
}

impl PortPool {
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            max_attempts: DEFAULT_MAX_ATTEMPTS.min(range.capacity() * 4),
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }
}

impl Default for PortPool {
    fn default() -> Self {
        Self::new(PortRange::default())
    }
}

impl PortSupplier for PortPool {
    fn acquire(&self) -> Result<u16, TraversalError> {
        let PortRange { start, end } = self.range;
        if start == 0 || start > end {
            return Err(TraversalError::PortPoolExhausted);
        }

        let mut rng = rand::thread_rng();
        for _ in 0..self.max_attempts {
            let port = rng.gen_range(start..=end);
            if is_udp_port_available(port) {
                log::trace!(target: "holepunch", "Acquired port {port} from pool {:?}", self.range);
                return Ok(port);
            }
        }

        log::warn!(target: "holepunch", "No free port found in {:?} after {} attempts", self.range, self.max_attempts);
        Err(TraversalError::PortPoolExhausted)
    }
}
