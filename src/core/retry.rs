//! Backoff policy applied between retry attempts.
//!
//! Delays grow exponentially: the pause after the attempt with 0-based index
//! `i` is `base * 2^i`, capped at `max`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base delay between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default ceiling on a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff between failed attempts of the same task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay after the first failed attempt.
    #[serde(rename = "base_ms", with = "serde_millis")]
    pub base: Duration,

    /// Upper bound for any single delay.
    #[serde(rename = "max_ms", with = "serde_millis", default = "default_max")]
    pub max: Duration,
}

fn default_max() -> Duration {
    DEFAULT_MAX_DELAY
}

impl Backoff {
    /// Exponential backoff starting at `base`, capped at the default maximum.
    pub fn exponential(base: Duration) -> Self {
        Self {
            base,
            max: DEFAULT_MAX_DELAY.max(base),
        }
    }

    /// No delay between attempts.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Builder: set the delay ceiling.
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Delay to wait after the failed attempt with 0-based index `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(DEFAULT_BASE_DELAY)
    }
}

/// Serde helper for Duration serialization.
///
/// Serializes Duration as whole milliseconds (matching the batch file format).
mod serde_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
