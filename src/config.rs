//! Interceptor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bound on begin/invoke/end attempts when a call deadlocks.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default stateful instance access timeout in milliseconds.
pub const DEFAULT_ACCESS_TIMEOUT_MS: u64 = 5000;

/// Tunables shared by the interceptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Attempts of the begin/invoke/end cycle before a deadlock is surfaced.
    pub max_attempts: u32,
    /// Upper bound of the sub-millisecond jitter added to each backoff.
    pub max_backoff_jitter_nanos: u32,
    /// How long a call waits for a busy stateful instance; `None` waits forever.
    pub access_timeout_ms: Option<u64>,
    /// Seed for the retry backoff generator.
    pub backoff_seed: Option<u64>,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_backoff_jitter_nanos: 1000,
            access_timeout_ms: Some(DEFAULT_ACCESS_TIMEOUT_MS),
            backoff_seed: None,
        }
    }
}

impl InterceptorConfig {
    /// Parses a JSON document. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_access_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.access_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_backoff_seed(mut self, seed: u64) -> Self {
        self.backoff_seed = Some(seed);
        self
    }

    /// Attempt bound, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn access_timeout(&self) -> Option<Duration> {
        self.access_timeout_ms.map(Duration::from_millis)
    }
}
