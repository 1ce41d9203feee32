//! Resource limits for one sandboxed invocation
//!
//! The memory ceiling is split evenly across [`SandboxLimits::MAX_VARIABLES`]
//! live variables. Each variable may hold half its share as string bytes and
//! half as array or map slots, so the sum over every variable in scope stays
//! under [`SandboxLimits::memory_bytes`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Time and memory ceilings for one snippet run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Wall-clock timeout in milliseconds
    pub timeout_ms: u64,
    /// Memory ceiling in megabytes
    pub memory_mb: usize,
}

impl SandboxLimits {
    /// Default wall-clock timeout
    pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
    /// Default memory ceiling
    pub const DEFAULT_MEMORY_MB: usize = 8;
    /// Variables a snippet may hold at once, function parameters included
    pub const MAX_VARIABLES: usize = 64;

    /// Create limits
    #[inline]
    #[must_use]
    pub fn new(timeout_ms: u64, memory_mb: usize) -> Self {
        Self {
            timeout_ms,
            memory_mb,
        }
    }

    /// With timeout
    #[inline]
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// With memory ceiling
    #[inline]
    #[must_use]
    pub fn with_memory_mb(mut self, memory_mb: usize) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    /// Timeout as a duration
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Memory ceiling in bytes
    #[inline]
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.memory_mb.saturating_mul(1024 * 1024)
    }

    /// Share of the ceiling one variable may use
    #[inline]
    #[must_use]
    pub fn bytes_per_variable(&self) -> usize {
        self.memory_bytes() / Self::MAX_VARIABLES
    }

    /// Largest total string length inside one value
    #[inline]
    #[must_use]
    pub fn max_string_bytes(&self) -> usize {
        (self.bytes_per_variable() / 2).max(1)
    }

    /// Largest number of array or map slots inside one value
    #[inline]
    #[must_use]
    pub fn max_elements(&self) -> usize {
        (self.bytes_per_variable() / 2 / std::mem::size_of::<rhai::Dynamic>()).max(1)
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT_MS, Self::DEFAULT_MEMORY_MB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let limits = SandboxLimits::default();
        assert_eq!(limits.timeout(), Duration::from_secs(5));
        assert_eq!(limits.memory_bytes(), 8 * 1024 * 1024);
        assert!(limits.max_elements() > 0);
    }

    #[test]
    fn per_variable_shares_fit_under_the_ceiling() {
        for memory_mb in [1, 8, 64] {
            let limits = SandboxLimits::default().with_memory_mb(memory_mb);
            let slot = std::mem::size_of::<rhai::Dynamic>();
            let per_variable = limits.max_string_bytes() + limits.max_elements() * slot;
            assert!(per_variable * SandboxLimits::MAX_VARIABLES <= limits.memory_bytes());
        }
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let limits: SandboxLimits = serde_json::from_str(r#"{"timeout_ms": 250}"#).unwrap();
        assert_eq!(limits, SandboxLimits::default().with_timeout_ms(250));
    }
}
