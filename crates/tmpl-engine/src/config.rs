//! Engine configuration

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tmpl_sandbox::SandboxLimits;
use tmpl_schema::DEFAULT_MAX_DEPTH;

/// Engine configuration
///
/// Every key is optional in TOML; missing keys keep their defaults.
///
/// ```
/// # use tmpl_engine::EngineConfig;
/// let config = EngineConfig::from_toml_str("[sandbox]\ntimeout_ms = 250").unwrap();
/// assert_eq!(config.sandbox.timeout_ms, 250);
/// assert_eq!(config.sandbox.memory_mb, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Limits applied to every migration snippet run
    pub sandbox: SandboxLimits,
    /// Deepest allowed nesting of nested-list fields
    pub max_schema_depth: usize,
    /// Reject proposals whose sample data does not fit the proposed fields
    pub validate_sample_data: bool,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With sandbox limits
    #[inline]
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: SandboxLimits) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// With nesting depth cap
    #[inline]
    #[must_use]
    pub fn with_max_schema_depth(mut self, depth: usize) -> Self {
        self.max_schema_depth = depth;
        self
    }

    /// With sample data validation on proposals
    #[inline]
    #[must_use]
    pub fn with_validate_sample_data(mut self, enabled: bool) -> Self {
        self.validate_sample_data = enabled;
        self
    }

    /// Parse TOML configuration
    ///
    /// # Errors
    /// Returns [`EngineError::Config`] for malformed TOML or out-of-range values
    pub fn from_toml_str(source: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(source).map_err(|e| EngineError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Load TOML configuration from a file
    ///
    /// # Errors
    /// Returns [`EngineError::Config`] when the file is unreadable or invalid
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.sandbox.timeout_ms == 0 {
            return Err(EngineError::Config("sandbox.timeout_ms must be positive".to_string()));
        }
        if self.sandbox.memory_mb == 0 {
            return Err(EngineError::Config("sandbox.memory_mb must be positive".to_string()));
        }
        if self.max_schema_depth == 0 {
            return Err(EngineError::Config("max_schema_depth must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxLimits::default(),
            max_schema_depth: DEFAULT_MAX_DEPTH,
            validate_sample_data: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn full_toml() {
        let config = EngineConfig::from_toml_str(
            r"
            max_schema_depth = 3
            validate_sample_data = false

            [sandbox]
            timeout_ms = 1000
            memory_mb = 16
            ",
        )
        .unwrap();

        assert_eq!(
            config,
            EngineConfig::new()
                .with_max_schema_depth(3)
                .with_validate_sample_data(false)
                .with_sandbox(SandboxLimits::new(1000, 16))
        );
    }

    #[test]
    fn rejects_zero_limits() {
        let err = EngineConfig::from_toml_str("[sandbox]\ntimeout_ms = 0").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(EngineConfig::from_toml_str("max_schema_depth = \"deep\"").is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "validate_sample_data = false\n").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert!(!config.validate_sample_data);
        assert!(EngineConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
