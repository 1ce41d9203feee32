//! Execution errors for migration snippets

/// Why a migration snippet did not produce a record
///
/// Every variant is recoverable by revising the snippet; none is retried
/// automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// Wall-clock limit exceeded
    #[error("migration exceeded the {limit_ms} ms time limit")]
    Timeout {
        /// Configured limit in milliseconds
        limit_ms: u64,
    },

    /// Memory ceiling exceeded
    #[error("migration exceeded the {limit_mb} MB memory limit: {detail}")]
    MemoryExceeded {
        /// Configured ceiling in megabytes
        limit_mb: usize,
        /// Which allocation tripped the ceiling
        detail: String,
    },

    /// Snippet failed to parse or raised an error
    #[error("migration failed: {message}")]
    RuntimeError {
        /// Engine error message, with position when known
        message: String,
    },

    /// Snippet returned something other than one object
    #[error("migration must return a single object, got {found}")]
    InvalidReturn {
        /// Type name of what was returned
        found: String,
    },

    /// Sandbox worker could not be started or died
    #[error("sandbox isolation failure: {message}")]
    Isolation {
        /// Failure description
        message: String,
    },
}

impl ExecutionError {
    /// Create runtime error
    #[inline]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::RuntimeError {
            message: message.into(),
        }
    }

    /// Create isolation error
    #[inline]
    pub fn isolation(message: impl Into<String>) -> Self {
        Self::Isolation {
            message: message.into(),
        }
    }

    /// Check whether a resource limit was hit
    #[inline]
    #[must_use]
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::MemoryExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_display() {
        let err = ExecutionError::Timeout { limit_ms: 5000 };
        assert_eq!(err.to_string(), "migration exceeded the 5000 ms time limit");

        let err = ExecutionError::InvalidReturn {
            found: "array".to_string(),
        };
        assert!(err.to_string().contains("single object"));
    }

    #[test]
    fn resource_limit_classification() {
        assert!(ExecutionError::Timeout { limit_ms: 1 }.is_resource_limit());
        assert!(!ExecutionError::runtime("boom").is_resource_limit());
    }
}
