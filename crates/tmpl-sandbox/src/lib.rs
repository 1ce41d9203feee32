//! Migration snippet sandbox
//!
//! Runs untrusted migration snippets against a copy of one record and
//! returns either a new record or an [`ExecutionError`].
//!
//! # Overview
//!
//! - [`MigrationSandbox`]: per-invocation isolated executor
//! - [`SandboxLimits`]: wall-clock and memory ceilings
//! - [`validate_syntax`]: parse check without execution
//!
//! Snippets are written in a small expression language. The old record is
//! bound to `data`; the snippet returns the new record as an object map.
//!
//! # Example
//!
//! ```rust
//! use tmpl_sandbox::{run, SandboxLimits};
//! use serde_json::json;
//!
//! let out = run(
//!     "return #{ heading: data.title };",
//!     &json!({"title": "Welcome"}),
//!     SandboxLimits::default(),
//! )
//! .unwrap();
//! assert_eq!(out["heading"], "Welcome");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod executor;
pub mod limits;

// Re-exports
pub use error::ExecutionError;
pub use executor::{run, validate_syntax, MigrationSandbox, INPUT_VARIABLE};
pub use limits::SandboxLimits;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
