//! Template field schemas
//!
//! Declarative field schemas for activity templates and the two checks the
//! rest of the workspace builds on.
//!
//! # Overview
//!
//! - [`FieldSchema`] / [`FieldKind`]: the recursive schema model
//! - [`SchemaValidator`]: structural validation of record data, returning a
//!   normalized record or field-level errors
//! - [`has_structural_change`] / [`structural_changes`]: positional diff that
//!   separates shape changes from cosmetic edits
//!
//! # Example
//!
//! ```rust
//! use tmpl_schema::{has_structural_change, validate, FieldSchema};
//! use serde_json::json;
//!
//! let fields = vec![FieldSchema::short_text("title").required()];
//! assert!(validate(&json!({"title": "Hi"}), &fields).is_ok());
//!
//! let renamed = vec![FieldSchema::short_text("heading").required()];
//! assert!(has_structural_change(&fields, &renamed));
//! ```

#![warn(missing_docs)]

pub mod diff;
pub mod field;
pub mod validator;

// Re-exports
pub use diff::{has_structural_change, structural_changes, ChangeReason, SchemaChange};
pub use field::{FieldKind, FieldSchema};
pub use validator::{
    check_schema, validate, FieldError, SchemaValidator, ValidationErrors, DEFAULT_MAX_DEPTH,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
