//! Template versioning engine
//!
//! Keeps activity records valid while their template's schema evolves.
//!
//! # Overview
//!
//! - [`TemplateEngine`]: propose/commit workflow, record upgrades and
//!   authoring helpers over any [`TemplateStore`](tmpl_store::TemplateStore)
//! - [`ChainResolver`]: runs stored single-step migrations in order
//! - [`guard`]: optimistic lost-update detection on template writes
//! - [`EngineConfig`]: sandbox limits, schema depth cap, sample checks
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tmpl_engine::{EngineConfig, ProposalOutcome, TemplateEngine};
//! use tmpl_schema::FieldSchema;
//! use tmpl_store::{MemoryStore, TemplateContent};
//!
//! let engine = TemplateEngine::new(MemoryStore::new(), EngineConfig::default());
//! let template = engine
//!     .create_template("Lesson", TemplateContent::new(vec![FieldSchema::short_text("title")]))
//!     .unwrap();
//! let record = engine
//!     .create_record(template.id, "Intro", None, &json!({"title": "Hi"}))
//!     .unwrap();
//!
//! engine.read_template_for_editing(template.id).unwrap();
//! let renamed = TemplateContent::new(vec![FieldSchema::short_text("heading")]);
//! let outcome = engine.propose_template_change(template.id, renamed).unwrap();
//! assert!(outcome.is_staged());
//!
//! let commit = engine
//!     .commit_with_migration(template.id, "return #{ heading: data.title };")
//!     .unwrap();
//! assert_eq!(commit.new_version, 2);
//! assert_eq!(engine.record(record.id).unwrap().data, json!({"heading": "Hi"}));
//! ```

#![warn(missing_docs)]

pub mod chain;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod outcome;

// Re-exports
pub use chain::{ChainOutcome, ChainResolver};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::TemplateEngine;
pub use error::{ChainError, EngineError, FailureReason, RecordFailure, StaleWrite};
pub use outcome::{MigrationCommit, ProposalOutcome, RecordUpgrade, SkipCommit, WorkflowState};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
