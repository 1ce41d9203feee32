//! Template persistence
//!
//! Data model and storage backends for versioned templates and the activity
//! records that depend on them.
//!
//! # Overview
//!
//! - [`Template`], [`TemplateVersionSnapshot`], [`Migration`],
//!   [`PendingChange`], [`ActivityRecord`]: the persisted model
//! - [`TemplateStore`]: per-table reads plus one atomic [`ChangeSet`] write
//! - [`MemoryStore`]: lock-guarded in-process tables
//! - [`SqliteStore`]: on-disk backend, one transaction per change set
//!
//! # Example
//!
//! ```rust
//! use tmpl_store::{ChangeSet, MemoryStore, Migration, TemplateId, TemplateStore};
//!
//! let store = MemoryStore::new();
//! let template_id = TemplateId::new();
//! store
//!     .apply(ChangeSet::new().with_migration(Migration::step(template_id, 1, "data")))
//!     .unwrap();
//! assert_eq!(store.migrations(template_id).unwrap().len(), 1);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod model;
pub mod sqlite;
pub mod store;

// Re-exports
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use model::{
    ActivityRecord, AffectedRecord, Migration, PendingChange, RecordId, Template, TemplateContent,
    TemplateId, TemplateVersionSnapshot,
};
pub use sqlite::SqliteStore;
pub use store::{ChangeSet, TemplateStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
