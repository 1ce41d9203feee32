//! Storage seam
//!
//! Reads are per logical table. Every multi-row write goes through a single
//! [`TemplateStore::apply`] call so a version bump, its snapshot, its
//! migration row and the rewritten records land together or not at all.

use crate::error::StoreResult;
use crate::model::{
    ActivityRecord, Migration, PendingChange, RecordId, Template, TemplateId,
    TemplateVersionSnapshot,
};
use chrono::{DateTime, Utc};

/// Atomic batch of writes
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use]
pub struct ChangeSet {
    /// Template to insert or replace
    pub template: Option<Template>,
    /// Snapshot to insert or replace, keyed by `(template_id, version)`
    pub snapshot: Option<TemplateVersionSnapshot>,
    /// Migration to insert; an existing step with the same `from_version` is a conflict
    pub migration: Option<Migration>,
    /// Records to insert or replace
    pub records: Vec<ActivityRecord>,
    /// Template whose pending change is deleted
    pub clear_pending: Option<TemplateId>,
}

impl ChangeSet {
    /// Create empty change set
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// With template upsert
    #[inline]
    pub fn with_template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }

    /// With snapshot upsert
    #[inline]
    pub fn with_snapshot(mut self, snapshot: TemplateVersionSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// With migration insert
    #[inline]
    pub fn with_migration(mut self, migration: Migration) -> Self {
        self.migration = Some(migration);
        self
    }

    /// With one record upsert
    #[inline]
    pub fn with_record(mut self, record: ActivityRecord) -> Self {
        self.records.push(record);
        self
    }

    /// With record upserts
    #[inline]
    pub fn with_records(mut self, records: impl IntoIterator<Item = ActivityRecord>) -> Self {
        self.records.extend(records);
        self
    }

    /// Delete the pending change of `template_id`
    #[inline]
    pub fn clearing_pending(mut self, template_id: TemplateId) -> Self {
        self.clear_pending = Some(template_id);
        self
    }

    /// Check whether the set writes nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.template.is_none()
            && self.snapshot.is_none()
            && self.migration.is_none()
            && self.records.is_empty()
            && self.clear_pending.is_none()
    }
}

/// Persistence for templates and the records that depend on them
pub trait TemplateStore: Send + Sync {
    /// Load template
    fn template(&self, id: TemplateId) -> StoreResult<Option<Template>>;

    /// Load snapshot of one version
    fn snapshot(&self, id: TemplateId, version: u32) -> StoreResult<Option<TemplateVersionSnapshot>>;

    /// All snapshots of a template, ordered by version
    fn snapshots(&self, id: TemplateId) -> StoreResult<Vec<TemplateVersionSnapshot>>;

    /// All migrations of a template, ordered by `from_version`
    fn migrations(&self, id: TemplateId) -> StoreResult<Vec<Migration>>;

    /// Staged proposal, if any
    fn pending_change(&self, id: TemplateId) -> StoreResult<Option<PendingChange>>;

    /// Load record
    fn record(&self, id: RecordId) -> StoreResult<Option<ActivityRecord>>;

    /// Records instantiating a template, ordered by id
    fn records_for_template(&self, id: TemplateId) -> StoreResult<Vec<ActivityRecord>>;

    /// Store a proposal, replacing any earlier one for the same template
    fn stage_pending_change(&self, change: PendingChange) -> StoreResult<()>;

    /// Set only the read-for-editing timestamp
    ///
    /// Every other column is left as stored, so a write that lands between
    /// a caller's load and this call is kept. Returns the stamped template,
    /// or `None` when it does not exist.
    fn mark_read(&self, id: TemplateId, at: DateTime<Utc>) -> StoreResult<Option<Template>>;

    /// Apply every write in `changes` atomically
    fn apply(&self, changes: ChangeSet) -> StoreResult<()>;
}

impl<T: TemplateStore + ?Sized> TemplateStore for std::sync::Arc<T> {
    fn template(&self, id: TemplateId) -> StoreResult<Option<Template>> {
        (**self).template(id)
    }

    fn snapshot(&self, id: TemplateId, version: u32) -> StoreResult<Option<TemplateVersionSnapshot>> {
        (**self).snapshot(id, version)
    }

    fn snapshots(&self, id: TemplateId) -> StoreResult<Vec<TemplateVersionSnapshot>> {
        (**self).snapshots(id)
    }

    fn migrations(&self, id: TemplateId) -> StoreResult<Vec<Migration>> {
        (**self).migrations(id)
    }

    fn pending_change(&self, id: TemplateId) -> StoreResult<Option<PendingChange>> {
        (**self).pending_change(id)
    }

    fn record(&self, id: RecordId) -> StoreResult<Option<ActivityRecord>> {
        (**self).record(id)
    }

    fn records_for_template(&self, id: TemplateId) -> StoreResult<Vec<ActivityRecord>> {
        (**self).records_for_template(id)
    }

    fn stage_pending_change(&self, change: PendingChange) -> StoreResult<()> {
        (**self).stage_pending_change(change)
    }

    fn mark_read(&self, id: TemplateId, at: DateTime<Utc>) -> StoreResult<Option<Template>> {
        (**self).mark_read(id, at)
    }

    fn apply(&self, changes: ChangeSet) -> StoreResult<()> {
        (**self).apply(changes)
    }
}
