//! Template engine
//!
//! Owns the propose/commit workflow for one store:
//! - Creates templates at version 1 and records pinned to the current version
//! - Classifies proposals as in-place, direct version bump, or staged
//! - Commits staged proposals with a migration (dry run all, then write all)
//!   or without one (records stay behind)
//! - Upgrades single records through the migration chain

use crate::chain::{ChainOutcome, ChainResolver};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EngineError, FailureReason, RecordFailure};
use crate::guard;
use crate::outcome::{MigrationCommit, ProposalOutcome, RecordUpgrade, SkipCommit, WorkflowState};
use serde_json::Value;
use tmpl_sandbox::MigrationSandbox;
use tmpl_schema::{check_schema, has_structural_change, FieldSchema, SchemaValidator};
use tmpl_store::{
    ActivityRecord, AffectedRecord, ChangeSet, Migration, PendingChange, RecordId, Template,
    TemplateContent, TemplateId, TemplateStore, TemplateVersionSnapshot,
};

/// Versioning and migration engine over a [`TemplateStore`]
///
/// Operations are synchronous; only snippet execution blocks, bounded by the
/// configured sandbox timeout.
#[derive(Debug)]
pub struct TemplateEngine<S, C = SystemClock> {
    store: S,
    clock: C,
    config: EngineConfig,
    sandbox: MigrationSandbox,
    validator: SchemaValidator,
}

impl<S: TemplateStore> TemplateEngine<S, SystemClock> {
    /// Create engine using the wall clock
    #[inline]
    #[must_use]
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self::with_clock(store, config, SystemClock)
    }
}

impl<S: TemplateStore, C: Clock> TemplateEngine<S, C> {
    /// Create engine with an explicit clock
    #[must_use]
    pub fn with_clock(store: S, config: EngineConfig, clock: C) -> Self {
        Self {
            sandbox: MigrationSandbox::new(config.sandbox),
            validator: SchemaValidator::with_max_depth(config.max_schema_depth),
            store,
            clock,
            config,
        }
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a template at version 1
    ///
    /// # Errors
    /// [`EngineError::InvalidSchema`] or [`EngineError::Validation`] for bad content
    pub fn create_template(
        &self,
        name: impl Into<String>,
        content: TemplateContent,
    ) -> Result<Template, EngineError> {
        self.check_content(&content)?;

        let mut template = Template {
            id: TemplateId::new(),
            name: name.into(),
            schema_version: 1,
            content,
            component_last_modified_at: None,
            component_last_read_at: None,
        };
        template.mark_written(self.clock.now());

        self.store.apply(
            ChangeSet::new()
                .with_snapshot(template.snapshot())
                .with_template(template.clone()),
        )?;

        tracing::info!(template_id = %template.id, name = %template.name, "template created");
        Ok(template)
    }

    /// Create a record conforming to the template's current version
    ///
    /// Stores the normalized form of `data`.
    ///
    /// # Errors
    /// [`EngineError::TemplateNotFound`] or [`EngineError::Validation`]
    pub fn create_record(
        &self,
        template_id: TemplateId,
        name: impl Into<String>,
        location_hint: Option<String>,
        data: &Value,
    ) -> Result<ActivityRecord, EngineError> {
        let template = self.load_template(template_id)?;
        let data = self
            .validator
            .validate(data, &template.content.fields)
            .map_err(EngineError::Validation)?;

        let record = ActivityRecord {
            id: RecordId::new(),
            template_id,
            name: name.into(),
            location_hint,
            data,
            data_schema_version: template.schema_version,
        };
        self.store.apply(ChangeSet::new().with_record(record.clone()))?;

        tracing::debug!(record_id = %record.id, %template_id, version = record.data_schema_version, "record created");
        Ok(record)
    }

    /// Current template state, without marking a read
    ///
    /// # Errors
    /// [`EngineError::TemplateNotFound`]
    pub fn template(&self, template_id: TemplateId) -> Result<Template, EngineError> {
        self.load_template(template_id)
    }

    /// Stored record
    ///
    /// # Errors
    /// [`EngineError::RecordNotFound`]
    pub fn record(&self, record_id: RecordId) -> Result<ActivityRecord, EngineError> {
        self.store
            .record(record_id)?
            .ok_or(EngineError::RecordNotFound(record_id))
    }

    /// Read a template for editing, allowing the next write
    ///
    /// # Errors
    /// [`EngineError::TemplateNotFound`]
    pub fn read_template_for_editing(&self, template_id: TemplateId) -> Result<Template, EngineError> {
        self.store
            .mark_read(template_id, self.clock.now())?
            .ok_or(EngineError::TemplateNotFound(template_id))
    }

    /// Submit an edit of fields, presentation logic and sample data
    ///
    /// - Cosmetic edit: applied in place, version unchanged, any pending
    ///   proposal superseded
    /// - Structural edit, no records: applied with a version bump
    /// - Structural edit with records: staged for a migrate-or-skip decision
    ///
    /// A stale writer gets [`ProposalOutcome::Rejected`] and nothing changes.
    ///
    /// # Errors
    /// [`EngineError::InvalidSchema`] or [`EngineError::Validation`] for bad
    /// content, [`EngineError::TemplateNotFound`], storage failures
    pub fn propose_template_change(
        &self,
        template_id: TemplateId,
        draft: TemplateContent,
    ) -> Result<ProposalOutcome, EngineError> {
        let mut template = self.load_template(template_id)?;
        if let Err(stale) = guard::check_write(&template) {
            tracing::warn!(%template_id, "proposal rejected: {stale}");
            return Ok(ProposalOutcome::Rejected(stale));
        }
        self.check_content(&draft)?;

        if !has_structural_change(&template.content.fields, &draft.fields) {
            template.content = draft;
            template.mark_written(self.clock.now());
            let version = template.schema_version;
            self.store.apply(
                ChangeSet::new()
                    .with_snapshot(template.snapshot())
                    .with_template(template)
                    .clearing_pending(template_id),
            )?;
            tracing::info!(%template_id, version, "template updated in place");
            return Ok(ProposalOutcome::UpdatedInPlace { version });
        }

        let records = self.store.records_for_template(template_id)?;
        if records.is_empty() {
            let new_version = self.advance(&mut template, draft);
            self.store.apply(
                ChangeSet::new()
                    .with_snapshot(template.snapshot())
                    .with_template(template)
                    .clearing_pending(template_id),
            )?;
            tracing::info!(%template_id, new_version, "structural change applied directly");
            return Ok(ProposalOutcome::AppliedDirectly { new_version });
        }

        self.store.stage_pending_change(PendingChange {
            template_id,
            content: draft,
        })?;
        let affected_records: Vec<AffectedRecord> = records.iter().map(AffectedRecord::from).collect();
        tracing::info!(
            %template_id,
            affected = affected_records.len(),
            "structural change staged, decision required"
        );
        Ok(ProposalOutcome::Staged { affected_records })
    }

    /// Staged proposal, if any
    ///
    /// # Errors
    /// [`EngineError::TemplateNotFound`]
    pub fn pending_change(&self, template_id: TemplateId) -> Result<Option<PendingChange>, EngineError> {
        self.load_template(template_id)?;
        Ok(self.store.pending_change(template_id)?)
    }

    /// Workflow state of a template
    ///
    /// # Errors
    /// [`EngineError::TemplateNotFound`]
    pub fn workflow_state(&self, template_id: TemplateId) -> Result<WorkflowState, EngineError> {
        Ok(match self.pending_change(template_id)? {
            Some(_) => WorkflowState::Proposed,
            None => WorkflowState::Clean,
        })
    }

    /// Drop the staged proposal
    ///
    /// Returns whether one existed.
    ///
    /// # Errors
    /// [`EngineError::TemplateNotFound`]
    pub fn discard_pending_change(&self, template_id: TemplateId) -> Result<bool, EngineError> {
        if self.pending_change(template_id)?.is_none() {
            return Ok(false);
        }
        self.store.apply(ChangeSet::new().clearing_pending(template_id))?;
        tracing::info!(%template_id, "pending change discarded");
        Ok(true)
    }

    /// Commit the staged proposal, migrating every current record
    ///
    /// The snippet is run against every record at the current version before
    /// anything is written. A single failure rejects the whole commit and
    /// leaves the proposal staged. Records already lagging behind the current
    /// version are not touched.
    ///
    /// # Errors
    /// - [`EngineError::StaleWrite`] when the template changed unseen
    /// - [`EngineError::NoPendingChange`]
    /// - [`EngineError::InvalidTransform`] when the snippet does not parse
    /// - [`EngineError::MigrationRejected`] listing every failing record
    pub fn commit_with_migration(
        &self,
        template_id: TemplateId,
        transform_source: &str,
    ) -> Result<MigrationCommit, EngineError> {
        let mut template = self.writable_template(template_id)?;
        let pending = self.load_pending(template_id)?;
        if let Some(message) = MigrationSandbox::validate_syntax(transform_source) {
            return Err(EngineError::InvalidTransform { message });
        }

        let from_version = template.schema_version;
        let (current, lagging): (Vec<_>, Vec<_>) = self
            .store
            .records_for_template(template_id)?
            .into_iter()
            .partition(|record| record.data_schema_version == from_version);

        let mut migrated = Vec::with_capacity(current.len());
        let mut failures = Vec::new();
        for mut record in current {
            match self.dry_run(transform_source, &record.data, &pending.content.fields) {
                Ok(data) => {
                    tracing::debug!(record_id = %record.id, "record migrates cleanly");
                    record.data = data;
                    record.data_schema_version = from_version + 1;
                    migrated.push(record);
                }
                Err(reason) => {
                    tracing::debug!(record_id = %record.id, %reason, "record failed dry run");
                    failures.push(RecordFailure {
                        record_id: record.id,
                        record_name: record.name,
                        reason,
                    });
                }
            }
        }

        if !failures.is_empty() {
            tracing::warn!(
                %template_id,
                failed = failures.len(),
                "migration rejected, nothing written"
            );
            return Err(EngineError::MigrationRejected { failures });
        }

        let new_version = self.advance(&mut template, pending.content);
        let records_migrated = migrated.len();
        self.store.apply(
            ChangeSet::new()
                .with_snapshot(template.snapshot())
                .with_template(template)
                .with_migration(Migration::step(template_id, from_version, transform_source))
                .with_records(migrated)
                .clearing_pending(template_id),
        )?;

        tracing::info!(
            %template_id,
            new_version,
            records_migrated,
            "committed with migration"
        );
        Ok(MigrationCommit {
            new_version,
            records_migrated,
            records_left_behind: lagging.len(),
        })
    }

    /// Commit the staged proposal without a migration
    ///
    /// Records keep their data and version and can be upgraded later only if
    /// a migration bridging the new gap is ever stored.
    ///
    /// # Errors
    /// [`EngineError::StaleWrite`], [`EngineError::NoPendingChange`]
    pub fn commit_without_migration(&self, template_id: TemplateId) -> Result<SkipCommit, EngineError> {
        let mut template = self.writable_template(template_id)?;
        let pending = self.load_pending(template_id)?;

        let new_version = self.advance(&mut template, pending.content);
        self.store.apply(
            ChangeSet::new()
                .with_snapshot(template.snapshot())
                .with_template(template)
                .clearing_pending(template_id),
        )?;

        let records_left_behind = self
            .store
            .records_for_template(template_id)?
            .iter()
            .filter(|record| record.data_schema_version < new_version)
            .count();

        tracing::info!(
            %template_id,
            new_version,
            records_left_behind,
            "committed without migration"
        );
        Ok(SkipCommit {
            new_version,
            records_left_behind,
        })
    }

    /// Bring one record up to the template's current version
    ///
    /// A record already current is returned unchanged and not rewritten.
    ///
    /// # Errors
    /// [`EngineError::Chain`] naming the failing version; other records are
    /// never affected
    pub fn upgrade_record(&self, record_id: RecordId) -> Result<RecordUpgrade, EngineError> {
        let mut record = self.record(record_id)?;
        let template = self.load_template(record.template_id)?;
        let from_version = record.data_schema_version;
        let to_version = template.schema_version;

        let ChainOutcome {
            data,
            steps_applied,
        } = self
            .chain()
            .migrate(template.id, &record.data, from_version, to_version)
            .map_err(|e| {
                tracing::warn!(%record_id, from_version, to_version, "record upgrade failed: {e}");
                e
            })?;

        if steps_applied > 0 {
            record.data = data.clone();
            record.data_schema_version = to_version;
            self.store.apply(ChangeSet::new().with_record(record))?;
            tracing::info!(%record_id, from_version, to_version, steps_applied, "record upgraded");
        }

        Ok(RecordUpgrade {
            from_version,
            to_version: from_version.max(to_version),
            data,
        })
    }

    /// Dry-run a snippet against sample data
    ///
    /// Output is validated against the staged proposal's fields when one
    /// exists, else the current fields. Nothing is stored.
    ///
    /// # Errors
    /// [`EngineError::InvalidTransform`] or [`EngineError::Chain`]
    pub fn test_migration(
        &self,
        template_id: TemplateId,
        transform_source: &str,
        sample: &Value,
    ) -> Result<Value, EngineError> {
        let template = self.load_template(template_id)?;
        if let Some(message) = MigrationSandbox::validate_syntax(transform_source) {
            return Err(EngineError::InvalidTransform { message });
        }

        let (target_version, fields) = match self.store.pending_change(template_id)? {
            Some(pending) => (template.schema_version + 1, pending.content.fields),
            None => (template.schema_version, template.content.fields),
        };
        Ok(self
            .chain()
            .test_step(transform_source, sample, target_version, &fields)?)
    }

    /// Validate authored data against `fields`
    ///
    /// # Errors
    /// [`EngineError::InvalidSchema`] or [`EngineError::Validation`]
    pub fn validate_sample_data(&self, fields: &[FieldSchema], sample: &Value) -> Result<Value, EngineError> {
        check_schema(fields).map_err(EngineError::InvalidSchema)?;
        self.validator
            .validate(sample, fields)
            .map_err(EngineError::Validation)
    }

    /// Parse a snippet without running it
    #[inline]
    #[must_use]
    pub fn validate_syntax(transform_source: &str) -> Option<String> {
        MigrationSandbox::validate_syntax(transform_source)
    }

    /// Every version of a template, oldest first
    ///
    /// # Errors
    /// [`EngineError::TemplateNotFound`]
    pub fn template_history(&self, template_id: TemplateId) -> Result<Vec<TemplateVersionSnapshot>, EngineError> {
        self.load_template(template_id)?;
        Ok(self.store.snapshots(template_id)?)
    }

    /// Records whose data lags the template's current version
    ///
    /// # Errors
    /// [`EngineError::TemplateNotFound`]
    pub fn outdated_records(&self, template_id: TemplateId) -> Result<Vec<AffectedRecord>, EngineError> {
        let template = self.load_template(template_id)?;
        Ok(self
            .store
            .records_for_template(template_id)?
            .iter()
            .filter(|record| record.data_schema_version < template.schema_version)
            .map(AffectedRecord::from)
            .collect())
    }

    fn chain(&self) -> ChainResolver<'_, S> {
        ChainResolver::new(&self.store, self.sandbox, self.validator)
    }

    fn load_template(&self, template_id: TemplateId) -> Result<Template, EngineError> {
        self.store
            .template(template_id)?
            .ok_or(EngineError::TemplateNotFound(template_id))
    }

    fn load_pending(&self, template_id: TemplateId) -> Result<PendingChange, EngineError> {
        self.store
            .pending_change(template_id)?
            .ok_or(EngineError::NoPendingChange(template_id))
    }

    fn writable_template(&self, template_id: TemplateId) -> Result<Template, EngineError> {
        let template = self.load_template(template_id)?;
        guard::check_write(&template).map_err(|stale| {
            tracing::warn!(%template_id, "commit rejected: {stale}");
            EngineError::StaleWrite(stale)
        })?;
        Ok(template)
    }

    fn check_content(&self, content: &TemplateContent) -> Result<(), EngineError> {
        check_schema(&content.fields).map_err(EngineError::InvalidSchema)?;
        if self.config.validate_sample_data {
            self.validator
                .validate(&content.sample_data, &content.fields)
                .map_err(EngineError::Validation)?;
        }
        Ok(())
    }

    fn dry_run(&self, source: &str, data: &Value, fields: &[FieldSchema]) -> Result<Value, FailureReason> {
        let output = self.sandbox.run(source, data)?;
        self.validator
            .validate(&output, fields)
            .map_err(FailureReason::Validation)
    }

    /// Install `content` as the next version and mark the write
    fn advance(&self, template: &mut Template, content: TemplateContent) -> u32 {
        template.schema_version += 1;
        template.content = content;
        template.mark_written(self.clock.now());
        template.schema_version
    }
}
