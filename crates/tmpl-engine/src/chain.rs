//! Migration chain resolution
//!
//! Bridges a record from the version its data conforms to up to a target
//! version by running stored single-step migrations in order. Gaps and
//! misnumbered steps are hard errors. Only the final output is validated,
//! against the target version's snapshot.

use crate::error::ChainError;
use serde_json::Value;
use std::collections::HashMap;
use tmpl_sandbox::MigrationSandbox;
use tmpl_schema::{FieldSchema, SchemaValidator};
use tmpl_store::{Migration, TemplateId, TemplateStore};

/// Result of a chain run
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    /// Data conforming to the target version
    pub data: Value,
    /// Number of migrations applied
    pub steps_applied: u32,
}

/// Runs migration chains against one store
#[derive(Debug)]
pub struct ChainResolver<'a, S: ?Sized> {
    store: &'a S,
    sandbox: MigrationSandbox,
    validator: SchemaValidator,
}

impl<'a, S: TemplateStore + ?Sized> ChainResolver<'a, S> {
    /// Create resolver
    #[inline]
    #[must_use]
    pub fn new(store: &'a S, sandbox: MigrationSandbox, validator: SchemaValidator) -> Self {
        Self {
            store,
            sandbox,
            validator,
        }
    }

    /// Migrate `data` from `from_version` to `to_version`
    ///
    /// Returns `data` unchanged with zero steps when `from_version >= to_version`.
    ///
    /// # Errors
    /// - [`ChainError::MissingMigration`] naming the first version with no outgoing step
    /// - [`ChainError::MisnumberedMigration`] for a step that skips versions
    /// - [`ChainError::Execution`] when a step's snippet fails
    /// - [`ChainError::Validation`] when the result does not fit the target version
    pub fn migrate(
        &self,
        template_id: TemplateId,
        data: &Value,
        from_version: u32,
        to_version: u32,
    ) -> Result<ChainOutcome, ChainError> {
        if from_version >= to_version {
            return Ok(ChainOutcome {
                data: data.clone(),
                steps_applied: 0,
            });
        }

        let steps: HashMap<u32, Migration> = self
            .store
            .migrations(template_id)?
            .into_iter()
            .map(|m| (m.from_version, m))
            .collect();

        let mut current = data.clone();
        for version in from_version..to_version {
            let step = steps
                .get(&version)
                .ok_or(ChainError::MissingMigration {
                    from_version: version,
                })?;
            if step.to_version != version + 1 {
                return Err(ChainError::MisnumberedMigration {
                    from_version: version,
                    to_version: step.to_version,
                });
            }

            tracing::debug!(%template_id, from_version = version, "applying migration step");
            current = self
                .sandbox
                .run(&step.transform_source, &current)
                .map_err(|source| ChainError::Execution {
                    from_version: version,
                    source,
                })?;
        }

        let target = self
            .store
            .snapshot(template_id, to_version)?
            .ok_or(ChainError::SnapshotNotFound {
                version: to_version,
            })?;
        let data = self
            .validator
            .validate(&current, &target.content.fields)
            .map_err(|errors| ChainError::Validation {
                version: to_version,
                errors,
            })?;

        Ok(ChainOutcome {
            data,
            steps_applied: to_version - from_version,
        })
    }

    /// Run one snippet against sample data and validate the output
    ///
    /// Touches no stored record. `to_version` only labels errors.
    ///
    /// # Errors
    /// [`ChainError::Execution`] or [`ChainError::Validation`]
    pub fn test_step(
        &self,
        transform_source: &str,
        sample: &Value,
        to_version: u32,
        fields: &[FieldSchema],
    ) -> Result<Value, ChainError> {
        let output = self
            .sandbox
            .run(transform_source, sample)
            .map_err(|source| ChainError::Execution {
                from_version: to_version.saturating_sub(1),
                source,
            })?;
        self.validator
            .validate(&output, fields)
            .map_err(|errors| ChainError::Validation {
                version: to_version,
                errors,
            })
    }
}
