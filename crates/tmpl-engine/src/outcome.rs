//! Results of workflow operations

use crate::error::StaleWrite;
use serde::Serialize;
use serde_json::Value;
use tmpl_store::AffectedRecord;

/// What happened to a proposed template edit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ProposalOutcome {
    /// Structural change with no dependent records; version bumped
    #[serde(rename_all = "camelCase")]
    AppliedDirectly {
        /// Version now current
        new_version: u32,
    },
    /// Cosmetic or presentation-only change; version unchanged
    #[serde(rename_all = "camelCase")]
    UpdatedInPlace {
        /// Current version
        version: u32,
    },
    /// Structural change staged; a migrate-or-skip decision is required
    #[serde(rename_all = "camelCase")]
    Staged {
        /// Records that depend on the template
        affected_records: Vec<AffectedRecord>,
    },
    /// Writer has not seen the latest state
    Rejected(StaleWrite),
}

impl ProposalOutcome {
    /// Check whether a decision is now required
    #[inline]
    #[must_use]
    pub fn is_staged(&self) -> bool {
        matches!(self, Self::Staged { .. })
    }
}

/// Successful migrate-path commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationCommit {
    /// Version now current
    pub new_version: u32,
    /// Records rewritten to the new version
    pub records_migrated: usize,
    /// Records already lagging before the commit, left at their version
    pub records_left_behind: usize,
}

/// Successful skip-path commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipCommit {
    /// Version now current
    pub new_version: u32,
    /// Records not at the new version
    pub records_left_behind: usize,
}

/// Successful individual record upgrade
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpgrade {
    /// Version before the upgrade
    pub from_version: u32,
    /// Version after the upgrade
    pub to_version: u32,
    /// Upgraded data
    pub data: Value,
}

/// Workflow state of one template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowState {
    /// No proposal pending
    Clean,
    /// Structural proposal awaiting a decision
    Proposed,
}
