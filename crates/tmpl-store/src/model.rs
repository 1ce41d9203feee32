//! Persisted data model
//!
//! Templates, their immutable per-version snapshots, single-step migrations,
//! staged proposals and the activity records that depend on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tmpl_schema::FieldSchema;
use ulid::Ulid;

/// Unique template identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub Ulid);

impl TemplateId {
    /// Generate new template ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TemplateId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Unique activity record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Ulid);

impl RecordId {
    /// Generate new record ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Editable part of a template: schema, presentation logic and sample data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateContent {
    /// Input field schema
    pub fields: Vec<FieldSchema>,
    /// Presentation logic, opaque to the engine
    #[serde(default)]
    pub render_implementation: String,
    /// Example record shown while authoring
    #[serde(default)]
    pub sample_data: Value,
}

impl TemplateContent {
    /// Create content with empty presentation and sample data
    #[inline]
    #[must_use]
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self {
            fields,
            render_implementation: String::new(),
            sample_data: Value::Object(serde_json::Map::new()),
        }
    }

    /// With presentation logic
    #[inline]
    #[must_use]
    pub fn with_render_implementation(mut self, source: impl Into<String>) -> Self {
        self.render_implementation = source.into();
        self
    }

    /// With sample data
    #[inline]
    #[must_use]
    pub fn with_sample_data(mut self, sample_data: Value) -> Self {
        self.sample_data = sample_data;
        self
    }
}

/// Live template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Template identifier
    pub id: TemplateId,
    /// Display name
    pub name: String,
    /// Current schema version, starting at 1
    pub schema_version: u32,
    /// Current content
    #[serde(flatten)]
    pub content: TemplateContent,
    /// Last successful write of fields or presentation logic
    pub component_last_modified_at: Option<DateTime<Utc>>,
    /// Last read for editing; cleared by every write
    pub component_last_read_at: Option<DateTime<Utc>>,
}

impl Template {
    /// Snapshot of the current version
    #[must_use]
    pub fn snapshot(&self) -> TemplateVersionSnapshot {
        TemplateVersionSnapshot {
            template_id: self.id,
            version: self.schema_version,
            content: self.content.clone(),
        }
    }

    /// Record a read for editing
    #[inline]
    pub fn mark_read(&mut self, now: DateTime<Utc>) {
        self.component_last_read_at = Some(now);
    }

    /// Record a write, forcing the next writer to read first
    #[inline]
    pub fn mark_written(&mut self, now: DateTime<Utc>) {
        self.component_last_modified_at = Some(now);
        self.component_last_read_at = None;
    }
}

/// Immutable content of a template at one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersionSnapshot {
    /// Owning template
    pub template_id: TemplateId,
    /// Version this snapshot describes
    pub version: u32,
    /// Content as of that version
    #[serde(flatten)]
    pub content: TemplateContent,
}

/// Single-step record transformation from `from_version` to `to_version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Migration {
    /// Owning template
    pub template_id: TemplateId,
    /// Version the input conforms to
    pub from_version: u32,
    /// Version the output conforms to, always `from_version + 1` when well formed
    pub to_version: u32,
    /// Untrusted transformation snippet
    pub transform_source: String,
}

impl Migration {
    /// Create migration from `from_version` to the next version
    #[must_use]
    pub fn step(template_id: TemplateId, from_version: u32, transform_source: impl Into<String>) -> Self {
        Self {
            template_id,
            from_version,
            to_version: from_version.saturating_add(1),
            transform_source: transform_source.into(),
        }
    }
}

/// Structural proposal awaiting a migrate-or-skip decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// Owning template
    pub template_id: TemplateId,
    /// Proposed content
    #[serde(flatten)]
    pub content: TemplateContent,
}

/// Content instance of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    /// Record identifier
    pub id: RecordId,
    /// Template the record instantiates
    pub template_id: TemplateId,
    /// Display name
    pub name: String,
    /// Where the record is used, for humans
    pub location_hint: Option<String>,
    /// Record data
    pub data: Value,
    /// Version `data` conforms to
    pub data_schema_version: u32,
}

/// Identity of a record touched by a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedRecord {
    /// Record identifier
    pub id: RecordId,
    /// Display name
    pub name: String,
    /// Where the record is used
    pub location_hint: Option<String>,
    /// Version the record's data conforms to
    pub data_schema_version: u32,
}

impl From<&ActivityRecord> for AffectedRecord {
    fn from(record: &ActivityRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            location_hint: record.location_hint.clone(),
            data_schema_version: record.data_schema_version,
        }
    }
}
