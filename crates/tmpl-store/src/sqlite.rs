//! SQLite-backed store
//!
//! Five tables, JSON columns stored as TEXT and timestamps as epoch
//! milliseconds. [`TemplateStore::apply`] runs inside one transaction.

use crate::error::{StoreError, StoreResult};
use crate::model::{
    ActivityRecord, Migration, PendingChange, RecordId, Template, TemplateContent, TemplateId,
    TemplateVersionSnapshot,
};
use crate::store::{ChangeSet, TemplateStore};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS templates (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    schema_version INTEGER NOT NULL,
    fields TEXT NOT NULL,
    render_implementation TEXT NOT NULL,
    sample_data TEXT NOT NULL,
    last_modified_at INTEGER,
    last_read_at INTEGER
);

CREATE TABLE IF NOT EXISTS template_versions (
    template_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    fields TEXT NOT NULL,
    render_implementation TEXT NOT NULL,
    sample_data TEXT NOT NULL,
    PRIMARY KEY (template_id, version)
);

CREATE TABLE IF NOT EXISTS migrations (
    template_id TEXT NOT NULL,
    from_version INTEGER NOT NULL,
    to_version INTEGER NOT NULL,
    transform_source TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_migrations_step ON migrations (template_id, from_version);

CREATE TABLE IF NOT EXISTS pending_changes (
    template_id TEXT PRIMARY KEY,
    fields TEXT NOT NULL,
    render_implementation TEXT NOT NULL,
    sample_data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activity_records (
    id TEXT PRIMARY KEY,
    template_id TEXT NOT NULL,
    name TEXT NOT NULL,
    location_hint TEXT,
    data TEXT NOT NULL,
    data_schema_version INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activity_records_template ON activity_records (template_id);
";

const TEMPLATE_COLUMNS: &str = "id, name, schema_version, fields, render_implementation, \
     sample_data, last_modified_at, last_read_at";
const RECORD_COLUMNS: &str = "id, template_id, name, location_hint, data, data_schema_version";

/// Store persisting to a SQLite database
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database file
    ///
    /// # Errors
    /// Fails when the file cannot be opened or the schema cannot be applied
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "template store opened");
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    ///
    /// # Errors
    /// Fails when the schema cannot be applied
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl TemplateStore for SqliteStore {
    fn template(&self, id: TemplateId) -> StoreResult<Option<Template>> {
        load_template(&self.conn.lock(), id)
    }

    fn snapshot(&self, id: TemplateId, version: u32) -> StoreResult<Option<TemplateVersionSnapshot>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT fields, render_implementation, sample_data FROM template_versions \
                 WHERE template_id = ?1 AND version = ?2",
                params![id.to_string(), version],
                ContentRow::read,
            )
            .optional()?;
        row.map(|content| {
            Ok(TemplateVersionSnapshot {
                template_id: id,
                version,
                content: content.into_content("template_versions")?,
            })
        })
        .transpose()
    }

    fn snapshots(&self, id: TemplateId) -> StoreResult<Vec<TemplateVersionSnapshot>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT version, fields, render_implementation, sample_data FROM template_versions \
             WHERE template_id = ?1 ORDER BY version",
        )?;
        let rows = stmt
            .query_map(params![id.to_string()], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    ContentRow {
                        fields: row.get(1)?,
                        render_implementation: row.get(2)?,
                        sample_data: row.get(3)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(version, content)| {
                Ok(TemplateVersionSnapshot {
                    template_id: id,
                    version,
                    content: content.into_content("template_versions")?,
                })
            })
            .collect()
    }

    fn migrations(&self, id: TemplateId) -> StoreResult<Vec<Migration>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT from_version, to_version, transform_source FROM migrations \
             WHERE template_id = ?1 ORDER BY from_version",
        )?;
        let migrations = stmt
            .query_map(params![id.to_string()], |row| {
                Ok(Migration {
                    template_id: id,
                    from_version: row.get(0)?,
                    to_version: row.get(1)?,
                    transform_source: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(migrations)
    }

    fn pending_change(&self, id: TemplateId) -> StoreResult<Option<PendingChange>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT fields, render_implementation, sample_data FROM pending_changes \
                 WHERE template_id = ?1",
                params![id.to_string()],
                ContentRow::read,
            )
            .optional()?;
        row.map(|content| {
            Ok(PendingChange {
                template_id: id,
                content: content.into_content("pending_changes")?,
            })
        })
        .transpose()
    }

    fn record(&self, id: RecordId) -> StoreResult<Option<ActivityRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM activity_records WHERE id = ?1"),
                params![id.to_string()],
                RecordRow::read,
            )
            .optional()?;
        row.map(RecordRow::into_record).transpose()
    }

    fn records_for_template(&self, id: TemplateId) -> StoreResult<Vec<ActivityRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM activity_records WHERE template_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![id.to_string()], RecordRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }

    fn stage_pending_change(&self, change: PendingChange) -> StoreResult<()> {
        let conn = self.conn.lock();
        let content = EncodedContent::encode(&change.content)?;
        conn.execute(
            "INSERT OR REPLACE INTO pending_changes \
             (template_id, fields, render_implementation, sample_data) VALUES (?1, ?2, ?3, ?4)",
            params![
                change.template_id.to_string(),
                content.fields,
                change.content.render_implementation,
                content.sample_data,
            ],
        )?;
        Ok(())
    }

    fn mark_read(&self, id: TemplateId, at: DateTime<Utc>) -> StoreResult<Option<Template>> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE templates SET last_read_at = ?1 WHERE id = ?2",
            params![at.timestamp_millis(), id.to_string()],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        load_template(&conn, id)
    }

    fn apply(&self, changes: ChangeSet) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        if let Some(template) = &changes.template {
            upsert_template(&tx, template)?;
        }
        if let Some(snapshot) = &changes.snapshot {
            upsert_snapshot(&tx, snapshot)?;
        }
        if let Some(migration) = &changes.migration {
            insert_migration(&tx, migration)?;
        }
        for record in &changes.records {
            upsert_record(&tx, record)?;
        }
        if let Some(template_id) = changes.clear_pending {
            tx.execute(
                "DELETE FROM pending_changes WHERE template_id = ?1",
                params![template_id.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn load_template(conn: &Connection, id: TemplateId) -> StoreResult<Option<Template>> {
    let row = conn
        .query_row(
            &format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1"),
            params![id.to_string()],
            TemplateRow::read,
        )
        .optional()?;
    row.map(TemplateRow::into_template).transpose()
}

fn upsert_template(conn: &Connection, template: &Template) -> StoreResult<()> {
    let content = EncodedContent::encode(&template.content)?;
    conn.execute(
        &format!("INSERT OR REPLACE INTO templates ({TEMPLATE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            template.id.to_string(),
            template.name,
            template.schema_version,
            content.fields,
            template.content.render_implementation,
            content.sample_data,
            template.component_last_modified_at.map(|t| t.timestamp_millis()),
            template.component_last_read_at.map(|t| t.timestamp_millis()),
        ],
    )?;
    Ok(())
}

fn upsert_snapshot(conn: &Connection, snapshot: &TemplateVersionSnapshot) -> StoreResult<()> {
    let content = EncodedContent::encode(&snapshot.content)?;
    conn.execute(
        "INSERT OR REPLACE INTO template_versions \
         (template_id, version, fields, render_implementation, sample_data) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            snapshot.template_id.to_string(),
            snapshot.version,
            content.fields,
            snapshot.content.render_implementation,
            content.sample_data,
        ],
    )?;
    Ok(())
}

fn insert_migration(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    let result = conn.execute(
        "INSERT INTO migrations (template_id, from_version, to_version, transform_source) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            migration.template_id.to_string(),
            migration.from_version,
            migration.to_version,
            migration.transform_source,
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            Err(StoreError::Conflict(format!(
                "migration from version {} already exists for template {}",
                migration.from_version, migration.template_id
            )))
        }
        Err(err) => Err(err.into()),
    }
}

fn upsert_record(conn: &Connection, record: &ActivityRecord) -> StoreResult<()> {
    conn.execute(
        &format!("INSERT OR REPLACE INTO activity_records ({RECORD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        params![
            record.id.to_string(),
            record.template_id.to_string(),
            record.name,
            record.location_hint,
            serde_json::to_string(&record.data)?,
            record.data_schema_version,
        ],
    )?;
    Ok(())
}

struct EncodedContent {
    fields: String,
    sample_data: String,
}

impl EncodedContent {
    fn encode(content: &TemplateContent) -> StoreResult<Self> {
        Ok(Self {
            fields: serde_json::to_string(&content.fields)?,
            sample_data: serde_json::to_string(&content.sample_data)?,
        })
    }
}

struct ContentRow {
    fields: String,
    render_implementation: String,
    sample_data: String,
}

impl ContentRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            fields: row.get(0)?,
            render_implementation: row.get(1)?,
            sample_data: row.get(2)?,
        })
    }

    fn into_content(self, table: &'static str) -> StoreResult<TemplateContent> {
        Ok(TemplateContent {
            fields: serde_json::from_str(&self.fields)
                .map_err(|e| StoreError::corrupt(table, format!("fields: {e}")))?,
            render_implementation: self.render_implementation,
            sample_data: serde_json::from_str(&self.sample_data)
                .map_err(|e| StoreError::corrupt(table, format!("sample_data: {e}")))?,
        })
    }
}

struct TemplateRow {
    id: String,
    name: String,
    schema_version: u32,
    content: ContentRow,
    last_modified_at: Option<i64>,
    last_read_at: Option<i64>,
}

impl TemplateRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            schema_version: row.get(2)?,
            content: ContentRow {
                fields: row.get(3)?,
                render_implementation: row.get(4)?,
                sample_data: row.get(5)?,
            },
            last_modified_at: row.get(6)?,
            last_read_at: row.get(7)?,
        })
    }

    fn into_template(self) -> StoreResult<Template> {
        Ok(Template {
            id: self
                .id
                .parse()
                .map_err(|e| StoreError::corrupt("templates", format!("id: {e}")))?,
            name: self.name,
            schema_version: self.schema_version,
            content: self.content.into_content("templates")?,
            component_last_modified_at: timestamp(self.last_modified_at)?,
            component_last_read_at: timestamp(self.last_read_at)?,
        })
    }
}

struct RecordRow {
    id: String,
    template_id: String,
    name: String,
    location_hint: Option<String>,
    data: String,
    data_schema_version: u32,
}

impl RecordRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            template_id: row.get(1)?,
            name: row.get(2)?,
            location_hint: row.get(3)?,
            data: row.get(4)?,
            data_schema_version: row.get(5)?,
        })
    }

    fn into_record(self) -> StoreResult<ActivityRecord> {
        Ok(ActivityRecord {
            id: self
                .id
                .parse()
                .map_err(|e| StoreError::corrupt("activity_records", format!("id: {e}")))?,
            template_id: self
                .template_id
                .parse()
                .map_err(|e| StoreError::corrupt("activity_records", format!("template_id: {e}")))?,
            name: self.name,
            location_hint: self.location_hint,
            data: serde_json::from_str(&self.data)
                .map_err(|e| StoreError::corrupt("activity_records", format!("data: {e}")))?,
            data_schema_version: self.data_schema_version,
        })
    }
}

fn timestamp(millis: Option<i64>) -> StoreResult<Option<DateTime<Utc>>> {
    millis
        .map(|ms| {
            DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| StoreError::corrupt("templates", format!("timestamp out of range: {ms}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tmpl_schema::FieldSchema;

    fn template() -> Template {
        Template {
            id: TemplateId::new(),
            name: "Quiz".to_string(),
            schema_version: 1,
            content: TemplateContent::new(vec![
                FieldSchema::short_text("title").required().with_label("Title"),
                FieldSchema::nested_list("steps", vec![FieldSchema::number("weight")]),
            ])
            .with_render_implementation("<h1>{title}</h1>")
            .with_sample_data(json!({"title": "Sample", "steps": []})),
            component_last_modified_at: Some(Utc.timestamp_millis_opt(1_700_000_000_123).unwrap()),
            component_last_read_at: None,
        }
    }

    #[test]
    fn template_roundtrips_with_timestamps() {
        let store = SqliteStore::open_in_memory().unwrap();
        let template = template();
        store
            .apply(ChangeSet::new().with_template(template.clone()).with_snapshot(template.snapshot()))
            .unwrap();

        assert_eq!(store.template(template.id).unwrap(), Some(template.clone()));
        assert_eq!(store.snapshot(template.id, 1).unwrap(), Some(template.snapshot()));
        assert_eq!(store.snapshot(template.id, 2).unwrap(), None);
    }

    #[test]
    fn mark_read_is_a_single_column_update() {
        let store = SqliteStore::open_in_memory().unwrap();
        let template = template();
        let read_at = Utc.timestamp_millis_opt(1_700_000_100_000).unwrap();
        assert_eq!(store.mark_read(template.id, read_at).unwrap(), None);

        store.apply(ChangeSet::new().with_template(template.clone())).unwrap();
        let mut bumped = template.clone();
        bumped.schema_version = 2;
        store.apply(ChangeSet::new().with_template(bumped.clone())).unwrap();

        let stamped = store.mark_read(template.id, read_at).unwrap().unwrap();
        bumped.component_last_read_at = Some(read_at);
        assert_eq!(stamped, bumped);
        assert_eq!(store.template(template.id).unwrap(), Some(bumped));
    }

    #[test]
    fn unrecognised_field_kinds_survive_storage() {
        let store = SqliteStore::open_in_memory().unwrap();
        let loc: FieldSchema = serde_json::from_value(
            json!({"id": "loc", "kind": "geo-point", "required": true, "precision": 6}),
        )
        .unwrap();
        let mut template = template();
        template.content.fields.push(loc.clone());
        store.apply(ChangeSet::new().with_template(template.clone())).unwrap();

        let loaded = store.template(template.id).unwrap().unwrap();
        assert_eq!(loaded.content.fields[2], loc);
        assert_eq!(
            serde_json::to_value(&loaded.content.fields[2]).unwrap(),
            json!({"id": "loc", "kind": "geo-point", "required": true, "precision": 6})
        );
    }

    #[test]
    fn failed_apply_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let template = template();
        store
            .apply(ChangeSet::new().with_migration(Migration::step(template.id, 1, "data")))
            .unwrap();

        let err = store
            .apply(
                ChangeSet::new()
                    .with_template(template.clone())
                    .with_migration(Migration::step(template.id, 1, "data")),
            )
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.template(template.id).unwrap(), None);
    }

    #[test]
    fn corrupt_json_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = TemplateId::new();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO pending_changes VALUES (?1, 'not json', '', '{}')",
                params![id.to_string()],
            )
            .unwrap();

        let err = store.pending_change(id).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { table: "pending_changes", .. }));
    }
}
