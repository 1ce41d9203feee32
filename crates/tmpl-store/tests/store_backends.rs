//! Behaviour shared by every store backend

use pretty_assertions::assert_eq;
use serde_json::json;
use tmpl_schema::FieldSchema;
use tmpl_store::{
    ActivityRecord, ChangeSet, MemoryStore, Migration, PendingChange, RecordId, SqliteStore,
    StoreError, Template, TemplateContent, TemplateId, TemplateStore,
};

fn template(id: TemplateId, version: u32) -> Template {
    Template {
        id,
        name: "Lesson".to_string(),
        schema_version: version,
        content: TemplateContent::new(vec![FieldSchema::short_text("title").required()])
            .with_sample_data(json!({"title": "Sample"})),
        component_last_modified_at: None,
        component_last_read_at: None,
    }
}

fn record(template_id: TemplateId, name: &str, version: u32) -> ActivityRecord {
    ActivityRecord {
        id: RecordId::new(),
        template_id,
        name: name.to_string(),
        location_hint: Some(format!("course/{name}")),
        data: json!({"title": name}),
        data_schema_version: version,
    }
}

fn exercise_version_bump(store: &dyn TemplateStore) {
    let id = TemplateId::new();
    let first = record(id, "intro", 1);
    let second = record(id, "outro", 1);
    store
        .apply(
            ChangeSet::new()
                .with_template(template(id, 1))
                .with_snapshot(template(id, 1).snapshot())
                .with_records([first.clone(), second.clone()]),
        )
        .unwrap();
    store
        .stage_pending_change(PendingChange {
            template_id: id,
            content: TemplateContent::new(vec![FieldSchema::short_text("heading").required()]),
        })
        .unwrap();

    let mut migrated = first.clone();
    migrated.data = json!({"heading": "intro"});
    migrated.data_schema_version = 2;
    store
        .apply(
            ChangeSet::new()
                .with_template(template(id, 2))
                .with_snapshot(template(id, 2).snapshot())
                .with_migration(Migration::step(id, 1, "return #{ heading: data.title };"))
                .with_record(migrated.clone())
                .clearing_pending(id),
        )
        .unwrap();

    assert_eq!(store.template(id).unwrap().map(|t| t.schema_version), Some(2));
    assert_eq!(store.snapshots(id).unwrap().len(), 2);
    assert!(store.pending_change(id).unwrap().is_none());
    assert_eq!(store.record(migrated.id).unwrap(), Some(migrated));
    assert_eq!(store.record(second.id).unwrap(), Some(second));
    assert_eq!(store.records_for_template(id).unwrap().len(), 2);
    assert!(store.records_for_template(TemplateId::new()).unwrap().is_empty());

    let migrations = store.migrations(id).unwrap();
    assert_eq!(migrations.len(), 1);
    assert_eq!((migrations[0].from_version, migrations[0].to_version), (1, 2));

    let err = store
        .apply(ChangeSet::new().with_migration(Migration::step(id, 1, "data")))
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn memory_store_applies_version_bump() {
    exercise_version_bump(&MemoryStore::new());
}

#[test]
fn sqlite_store_applies_version_bump() {
    exercise_version_bump(&SqliteStore::open_in_memory().unwrap());
}

#[test]
fn sqlite_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("templates.db");
    let id = TemplateId::new();
    let rec = record(id, "intro", 1);

    {
        let store = SqliteStore::open(&path).unwrap();
        store
            .apply(ChangeSet::new().with_template(template(id, 1)).with_record(rec.clone()))
            .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.template(id).unwrap(), Some(template(id, 1)));
    assert_eq!(store.records_for_template(id).unwrap(), vec![rec]);
}
