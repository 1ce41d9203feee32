//! In-memory store

use crate::error::{StoreError, StoreResult};
use crate::model::{
    ActivityRecord, Migration, PendingChange, RecordId, Template, TemplateId,
    TemplateVersionSnapshot,
};
use crate::store::{ChangeSet, TemplateStore};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct Tables {
    templates: HashMap<TemplateId, Template>,
    snapshots: BTreeMap<(TemplateId, u32), TemplateVersionSnapshot>,
    migrations: BTreeMap<(TemplateId, u32), Migration>,
    pending: HashMap<TemplateId, PendingChange>,
    records: BTreeMap<RecordId, ActivityRecord>,
}

/// Store keeping every table in process memory
///
/// A single lock guards all tables, so [`TemplateStore::apply`] is atomic
/// with respect to every reader.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemplateStore for MemoryStore {
    fn template(&self, id: TemplateId) -> StoreResult<Option<Template>> {
        Ok(self.tables.read().templates.get(&id).cloned())
    }

    fn snapshot(&self, id: TemplateId, version: u32) -> StoreResult<Option<TemplateVersionSnapshot>> {
        Ok(self.tables.read().snapshots.get(&(id, version)).cloned())
    }

    fn snapshots(&self, id: TemplateId) -> StoreResult<Vec<TemplateVersionSnapshot>> {
        let tables = self.tables.read();
        Ok(tables
            .snapshots
            .range((id, 0)..=(id, u32::MAX))
            .map(|(_, snapshot)| snapshot.clone())
            .collect())
    }

    fn migrations(&self, id: TemplateId) -> StoreResult<Vec<Migration>> {
        let tables = self.tables.read();
        Ok(tables
            .migrations
            .range((id, 0)..=(id, u32::MAX))
            .map(|(_, migration)| migration.clone())
            .collect())
    }

    fn pending_change(&self, id: TemplateId) -> StoreResult<Option<PendingChange>> {
        Ok(self.tables.read().pending.get(&id).cloned())
    }

    fn record(&self, id: RecordId) -> StoreResult<Option<ActivityRecord>> {
        Ok(self.tables.read().records.get(&id).cloned())
    }

    fn records_for_template(&self, id: TemplateId) -> StoreResult<Vec<ActivityRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .records
            .values()
            .filter(|record| record.template_id == id)
            .cloned()
            .collect())
    }

    fn stage_pending_change(&self, change: PendingChange) -> StoreResult<()> {
        self.tables.write().pending.insert(change.template_id, change);
        Ok(())
    }

    fn mark_read(&self, id: TemplateId, at: DateTime<Utc>) -> StoreResult<Option<Template>> {
        let mut tables = self.tables.write();
        Ok(tables.templates.get_mut(&id).map(|template| {
            template.mark_read(at);
            template.clone()
        }))
    }

    fn apply(&self, changes: ChangeSet) -> StoreResult<()> {
        let mut tables = self.tables.write();

        // Reject before touching anything
        if let Some(migration) = &changes.migration {
            if tables
                .migrations
                .contains_key(&(migration.template_id, migration.from_version))
            {
                return Err(StoreError::Conflict(format!(
                    "migration from version {} already exists for template {}",
                    migration.from_version, migration.template_id
                )));
            }
        }

        if let Some(template) = changes.template {
            tables.templates.insert(template.id, template);
        }
        if let Some(snapshot) = changes.snapshot {
            tables
                .snapshots
                .insert((snapshot.template_id, snapshot.version), snapshot);
        }
        if let Some(migration) = changes.migration {
            tables
                .migrations
                .insert((migration.template_id, migration.from_version), migration);
        }
        for record in changes.records {
            tables.records.insert(record.id, record);
        }
        if let Some(template_id) = changes.clear_pending {
            tables.pending.remove(&template_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TemplateContent;
    use serde_json::json;
    use tmpl_schema::FieldSchema;

    fn template(id: TemplateId, version: u32) -> Template {
        Template {
            id,
            name: "Quiz".to_string(),
            schema_version: version,
            content: TemplateContent::new(vec![FieldSchema::short_text("title")]),
            component_last_modified_at: None,
            component_last_read_at: None,
        }
    }

    #[test]
    fn duplicate_migration_leaves_store_untouched() {
        let store = MemoryStore::new();
        let id = TemplateId::new();
        store
            .apply(ChangeSet::new().with_migration(Migration::step(id, 1, "data")))
            .unwrap();

        let err = store
            .apply(
                ChangeSet::new()
                    .with_template(template(id, 2))
                    .with_migration(Migration::step(id, 1, "other")),
            )
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.template(id).unwrap().is_none());
        assert_eq!(store.migrations(id).unwrap()[0].transform_source, "data");
    }

    #[test]
    fn ranges_are_scoped_to_template() {
        let store = MemoryStore::new();
        let (a, b) = (TemplateId::new(), TemplateId::new());
        for (id, version) in [(a, 2), (b, 1), (a, 1)] {
            store
                .apply(ChangeSet::new().with_snapshot(template(id, version).snapshot()))
                .unwrap();
        }

        let versions: Vec<u32> = store.snapshots(a).unwrap().iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(store.snapshots(b).unwrap().len(), 1);
    }

    #[test]
    fn mark_read_touches_only_the_read_stamp() {
        let store = MemoryStore::new();
        let id = TemplateId::new();
        let at = chrono::DateTime::UNIX_EPOCH;
        assert_eq!(store.mark_read(id, at).unwrap(), None);

        store.apply(ChangeSet::new().with_template(template(id, 1))).unwrap();
        // Another writer lands after our load
        store.apply(ChangeSet::new().with_template(template(id, 2))).unwrap();

        let stamped = store.mark_read(id, at).unwrap().unwrap();
        assert_eq!(stamped.schema_version, 2);
        assert_eq!(stamped.component_last_read_at, Some(at));
        assert_eq!(store.template(id).unwrap(), Some(stamped));
    }

    #[test]
    fn pending_change_is_replaced_and_cleared() {
        let store = MemoryStore::new();
        let id = TemplateId::new();
        for title in ["first", "second"] {
            store
                .stage_pending_change(PendingChange {
                    template_id: id,
                    content: TemplateContent::new(vec![]).with_sample_data(json!({"title": title})),
                })
                .unwrap();
        }
        let pending = store.pending_change(id).unwrap().unwrap();
        assert_eq!(pending.content.sample_data["title"], "second");

        store.apply(ChangeSet::new().clearing_pending(id)).unwrap();
        assert!(store.pending_change(id).unwrap().is_none());
    }
}
