//! Property tests for migration chain resolution

use proptest::prelude::*;
use serde_json::{Map, Value};
use tmpl_engine::{ChainError, ChainResolver};
use tmpl_sandbox::{MigrationSandbox, SandboxLimits};
use tmpl_schema::SchemaValidator;
use tmpl_store::{ChangeSet, MemoryStore, Migration, TemplateId, TemplateStore};

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-z ]{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn resolver(store: &MemoryStore) -> ChainResolver<'_, MemoryStore> {
    ChainResolver::new(
        store,
        MigrationSandbox::new(SandboxLimits::default().with_timeout_ms(1_000)),
        SchemaValidator::new(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_same_version_is_identity(data in json_value(), version in 0u32..1_000) {
        let store = MemoryStore::new();
        let outcome = resolver(&store).migrate(TemplateId::new(), &data, version, version).unwrap();
        prop_assert_eq!(outcome.data, data);
        prop_assert_eq!(outcome.steps_applied, 0);
    }

    #[test]
    fn prop_downgrade_is_identity(data in json_value(), to in 1u32..50, extra in 1u32..50) {
        let store = MemoryStore::new();
        let outcome = resolver(&store).migrate(TemplateId::new(), &data, to + extra, to).unwrap();
        prop_assert_eq!(outcome.data, data);
        prop_assert_eq!(outcome.steps_applied, 0);
    }
}

proptest! {
    // Each step spawns a sandbox worker
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_gap_is_named_exactly((steps, gap) in (2u32..6).prop_flat_map(|n| (Just(n), 1..=n))) {
        let store = MemoryStore::new();
        let id = TemplateId::new();
        for from in (1..=steps).filter(|v| *v != gap) {
            store.apply(ChangeSet::new().with_migration(Migration::step(id, from, "data"))).unwrap();
        }
        prop_assert_eq!(store.migrations(id).unwrap().len() as u32, steps - 1);

        let err = resolver(&store)
            .migrate(id, &Value::Object(Map::new()), 1, steps + 1)
            .unwrap_err();
        prop_assert!(
            matches!(err, ChainError::MissingMigration { from_version } if from_version == gap),
            "unexpected error: {:?}", err
        );
    }
}
