//! Property tests for schema diffing and validation

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use tmpl_schema::{has_structural_change, FieldKind, FieldSchema, SchemaValidator};

fn leaf_kind() -> impl Strategy<Value = FieldKind> {
    prop_oneof![
        Just(FieldKind::ShortText),
        Just(FieldKind::LongText),
        Just(FieldKind::Color),
        Just(FieldKind::Boolean),
        Just(FieldKind::unknown("geo-point")),
        prop::collection::vec("[a-d]", 0..3)
            .prop_map(|options| FieldKind::EnumeratedChoice { options }),
        (prop::option::of(-10i32..0), prop::option::of(0i32..10)).prop_map(|(min, max)| {
            FieldKind::Number {
                min: min.map(f64::from),
                max: max.map(f64::from),
            }
        }),
    ]
}

fn field() -> impl Strategy<Value = FieldSchema> {
    let leaf = ("[a-z]{1,6}", leaf_kind(), any::<bool>()).prop_map(|(id, kind, required)| {
        FieldSchema {
            required,
            ..FieldSchema::new(id, kind)
        }
    });

    leaf.prop_recursive(3, 24, 4, |inner| {
        ("[a-z]{1,6}", prop::collection::vec(inner, 0..4), any::<bool>()).prop_map(
            |(id, fields, required)| FieldSchema {
                required,
                ..FieldSchema::nested_list(id, unique_ids(fields))
            },
        )
    })
}

fn fields() -> impl Strategy<Value = Vec<FieldSchema>> {
    prop::collection::vec(field(), 0..5).prop_map(unique_ids)
}

/// Sibling ids are unique in well-formed schemas
fn unique_ids(fields: Vec<FieldSchema>) -> Vec<FieldSchema> {
    let mut seen = std::collections::HashSet::new();
    fields
        .into_iter()
        .filter(|f| seen.insert(f.id.clone()))
        .collect()
}

/// Values that mostly fit the schema, sometimes not
fn value_for(field: &FieldSchema) -> BoxedStrategy<Option<Value>> {
    let value: BoxedStrategy<Value> = match &field.kind {
        FieldKind::ShortText | FieldKind::LongText | FieldKind::Color => {
            "[a-z]{0,5}".prop_map(Value::from).boxed()
        }
        FieldKind::Boolean => any::<bool>().prop_map(Value::from).boxed(),
        FieldKind::Number { .. } => (-20i32..20).prop_map(Value::from).boxed(),
        FieldKind::EnumeratedChoice { options } if !options.is_empty() => {
            prop::sample::select(options.clone()).prop_map(Value::from).boxed()
        }
        FieldKind::EnumeratedChoice { .. } => "[a-z]{0,3}".prop_map(Value::from).boxed(),
        FieldKind::NestedList { fields } => prop::collection::vec(object_for(fields), 0..3)
            .prop_map(Value::from)
            .boxed(),
        FieldKind::Unknown { .. } => prop_oneof![Just(json!(1)), Just(json!("x")), Just(json!({"a": []}))]
            .boxed(),
    };

    prop_oneof![
        6 => value.prop_map(Some),
        1 => Just(None),
        1 => Just(Some(Value::Null)),
        1 => Just(Some(json!(["unexpected"]))),
    ]
    .boxed()
}

fn object_for(fields: &[FieldSchema]) -> BoxedStrategy<Value> {
    let ids: Vec<String> = fields.iter().map(|f| f.id.clone()).collect();
    let values: Vec<BoxedStrategy<Option<Value>>> = fields.iter().map(value_for).collect();

    values
        .prop_map(move |values| {
            let mut object = Map::new();
            for (id, value) in ids.iter().zip(values) {
                if let Some(value) = value {
                    object.insert(id.clone(), value);
                }
            }
            Value::Object(object)
        })
        .boxed()
}

fn decorate(fields: &[FieldSchema], label: &str) -> Vec<FieldSchema> {
    fields
        .iter()
        .map(|field| {
            let mut field = field
                .clone()
                .with_label(label)
                .with_placeholder(format!("{label}..."))
                .with_default(json!(label));
            if let FieldKind::NestedList { fields } = &mut field.kind {
                *fields = decorate(fields, label);
            }
            field
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_diff_is_reflexive(fields in fields()) {
        prop_assert!(!has_structural_change(&fields, &fields));
    }

    #[test]
    fn prop_cosmetic_edits_never_change_structure(fields in fields(), label in "[A-Za-z ]{0,12}") {
        let decorated = decorate(&fields, &label);
        prop_assert!(!has_structural_change(&fields, &decorated));
        prop_assert!(!has_structural_change(&decorated, &fields));
    }

    #[test]
    fn prop_validation_is_idempotent(
        (fields, data) in fields().prop_flat_map(|fields| {
            let data = object_for(&fields);
            (Just(fields), data)
        })
    ) {
        let validator = SchemaValidator::new();
        if let Ok(normalized) = validator.validate(&data, &fields) {
            let again = validator.validate(&normalized, &fields);
            prop_assert_eq!(again, Ok(normalized));
        }
    }
}

#[test]
fn adding_a_field_is_structural() {
    let old = vec![FieldSchema::short_text("title").required()];
    let mut new = old.clone();
    new.push(FieldSchema::long_text("body"));
    assert!(has_structural_change(&old, &new));
}
