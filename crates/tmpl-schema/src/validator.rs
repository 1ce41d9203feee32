//! Structural validation of record data against a field schema
//!
//! [`SchemaValidator::validate`] checks a JSON value against a list of
//! [`FieldSchema`]s and returns the normalized record: an object keyed by
//! field id containing only the fields the schema declares. Errors are
//! collected for every offending field rather than stopping at the first,
//! so an automated editor can repair all of them in one pass.

use crate::field::{FieldKind, FieldSchema};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

/// Default cap on nested-list depth
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// One field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Location of the offending value, e.g. `steps[1].title`
    pub path: String,
    /// What is wrong with it
    pub message: String,
}

impl FieldError {
    /// Create new field error
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Field errors collected from one validation pass
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} validation error(s): {}", .0.len(), join(.0))]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// Wrap a list of errors
    #[inline]
    #[must_use]
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }

    /// Single error at `path`
    #[inline]
    #[must_use]
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![FieldError::new(path, message)])
    }

    /// Individual errors
    #[inline]
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// Number of errors
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether any error points at `path`
    #[must_use]
    pub fn has_path(&self, path: &str) -> bool {
        self.0.iter().any(|e| e.path == path)
    }
}

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl IntoIterator for ValidationErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Path of a value inside a record
#[derive(Debug, Clone, Default)]
struct ValuePath(Vec<Segment>);

#[derive(Debug, Clone)]
enum Segment {
    Key(String),
    Index(usize),
}

impl ValuePath {
    fn key(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.0.push(Segment::Key(key.to_string()));
        next
    }

    fn index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.0.push(Segment::Index(index));
        next
    }
}

impl Display for ValuePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => f.write_str(key)?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Validator for record data
///
/// Kind rules:
/// - short-text, long-text, color: string
/// - number: numeric, inside `min`/`max` when set
/// - boolean: bool
/// - enumerated-choice: one of `options` (any string when `options` is empty)
/// - nested-list: array of objects, each validated against the item fields
/// - unknown: anything
///
/// Absent or `null` values fail only for required fields.
#[derive(Debug, Clone, Copy)]
pub struct SchemaValidator {
    max_depth: usize,
}

impl SchemaValidator {
    /// Create validator with the default depth cap
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Create validator with an explicit nested-list depth cap
    #[inline]
    #[must_use]
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Configured nested-list depth cap
    #[inline]
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Validate `data` against `fields`
    ///
    /// # Errors
    /// Returns every field-level failure found
    pub fn validate(&self, data: &Value, fields: &[FieldSchema]) -> Result<Value, ValidationErrors> {
        let mut errors = Vec::new();
        let normalized = self.validate_object(data, fields, &ValuePath::default(), 0, &mut errors);

        if errors.is_empty() {
            Ok(normalized)
        } else {
            tracing::debug!(count = errors.len(), "record failed schema validation");
            Err(ValidationErrors(errors))
        }
    }

    fn validate_object(
        &self,
        data: &Value,
        fields: &[FieldSchema],
        path: &ValuePath,
        depth: usize,
        errors: &mut Vec<FieldError>,
    ) -> Value {
        let Some(object) = data.as_object() else {
            errors.push(FieldError::new(
                path.to_string(),
                format!("expected object, got {}", type_name(data)),
            ));
            return Value::Null;
        };

        let mut normalized = Map::new();
        for field in fields {
            let field_path = path.key(&field.id);
            match object.get(&field.id) {
                None | Some(Value::Null) if field.required => {
                    errors.push(FieldError::new(field_path.to_string(), "required field is missing"));
                }
                None => {}
                Some(Value::Null) => {
                    normalized.insert(field.id.clone(), Value::Null);
                }
                Some(value) => {
                    let checked = self.validate_value(value, field, &field_path, depth, errors);
                    normalized.insert(field.id.clone(), checked);
                }
            }
        }

        Value::Object(normalized)
    }

    fn validate_value(
        &self,
        value: &Value,
        field: &FieldSchema,
        path: &ValuePath,
        depth: usize,
        errors: &mut Vec<FieldError>,
    ) -> Value {
        let fail = |errors: &mut Vec<FieldError>, message: String| {
            errors.push(FieldError::new(path.to_string(), message));
        };

        match &field.kind {
            FieldKind::ShortText | FieldKind::LongText | FieldKind::Color => {
                if !value.is_string() {
                    fail(errors, format!("expected string, got {}", type_name(value)));
                }
            }
            FieldKind::Boolean => {
                if !value.is_boolean() {
                    fail(errors, format!("expected boolean, got {}", type_name(value)));
                }
            }
            FieldKind::Number { min, max } => match value.as_f64() {
                None => fail(errors, format!("expected number, got {}", type_name(value))),
                Some(n) => {
                    if let Some(min) = min.filter(|min| n < *min) {
                        fail(errors, format!("must be at least {min}, got {n}"));
                    }
                    if let Some(max) = max.filter(|max| n > *max) {
                        fail(errors, format!("must be at most {max}, got {n}"));
                    }
                }
            },
            FieldKind::EnumeratedChoice { options } => match value.as_str() {
                None => fail(errors, format!("expected string, got {}", type_name(value))),
                Some(choice) if !options.is_empty() && !options.iter().any(|o| o == choice) => {
                    fail(errors, format!("must be one of [{}], got \"{choice}\"", options.join(", ")));
                }
                Some(_) => {}
            },
            FieldKind::NestedList { fields } => {
                let Some(items) = value.as_array() else {
                    fail(errors, format!("expected array, got {}", type_name(value)));
                    return value.clone();
                };
                if depth + 1 > self.max_depth {
                    fail(errors, format!("nested lists deeper than {} levels", self.max_depth));
                    return value.clone();
                }
                let normalized = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.validate_object(item, fields, &path.index(i), depth + 1, errors))
                    .collect();
                return Value::Array(normalized);
            }
            FieldKind::Unknown { .. } => {}
        }

        value.clone()
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate with the default validator
///
/// # Errors
/// Returns every field-level failure found
#[inline]
pub fn validate(data: &Value, fields: &[FieldSchema]) -> Result<Value, ValidationErrors> {
    SchemaValidator::new().validate(data, fields)
}

/// Check a schema definition for authoring mistakes
///
/// Rejects empty ids, duplicate sibling ids, and number fields whose `min`
/// exceeds `max`. Depth is not checked here; records are depth-checked at
/// validation time.
///
/// # Errors
/// Returns every problem found, with the field's path
pub fn check_schema(fields: &[FieldSchema]) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    check_siblings(fields, &ValuePath::default(), &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

fn check_siblings(fields: &[FieldSchema], path: &ValuePath, errors: &mut Vec<FieldError>) {
    let mut seen = HashSet::new();
    for field in fields {
        let field_path = path.key(&field.id);
        if field.id.trim().is_empty() {
            errors.push(FieldError::new(path.to_string(), "field id must not be empty"));
        } else if !seen.insert(field.id.as_str()) {
            errors.push(FieldError::new(field_path.to_string(), "duplicate field id"));
        }
        match &field.kind {
            FieldKind::Number {
                min: Some(min),
                max: Some(max),
            } if min > max => {
                errors.push(FieldError::new(
                    field_path.to_string(),
                    format!("min {min} is greater than max {max}"),
                ));
            }
            FieldKind::NestedList { fields } => check_siblings(fields, &field_path, errors),
            _ => {}
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn lesson_fields() -> Vec<FieldSchema> {
        vec![
            FieldSchema::short_text("title").required(),
            FieldSchema::number("minutes").with_range(Some(1.0), Some(90.0)),
            FieldSchema::choice("level", ["easy", "hard"]),
            FieldSchema::nested_list(
                "steps",
                vec![
                    FieldSchema::long_text("body").required(),
                    FieldSchema::boolean("optional"),
                ],
            ),
        ]
    }

    #[test]
    fn accepts_valid_record_and_drops_unknown_keys() {
        let data = json!({
            "title": "Fractions",
            "minutes": 30,
            "level": "easy",
            "steps": [{"body": "Cut the pie", "optional": false, "extra": 1}],
            "stray": true
        });

        let normalized = validate(&data, &lesson_fields()).unwrap();
        assert_eq!(
            normalized,
            json!({
                "title": "Fractions",
                "minutes": 30,
                "level": "easy",
                "steps": [{"body": "Cut the pie", "optional": false}]
            })
        );
    }

    #[test]
    fn reports_every_failure_with_paths() {
        let data = json!({
            "minutes": 120,
            "level": "medium",
            "steps": [{"body": "ok"}, {"optional": "yes"}]
        });

        let errors = validate(&data, &lesson_fields()).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.has_path("title"));
        assert!(errors.has_path("minutes"));
        assert!(errors.has_path("level"));
        assert!(errors.has_path("steps[1].body"));
        assert!(errors.has_path("steps[1].optional"));
    }

    #[test]
    fn optional_null_passes_required_null_fails() {
        let fields = vec![
            FieldSchema::short_text("a").required(),
            FieldSchema::short_text("b"),
        ];
        let errors = validate(&json!({"a": null, "b": null}), &fields).unwrap_err();
        assert_eq!(errors.errors(), &[FieldError::new("a", "required field is missing")]);

        let ok = validate(&json!({"a": "x", "b": null}), &fields).unwrap();
        assert_eq!(ok, json!({"a": "x", "b": null}));
    }

    #[test]
    fn empty_options_accept_any_string() {
        let fields = vec![FieldSchema::choice("tag", Vec::<String>::new())];
        assert!(validate(&json!({"tag": "anything"}), &fields).is_ok());
        assert!(validate(&json!({"tag": 3}), &fields).is_err());
    }

    #[test]
    fn unknown_kind_accepts_anything() {
        let fields = vec![FieldSchema::new("geo", FieldKind::unknown("geo-point")).required()];
        let data = json!({"geo": {"lat": 1.5, "lng": 2.5}});
        assert_eq!(validate(&data, &fields).unwrap(), data);
    }

    #[test]
    fn non_object_root_is_rejected() {
        let errors = validate(&json!([1, 2]), &lesson_fields()).unwrap_err();
        assert_eq!(errors.errors()[0].message, "expected object, got array");
        assert_eq!(errors.to_string(), "1 validation error(s): expected object, got array");
    }

    #[test]
    fn depth_cap_is_enforced() {
        let inner = FieldSchema::nested_list("inner", vec![FieldSchema::short_text("x")]);
        let fields = vec![FieldSchema::nested_list("outer", vec![inner])];
        let data = json!({"outer": [{"inner": [{"x": "deep"}]}]});

        assert!(SchemaValidator::with_max_depth(2).validate(&data, &fields).is_ok());

        let errors = SchemaValidator::with_max_depth(1)
            .validate(&data, &fields)
            .unwrap_err();
        assert!(errors.has_path("outer[0].inner"));
    }

    #[test]
    fn check_schema_flags_authoring_mistakes() {
        let fields = vec![
            FieldSchema::short_text("title"),
            FieldSchema::short_text("title"),
            FieldSchema::number("n").with_range(Some(5.0), Some(1.0)),
            FieldSchema::nested_list("items", vec![FieldSchema::boolean(" ")]),
        ];

        let errors = check_schema(&fields).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.has_path("title"));
        assert!(errors.has_path("n"));
        assert!(errors.has_path("items"));
        assert!(check_schema(&lesson_fields()).is_ok());
    }
}
