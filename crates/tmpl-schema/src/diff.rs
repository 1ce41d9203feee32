//! Structural diff between two field schemas
//!
//! Decides whether a schema edit changes the shape of stored data. Fields
//! are compared positionally by parallel traversal; an edit that moves a
//! field counts as a change at every shifted position.
//!
//! Only shape-relevant attributes participate: `id`, `kind`, `required`,
//! the sorted `options` of enumerated choices, `min`/`max` of numbers and,
//! recursively, the item fields of nested lists. `label`, `placeholder`
//! and `default_value` are ignored.

use crate::field::{FieldKind, FieldSchema};
use std::fmt::{self, Display, Formatter};

/// Why a position in the schema counts as changed
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeReason {
    /// Sibling list grew or shrank
    LengthChanged {
        /// Old field count
        old: usize,
        /// New field count
        new: usize,
    },
    /// Field id differs
    IdChanged {
        /// Old id
        old: String,
        /// New id
        new: String,
    },
    /// Field kind differs
    KindChanged {
        /// Old kind name
        old: String,
        /// New kind name
        new: String,
    },
    /// Required flag flipped
    RequiredChanged {
        /// New value of the flag
        required: bool,
    },
    /// Allowed options differ
    OptionsChanged {
        /// Old options, sorted
        old: Vec<String>,
        /// New options, sorted
        new: Vec<String>,
    },
    /// Numeric bounds differ
    RangeChanged {
        /// Old `(min, max)`
        old: (Option<f64>, Option<f64>),
        /// New `(min, max)`
        new: (Option<f64>, Option<f64>),
    },
}

impl Display for ChangeReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthChanged { old, new } => write!(f, "field count changed from {old} to {new}"),
            Self::IdChanged { old, new } => write!(f, "id changed from '{old}' to '{new}'"),
            Self::KindChanged { old, new } => write!(f, "kind changed from {old} to {new}"),
            Self::RequiredChanged { required: true } => f.write_str("field became required"),
            Self::RequiredChanged { required: false } => f.write_str("field became optional"),
            Self::OptionsChanged { old, new } => {
                write!(f, "options changed from [{}] to [{}]", old.join(", "), new.join(", "))
            }
            Self::RangeChanged { old, new } => {
                write!(f, "range changed from {} to {}", fmt_range(*old), fmt_range(*new))
            }
        }
    }
}

fn fmt_range((min, max): (Option<f64>, Option<f64>)) -> String {
    let bound = |b: Option<f64>| b.map_or_else(|| "..".to_string(), |v| v.to_string());
    format!("[{}, {}]", bound(min), bound(max))
}

/// A single structural change at a schema position
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaChange {
    /// Position, e.g. `steps.title` or `steps` for list-level changes
    pub path: String,
    /// What changed
    pub reason: ChangeReason,
}

impl Display for SchemaChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{}: {}", self.path, self.reason)
        }
    }
}

/// Check whether `new` changes the data shape described by `old`
#[must_use]
pub fn has_structural_change(old: &[FieldSchema], new: &[FieldSchema]) -> bool {
    let mut changes = Vec::new();
    diff_siblings(old, new, "", &mut changes, true);
    !changes.is_empty()
}

/// List every structural change between `old` and `new`
#[must_use]
pub fn structural_changes(old: &[FieldSchema], new: &[FieldSchema]) -> Vec<SchemaChange> {
    let mut changes = Vec::new();
    diff_siblings(old, new, "", &mut changes, false);
    changes
}

/// Returns `true` when the traversal should stop early
fn diff_siblings(
    old: &[FieldSchema],
    new: &[FieldSchema],
    parent: &str,
    changes: &mut Vec<SchemaChange>,
    first_only: bool,
) -> bool {
    if old.len() != new.len() {
        changes.push(SchemaChange {
            path: parent.to_string(),
            reason: ChangeReason::LengthChanged {
                old: old.len(),
                new: new.len(),
            },
        });
        if first_only {
            return true;
        }
    }

    for (before, after) in old.iter().zip(new) {
        let path = if parent.is_empty() {
            before.id.clone()
        } else {
            format!("{parent}.{}", before.id)
        };
        if diff_field(before, after, &path, changes, first_only) {
            return true;
        }
    }

    false
}

fn diff_field(
    old: &FieldSchema,
    new: &FieldSchema,
    path: &str,
    changes: &mut Vec<SchemaChange>,
    first_only: bool,
) -> bool {
    if old.id != new.id
        && record(changes, path, first_only, ChangeReason::IdChanged {
            old: old.id.clone(),
            new: new.id.clone(),
        })
    {
        return true;
    }
    if old.required != new.required
        && record(changes, path, first_only, ChangeReason::RequiredChanged {
            required: new.required,
        })
    {
        return true;
    }

    match (&old.kind, &new.kind) {
        (FieldKind::EnumeratedChoice { options: a }, FieldKind::EnumeratedChoice { options: b }) => {
            let (a, b) = (sorted(a), sorted(b));
            a != b && record(changes, path, first_only, ChangeReason::OptionsChanged { old: a, new: b })
        }
        (
            FieldKind::Number { min: a_min, max: a_max },
            FieldKind::Number { min: b_min, max: b_max },
        ) => {
            (a_min != b_min || a_max != b_max)
                && record(changes, path, first_only, ChangeReason::RangeChanged {
                    old: (*a_min, *a_max),
                    new: (*b_min, *b_max),
                })
        }
        (FieldKind::NestedList { fields: a }, FieldKind::NestedList { fields: b }) => {
            diff_siblings(a, b, path, changes, first_only)
        }
        (a, b) if a.name() != b.name() => record(changes, path, first_only, ChangeReason::KindChanged {
            old: a.name().to_string(),
            new: b.name().to_string(),
        }),
        _ => false,
    }
}

/// Record a change; returns `true` when the traversal should stop
fn record(
    changes: &mut Vec<SchemaChange>,
    path: &str,
    first_only: bool,
    reason: ChangeReason,
) -> bool {
    changes.push(SchemaChange {
        path: path.to_string(),
        reason,
    });
    first_only
}

fn sorted(options: &[String]) -> Vec<String> {
    let mut options = options.to_vec();
    options.sort();
    options
}
