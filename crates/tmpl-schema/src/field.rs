//! Field schema model
//!
//! A template's input form is described by a list of [`FieldSchema`]s. Each
//! field carries a stable `id`, a [`FieldKind`] with its kind-specific
//! attributes, and presentation-only attributes (`label`, `placeholder`,
//! `default_value`) that never affect the shape of stored data.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};

/// One input field of a template schema
///
/// Serialized as a flat JSON object with a `kind` discriminator:
///
/// ```
/// # use tmpl_schema::{FieldKind, FieldSchema};
/// let field: FieldSchema = serde_json::from_str(
///     r#"{"id": "score", "kind": "number", "required": true, "min": 0, "max": 10}"#,
/// ).unwrap();
/// assert!(field.required);
/// assert_eq!(field.kind, FieldKind::Number { min: Some(0.0), max: Some(10.0) });
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    /// Stable identifier, unique among siblings
    pub id: String,

    /// Data kind and kind-specific attributes
    #[serde(flatten)]
    pub kind: FieldKind,

    /// Whether a value must be present
    #[serde(default)]
    pub required: bool,

    /// Display label (cosmetic)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Input placeholder (cosmetic)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,

    /// Initial value for newly created records (cosmetic for existing data)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

/// Data kind of a field
///
/// Kinds this version does not know deserialize as [`FieldKind::Unknown`],
/// keep their wire name and attributes so they serialize back unchanged,
/// and accept any value.
///
/// ```
/// # use tmpl_schema::FieldSchema;
/// let raw = r#"{"id":"loc","kind":"geo-point","precision":6,"required":true}"#;
/// let field: FieldSchema = serde_json::from_str(raw).unwrap();
/// assert_eq!(field.kind.name(), "geo-point");
/// assert_eq!(serde_json::to_string(&field).unwrap(), raw);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Single-line string
    ShortText,
    /// Multi-line string
    LongText,
    /// One of a fixed set of string options
    EnumeratedChoice {
        /// Allowed values; empty means any string
        options: Vec<String>,
    },
    /// `true` / `false`
    Boolean,
    /// Numeric value with optional inclusive bounds
    Number {
        /// Inclusive lower bound
        min: Option<f64>,
        /// Inclusive upper bound
        max: Option<f64>,
    },
    /// Color string
    Color,
    /// Array of items, each shaped by `fields`
    NestedList {
        /// Shape of one list item
        fields: Vec<FieldSchema>,
    },
    /// Kind not recognised by this version
    Unknown {
        /// Wire name as written
        name: String,
        /// Kind-specific attributes as written
        attributes: Map<String, Value>,
    },
}

impl FieldKind {
    /// Unrecognised kind without attributes
    #[inline]
    #[must_use]
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::Unknown {
            name: name.into(),
            attributes: Map::new(),
        }
    }

    /// Wire name of the kind
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ShortText => "short-text",
            Self::LongText => "long-text",
            Self::EnumeratedChoice { .. } => "enumerated-choice",
            Self::Boolean => "boolean",
            Self::Number { .. } => "number",
            Self::Color => "color",
            Self::NestedList { .. } => "nested-list",
            Self::Unknown { name, .. } => name,
        }
    }

    /// Check whether the kind stores a string
    #[inline]
    #[must_use]
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::ShortText | Self::LongText | Self::Color | Self::EnumeratedChoice { .. }
        )
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for FieldKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("kind", self.name())?;
        match self {
            Self::EnumeratedChoice { options } => map.serialize_entry("options", options)?,
            Self::Number { min, max } => {
                if let Some(min) = min {
                    map.serialize_entry("min", min)?;
                }
                if let Some(max) = max {
                    map.serialize_entry("max", max)?;
                }
            }
            Self::NestedList { fields } => map.serialize_entry("fields", fields)?,
            Self::Unknown { attributes, .. } => {
                for (key, value) in attributes {
                    map.serialize_entry(key, value)?;
                }
            }
            Self::ShortText | Self::LongText | Self::Boolean | Self::Color => {}
        }
        map.end()
    }
}

/// Wire form: the `kind` tag plus whatever attributes sit beside it
#[derive(Deserialize)]
struct RawKind {
    kind: String,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

impl<'de> Deserialize<'de> for FieldKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let RawKind {
            kind,
            mut attributes,
        } = RawKind::deserialize(deserializer)?;

        let kind = match kind.as_str() {
            "short-text" => Self::ShortText,
            "long-text" => Self::LongText,
            "boolean" => Self::Boolean,
            "color" => Self::Color,
            "enumerated-choice" => Self::EnumeratedChoice {
                options: take::<_, D::Error>(&mut attributes, "options")?.unwrap_or_default(),
            },
            "number" => Self::Number {
                min: take::<_, D::Error>(&mut attributes, "min")?,
                max: take::<_, D::Error>(&mut attributes, "max")?,
            },
            "nested-list" => Self::NestedList {
                fields: take::<_, D::Error>(&mut attributes, "fields")?
                    .ok_or_else(|| <D::Error as de::Error>::missing_field("fields"))?,
            },
            _ => Self::Unknown {
                name: kind,
                attributes,
            },
        };
        Ok(kind)
    }
}

/// Remove and decode one attribute; `null` counts as absent
fn take<T: DeserializeOwned, E: de::Error>(
    attributes: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<T>, E> {
    attributes
        .remove(key)
        .filter(|value| !value.is_null())
        .map(|value| {
            serde_json::from_value(value).map_err(|e| E::custom(format!("invalid `{key}`: {e}")))
        })
        .transpose()
}

impl FieldSchema {
    /// Create optional field of the given kind
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            kind,
            required: false,
            label: None,
            placeholder: None,
            default_value: None,
        }
    }

    /// Short text field
    #[inline]
    #[must_use]
    pub fn short_text(id: impl Into<String>) -> Self {
        Self::new(id, FieldKind::ShortText)
    }

    /// Long text field
    #[inline]
    #[must_use]
    pub fn long_text(id: impl Into<String>) -> Self {
        Self::new(id, FieldKind::LongText)
    }

    /// Color field
    #[inline]
    #[must_use]
    pub fn color(id: impl Into<String>) -> Self {
        Self::new(id, FieldKind::Color)
    }

    /// Boolean field
    #[inline]
    #[must_use]
    pub fn boolean(id: impl Into<String>) -> Self {
        Self::new(id, FieldKind::Boolean)
    }

    /// Unbounded number field
    #[inline]
    #[must_use]
    pub fn number(id: impl Into<String>) -> Self {
        Self::new(id, FieldKind::Number { min: None, max: None })
    }

    /// Enumerated choice field
    #[must_use]
    pub fn choice<I, S>(id: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            id,
            FieldKind::EnumeratedChoice {
                options: options.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// Nested list field whose items have `fields`
    #[inline]
    #[must_use]
    pub fn nested_list(id: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self::new(id, FieldKind::NestedList { fields })
    }

    /// Mark field as required
    #[inline]
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set display label
    #[inline]
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set input placeholder
    #[inline]
    #[must_use]
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    /// Set default value for new records
    #[inline]
    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Set numeric bounds
    ///
    /// Has no effect on non-number fields.
    #[inline]
    #[must_use]
    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        if let FieldKind::Number { min: lo, max: hi } = &mut self.kind {
            *lo = min;
            *hi = max;
        }
        self
    }

    /// Item fields for nested lists
    #[inline]
    #[must_use]
    pub fn item_fields(&self) -> Option<&[FieldSchema]> {
        match &self.kind {
            FieldKind::NestedList { fields } => Some(fields),
            _ => None,
        }
    }
}
