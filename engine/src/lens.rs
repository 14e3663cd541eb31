//! Lens definitions.
//!
//! A [`Lens`] is an ordered pipeline of [`LensOp`]s. Lenses are plain data:
//! they serialize to the JSON lens format (`[{"rename": {...}}, ...]`) and
//! carry no evaluation state. Evaluation lives in [`crate::pipeline`].

use crate::{
    error::Result,
    schema::{JsonType, SchemaFragment},
    value::json_type_of,
    Error,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Operator kinds, used to tag errors and degradations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Remove,
    Rename,
    Hoist,
    Plunge,
    Wrap,
    Head,
    In,
    Map,
    Convert,
    Extract,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OpKind::Add => "add",
            OpKind::Remove => "remove",
            OpKind::Rename => "rename",
            OpKind::Hoist => "hoist",
            OpKind::Plunge => "plunge",
            OpKind::Wrap => "wrap",
            OpKind::Head => "head",
            OpKind::In => "in",
            OpKind::Map => "map",
            OpKind::Convert => "convert",
            OpKind::Extract => "extract",
        };
        f.write_str(name)
    }
}

fn default_required() -> bool {
    true
}

/// A named field with its declared type and default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Field name
    pub name: String,
    /// Declared type; `None` accepts any value
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<JsonType>,
    /// Value used when the field is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Whether the field is listed in the owning schema's `required`
    #[serde(default = "default_required")]
    pub required: bool,
    /// Item schema for array properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<SchemaFragment>,
}

impl Property {
    /// A required property of the given type.
    pub fn new(name: impl Into<String>, property_type: JsonType) -> Self {
        Self {
            name: name.into(),
            property_type: Some(property_type),
            default: None,
            required: true,
            items: None,
        }
    }

    /// A required property without a declared type.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property_type: None,
            default: None,
            required: true,
            items: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_items(mut self, items: SchemaFragment) -> Self {
        self.items = Some(items);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// The declared default, falling back to the zero value of the type.
    pub fn default_value(&self) -> Value {
        match (&self.default, self.property_type) {
            (Some(value), _) => value.clone(),
            (None, Some(t)) => t.default_value(),
            (None, None) => Value::Null,
        }
    }

    /// Whether `value` agrees with the declared type.
    pub fn admits(&self, value: &Value) -> bool {
        self.property_type.map_or(true, |t| t.admits(value))
    }

    /// The schema fragment describing this property.
    pub fn schema(&self) -> SchemaFragment {
        let mut schema = serde_json::Map::new();
        if let Some(t) = self.property_type {
            schema.insert("type".into(), json!(t.as_str()));
        }
        if let Some(default) = &self.default {
            schema.insert("default".into(), default.clone());
        }
        if let Some(items) = &self.items {
            schema.insert("items".into(), items.clone());
        }
        Value::Object(schema)
    }
}

/// What a conversion does with a value that has no mapping entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fallback {
    /// Fail with `UnmappedValue` (default)
    #[default]
    Error,
    /// Pass the value through unchanged
    Identity,
}

/// A finite mapping between scalar values.
///
/// The reverse direction uses `reverse` when given; otherwise it is derived
/// from `forward` by taking the first pair whose destination matches.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueMapping {
    pub forward: Vec<(Value, Value)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse: Option<Vec<(Value, Value)>>,
    #[serde(default)]
    pub fallback: Fallback,
}

impl ValueMapping {
    pub fn new<A, B>(pairs: impl IntoIterator<Item = (A, B)>) -> Self
    where
        A: Into<Value>,
        B: Into<Value>,
    {
        Self {
            forward: pairs
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
            reverse: None,
            fallback: Fallback::Error,
        }
    }

    /// Use an explicit reverse table instead of inverting `forward`.
    pub fn with_reverse<A, B>(mut self, pairs: impl IntoIterator<Item = (A, B)>) -> Self
    where
        A: Into<Value>,
        B: Into<Value>,
    {
        self.reverse = Some(
            pairs
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
        );
        self
    }

    pub fn with_identity_fallback(mut self) -> Self {
        self.fallback = Fallback::Identity;
        self
    }

    pub fn lookup(&self, value: &Value) -> Option<&Value> {
        self.forward.iter().find(|(a, _)| a == value).map(|(_, b)| b)
    }

    pub fn lookup_reverse(&self, value: &Value) -> Option<&Value> {
        match &self.reverse {
            Some(pairs) => pairs.iter().find(|(a, _)| a == value).map(|(_, b)| b),
            None => self.forward.iter().find(|(_, b)| b == value).map(|(a, _)| a),
        }
    }

    /// Lossless when the forward table is injective and the reverse is derived.
    pub fn is_lossless(&self) -> bool {
        if self.reverse.is_some() {
            return false;
        }
        self.forward
            .iter()
            .enumerate()
            .all(|(i, (_, b))| self.forward[..i].iter().all(|(_, other)| other != b))
    }

    /// Types of the mapping's destination values, in first-seen order.
    pub fn range_types(&self) -> Vec<JsonType> {
        distinct_types(self.forward.iter().map(|(_, b)| b))
    }

    /// Types of the mapping's source values, in first-seen order.
    pub fn domain_types(&self) -> Vec<JsonType> {
        match &self.reverse {
            Some(pairs) => distinct_types(pairs.iter().map(|(_, a)| a)),
            None => distinct_types(self.forward.iter().map(|(a, _)| a)),
        }
    }

    /// The same mapping read in the opposite direction.
    pub fn inverted(&self) -> Self {
        let swapped = |pairs: &[(Value, Value)]| -> Vec<(Value, Value)> {
            pairs.iter().map(|(a, b)| (b.clone(), a.clone())).collect()
        };
        match &self.reverse {
            Some(reverse) => Self {
                forward: swapped(reverse),
                reverse: Some(swapped(&self.forward)),
                fallback: self.fallback,
            },
            None => Self {
                forward: swapped(&self.forward),
                reverse: None,
                fallback: self.fallback,
            },
        }
    }
}

fn distinct_types<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<JsonType> {
    let mut out = Vec::new();
    for value in values {
        let t = json_type_of(value);
        if !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

/// A single lens operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensOp {
    Add(Property),
    Remove(Property),
    Rename {
        source: String,
        destination: String,
    },
    Hoist {
        host: String,
        name: String,
    },
    Plunge {
        host: String,
        name: String,
    },
    Wrap {
        name: String,
    },
    Head {
        name: String,
    },
    In {
        name: String,
        lens: Lens,
    },
    Map {
        lens: Lens,
    },
    Convert {
        name: String,
        mapping: ValueMapping,
        #[serde(rename = "sourceType", default, skip_serializing_if = "Option::is_none")]
        source_type: Option<JsonType>,
        #[serde(
            rename = "destinationType",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        destination_type: Option<JsonType>,
    },
    Extract {
        host: String,
        name: String,
        fields: Vec<String>,
    },
}

impl LensOp {
    pub fn kind(&self) -> OpKind {
        match self {
            LensOp::Add(_) => OpKind::Add,
            LensOp::Remove(_) => OpKind::Remove,
            LensOp::Rename { .. } => OpKind::Rename,
            LensOp::Hoist { .. } => OpKind::Hoist,
            LensOp::Plunge { .. } => OpKind::Plunge,
            LensOp::Wrap { .. } => OpKind::Wrap,
            LensOp::Head { .. } => OpKind::Head,
            LensOp::In { .. } => OpKind::In,
            LensOp::Map { .. } => OpKind::Map,
            LensOp::Convert { .. } => OpKind::Convert,
            LensOp::Extract { .. } => OpKind::Extract,
        }
    }

    /// Whether `revert(apply(v))` may differ from `v`.
    ///
    /// Remove needs the stored value from the forward call and Head drops
    /// all but the first element. Extract discards the host field layout and
    /// leaves a link that later edits can break. Convert loses information
    /// when its mapping is not injective.
    pub fn is_lossy(&self) -> bool {
        match self {
            LensOp::Remove(_) | LensOp::Head { .. } | LensOp::Extract { .. } => true,
            LensOp::Convert { mapping, .. } => !mapping.is_lossless(),
            LensOp::In { lens, .. } | LensOp::Map { lens } => lens.is_lossy(),
            _ => false,
        }
    }

    /// The operator whose forward transform is this operator's reverse.
    ///
    /// Extract has no operator counterpart and yields `None`.
    pub fn inverse(&self) -> Option<LensOp> {
        let op = match self {
            LensOp::Add(property) => LensOp::Remove(property.clone()),
            LensOp::Remove(property) => LensOp::Add(property.clone()),
            LensOp::Rename {
                source,
                destination,
            } => LensOp::Rename {
                source: destination.clone(),
                destination: source.clone(),
            },
            LensOp::Hoist { host, name } => LensOp::Plunge {
                host: host.clone(),
                name: name.clone(),
            },
            LensOp::Plunge { host, name } => LensOp::Hoist {
                host: host.clone(),
                name: name.clone(),
            },
            LensOp::Wrap { name } => LensOp::Head { name: name.clone() },
            LensOp::Head { name } => LensOp::Wrap { name: name.clone() },
            LensOp::In { name, lens } => LensOp::In {
                name: name.clone(),
                lens: lens.inverse()?,
            },
            LensOp::Map { lens } => LensOp::Map {
                lens: lens.inverse()?,
            },
            LensOp::Convert {
                name,
                mapping,
                source_type,
                destination_type,
            } => LensOp::Convert {
                name: name.clone(),
                mapping: mapping.inverted(),
                source_type: *destination_type,
                destination_type: *source_type,
            },
            LensOp::Extract { .. } => return None,
        };
        Some(op)
    }
}

/// An ordered pipeline of lens operators.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lens {
    ops: Vec<LensOp>,
}

impl Lens {
    pub fn new(ops: Vec<LensOp>) -> Self {
        Self { ops }
    }

    /// Load a lens from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidLens(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidLens(e.to_string()))
    }

    pub fn ops(&self) -> &[LensOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn push(&mut self, op: LensOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// This lens followed by `next`.
    pub fn then(mut self, next: Lens) -> Self {
        self.ops.extend(next.ops);
        self
    }

    pub fn is_lossy(&self) -> bool {
        self.ops.iter().any(LensOp::is_lossy)
    }

    /// A lens running this one backwards, if every operator has an inverse.
    pub fn inverse(&self) -> Option<Lens> {
        self.ops.iter().rev().map(LensOp::inverse).collect()
    }
}

impl From<Vec<LensOp>> for Lens {
    fn from(ops: Vec<LensOp>) -> Self {
        Self::new(ops)
    }
}

impl FromIterator<LensOp> for Lens {
    fn from_iter<I: IntoIterator<Item = LensOp>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Compose two lenses: `first` followed by `second`.
pub fn compose(first: &Lens, second: &Lens) -> Lens {
    first.clone().then(second.clone())
}

pub fn add_property(property: Property) -> LensOp {
    LensOp::Add(property)
}

pub fn remove_property(property: Property) -> LensOp {
    LensOp::Remove(property)
}

pub fn rename_property(source: impl Into<String>, destination: impl Into<String>) -> LensOp {
    LensOp::Rename {
        source: source.into(),
        destination: destination.into(),
    }
}

pub fn hoist_property(host: impl Into<String>, name: impl Into<String>) -> LensOp {
    LensOp::Hoist {
        host: host.into(),
        name: name.into(),
    }
}

pub fn plunge_property(host: impl Into<String>, name: impl Into<String>) -> LensOp {
    LensOp::Plunge {
        host: host.into(),
        name: name.into(),
    }
}

pub fn wrap_property(name: impl Into<String>) -> LensOp {
    LensOp::Wrap { name: name.into() }
}

pub fn head_property(name: impl Into<String>) -> LensOp {
    LensOp::Head { name: name.into() }
}

/// Run `lens` on the value found at `name`.
pub fn inside(name: impl Into<String>, lens: impl Into<Lens>) -> LensOp {
    LensOp::In {
        name: name.into(),
        lens: lens.into(),
    }
}

/// Run `lens` on every element of the current sequence.
pub fn map(lens: impl Into<Lens>) -> LensOp {
    LensOp::Map { lens: lens.into() }
}

pub fn convert_value(
    name: impl Into<String>,
    mapping: ValueMapping,
    source_type: Option<JsonType>,
    destination_type: Option<JsonType>,
) -> LensOp {
    LensOp::Convert {
        name: name.into(),
        mapping,
        source_type,
        destination_type,
    }
}

pub fn extract<S: Into<String>>(
    host: impl Into<String>,
    name: impl Into<String>,
    fields: impl IntoIterator<Item = S>,
) -> LensOp {
    LensOp::Extract {
        host: host.into(),
        name: name.into(),
        fields: fields.into_iter().map(Into::into).collect(),
    }
}
