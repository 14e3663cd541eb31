//! Patch translation.
//!
//! Rewrites a single structural edit against one side of a lens into the
//! equivalent edits against the other side, by tracing the edit's path
//! through each operator instead of migrating a whole document. Edits whose
//! target does not survive an operator are reported in
//! [`Translation::dropped`] rather than silently discarded.

use crate::{
    config::EngineConfig,
    error::Result,
    lens::{Lens, LensOp, OpKind},
    operator,
    pipeline::{run_doc, Direction, Pass},
    value::{self, Path},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::borrow::Cow;

/// Kind of structural edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchKind {
    Set,
    Insert,
    Delete,
}

/// A structural edit at a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchKind,
    #[serde(with = "pointer_path")]
    pub path: Path,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOp {
    pub fn new(op: PatchKind, path: Path, value: Option<Value>) -> Self {
        Self { op, path, value }
    }

    /// Set the value at a JSON pointer.
    pub fn set(pointer: &str, value: impl Into<Value>) -> Self {
        Self::new(PatchKind::Set, value::parse_pointer(pointer), Some(value.into()))
    }

    /// Insert a value at a JSON pointer.
    pub fn insert(pointer: &str, value: impl Into<Value>) -> Self {
        Self::new(PatchKind::Insert, value::parse_pointer(pointer), Some(value.into()))
    }

    /// Delete the value at a JSON pointer.
    pub fn delete(pointer: &str) -> Self {
        Self::new(PatchKind::Delete, value::parse_pointer(pointer), None)
    }

    fn at(&self, path: Path) -> Self {
        Self::new(self.op, path, self.value.clone())
    }

    fn with_value(&self, path: Path, value: Value) -> Self {
        Self::new(self.op, path, Some(value))
    }

    fn writes(&self) -> bool {
        matches!(self.op, PatchKind::Set | PatchKind::Insert)
    }
}

mod pointer_path {
    use crate::value::{parse_pointer, pointer, Path};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&pointer(path))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Path, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(parse_pointer(&raw))
    }
}

/// Apply an edit to a document. Returns `false` if the target's parent does
/// not exist (or, for deletes, the target itself).
pub fn apply_patch(doc: &mut Value, patch: &PatchOp) -> bool {
    let new = patch.value.clone().unwrap_or(Value::Null);
    match patch.op {
        PatchKind::Set => value::set(doc, &patch.path, new),
        PatchKind::Insert => value::insert(doc, &patch.path, new),
        PatchKind::Delete => value::delete(doc, &patch.path).is_some(),
    }
}

/// An edit that could not be carried across an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedPatch {
    pub patch: PatchOp,
    pub op: OpKind,
    pub reason: String,
}

/// The result of translating one edit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation {
    pub patches: Vec<PatchOp>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DroppedPatch>,
}

impl Translation {
    /// Whether every part of the edit made it across.
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }

    fn prefixed(mut self, prefix: &[String]) -> Self {
        for patch in &mut self.patches {
            patch.path.splice(0..0, prefix.iter().cloned());
        }
        for dropped in &mut self.dropped {
            dropped.patch.path.splice(0..0, prefix.iter().cloned());
        }
        self
    }
}

/// Translate an edit against the source of `lens` into edits against its
/// destination.
pub fn translate(lens: &Lens, patch: &PatchOp) -> Translation {
    translate_with(&EngineConfig::default(), lens, patch, Direction::Forward)
}

/// Translate an edit against the destination of `lens` back to its source.
pub fn translate_reverse(lens: &Lens, patch: &PatchOp) -> Translation {
    translate_with(&EngineConfig::default(), lens, patch, Direction::Reverse)
}

pub(crate) fn translate_with(
    config: &EngineConfig,
    lens: &Lens,
    patch: &PatchOp,
    direction: Direction,
) -> Translation {
    let ops: Vec<Cow<LensOp>> = match direction {
        Direction::Forward => lens.ops().iter().map(Cow::Borrowed).collect(),
        // Walk the mirrored operators. Nested lenses are walked in reverse
        // themselves, and Extract has no mirror so it is traced symmetrically.
        Direction::Reverse => lens
            .ops()
            .iter()
            .rev()
            .map(|op| match op {
                LensOp::In { .. } | LensOp::Map { .. } | LensOp::Extract { .. } => {
                    Cow::Borrowed(op)
                }
                _ => op.inverse().map_or(Cow::Borrowed(op), Cow::Owned),
            })
            .collect(),
    };

    let mut translation = Translation {
        patches: vec![patch.clone()],
        dropped: Vec::new(),
    };
    for op in &ops {
        let pending = std::mem::take(&mut translation.patches);
        for patch in pending {
            let next = step(config, op, patch, direction);
            translation.patches.extend(next.patches);
            translation.dropped.extend(next.dropped);
        }
    }
    translation
}

fn carried(patches: Vec<PatchOp>) -> Translation {
    Translation {
        patches,
        dropped: Vec::new(),
    }
}

fn dropped(patch: PatchOp, op: OpKind, reason: impl Into<String>) -> Translation {
    let reason = reason.into();
    tracing::trace!(op = %op, path = %value::pointer(&patch.path), %reason, "patch dropped");
    Translation {
        patches: Vec::new(),
        dropped: vec![DroppedPatch { patch, op, reason }],
    }
}

/// Carry one edit across one operator of a walk in `direction`.
fn step(config: &EngineConfig, op: &LensOp, patch: PatchOp, direction: Direction) -> Translation {
    let kind = op.kind();
    tracing::trace!(op = %kind, path = %value::pointer(&patch.path), "translating patch");

    if patch.path.is_empty() {
        return whole_scope(config, op, patch, direction);
    }
    let path = patch.path.clone();
    let first = path[0].as_str();
    let rest = &path[1..];

    match op {
        LensOp::Add(_) => carried(vec![patch]),
        LensOp::Remove(property) => {
            if first == property.name {
                dropped(patch, kind, "field is removed")
            } else {
                carried(vec![patch])
            }
        }
        LensOp::Rename {
            source,
            destination,
        } => {
            if first == source {
                carried(vec![patch.at([vec![destination.clone()], rest.to_vec()].concat())])
            } else {
                carried(vec![patch])
            }
        }
        LensOp::Hoist { host, name } => hoist(patch, host, name, first, rest),
        LensOp::Plunge { host, name } => {
            if first == name {
                carried(vec![patch.at([vec![host.clone()], path.clone()].concat())])
            } else if first == host && rest.is_empty() {
                dropped(patch, kind, "host also holds the plunged field")
            } else {
                carried(vec![patch])
            }
        }
        LensOp::Wrap { name } => {
            if first != name {
                return carried(vec![patch]);
            }
            if rest.is_empty() {
                return match patch.value.clone() {
                    Some(v) if patch.writes() => {
                        carried(vec![patch.with_value(path.clone(), json!([v]))])
                    }
                    _ => carried(vec![patch]),
                };
            }
            carried(vec![patch.at([vec![name.clone(), "0".to_string()], rest.to_vec()].concat())])
        }
        LensOp::Head { name } => head(patch, name, first, rest),
        LensOp::In { name, lens } => {
            if first != name {
                return carried(vec![patch]);
            }
            if rest.is_empty() {
                return rerun_value(config, lens, patch, kind, direction);
            }
            let inner = patch.at(rest.to_vec());
            translate_with(config, lens, &inner, direction).prefixed(&path[..1])
        }
        LensOp::Map { lens } => {
            if rest.is_empty() {
                return rerun_value(config, lens, patch, kind, direction);
            }
            let inner = patch.at(rest.to_vec());
            translate_with(config, lens, &inner, direction).prefixed(&path[..1])
        }
        LensOp::Convert { name, .. } => {
            if first != name || !rest.is_empty() || !patch.writes() {
                return carried(vec![patch]);
            }
            let mut scratch = Map::new();
            scratch.insert(name.clone(), patch.value.clone().unwrap_or(Value::Null));
            match rerun_op(config, op, Value::Object(scratch), Direction::Forward) {
                Ok(mut converted) => {
                    let value = converted
                        .as_object_mut()
                        .and_then(|obj| obj.remove(name.as_str()))
                        .unwrap_or(Value::Null);
                    carried(vec![patch.with_value(path.clone(), value)])
                }
                Err(e) => dropped(patch, kind, e.to_string()),
            }
        }
        LensOp::Extract { host, name, fields } => {
            let touches_host = first == host
                && rest
                    .first()
                    .map_or(true, |field| field == name || fields.contains(field));
            if touches_host || is_entity_key(first, name) {
                dropped(patch, kind, "extracted entities depend on the document")
            } else {
                carried(vec![patch])
            }
        }
    }
}

/// An edit replacing the whole scope runs the operator on the new value.
fn whole_scope(config: &EngineConfig, op: &LensOp, patch: PatchOp, direction: Direction) -> Translation {
    let kind = op.kind();
    // Mirrored operators already read forward; the rest follow the walk.
    let direction = match op {
        LensOp::In { .. } | LensOp::Map { .. } | LensOp::Extract { .. } => direction,
        _ => Direction::Forward,
    };
    match (patch.value.clone(), patch.writes()) {
        (Some(v), true) => match rerun_op(config, op, v, direction) {
            Ok(value) => carried(vec![patch.with_value(Vec::new(), value)]),
            Err(e) => dropped(patch, kind, e.to_string()),
        },
        _ => carried(vec![patch]),
    }
}

/// Writes of a whole nested value run the nested lens on that value.
fn rerun_value(
    config: &EngineConfig,
    lens: &Lens,
    patch: PatchOp,
    kind: OpKind,
    direction: Direction,
) -> Translation {
    let Some(v) = patch.value.clone().filter(|_| patch.writes()) else {
        return carried(vec![patch]);
    };
    let mut pass = Pass::new(config, None);
    match run_doc(lens, v, direction, &mut pass) {
        Ok(value) => carried(vec![patch.with_value(patch.path.clone(), value)]),
        Err(e) => dropped(patch, kind, e.to_string()),
    }
}

fn rerun_op(config: &EngineConfig, op: &LensOp, value: Value, direction: Direction) -> Result<Value> {
    let mut pass = Pass::new(config, None);
    match direction {
        Direction::Forward => operator::apply(op, value, &mut pass),
        Direction::Reverse => operator::revert(op, value, &mut pass),
    }
}

fn hoist(patch: PatchOp, host: &str, name: &str, first: &str, rest: &[String]) -> Translation {
    if first != host {
        return carried(vec![patch]);
    }
    if let Some((head, tail)) = rest.split_first() {
        if head == name {
            return carried(vec![patch.at([vec![name.to_string()], tail.to_vec()].concat())]);
        }
        return carried(vec![patch]);
    }

    // The whole host changes: split out the hoisted field.
    let host_path = vec![host.to_string()];
    let name_path = vec![name.to_string()];
    match (patch.value.clone(), patch.writes()) {
        (Some(Value::Object(mut remaining)), true) => {
            let hoisted = remaining.shift_remove(name);
            let mut out = vec![patch.with_value(host_path, Value::Object(remaining))];
            out.push(match hoisted {
                Some(v) => PatchOp::new(PatchKind::Set, name_path, Some(v)),
                None => PatchOp::new(PatchKind::Delete, name_path, None),
            });
            carried(out)
        }
        (_, false) => carried(vec![
            patch,
            PatchOp::new(PatchKind::Delete, name_path, None),
        ]),
        _ => dropped(patch, OpKind::Hoist, "host must be an object"),
    }
}

fn head(patch: PatchOp, name: &str, first: &str, rest: &[String]) -> Translation {
    if first != name {
        return carried(vec![patch]);
    }
    let Some((index, tail)) = rest.split_first() else {
        if !patch.writes() {
            return carried(vec![patch]);
        }
        return match patch.value.clone() {
            Some(Value::Array(mut items)) if !items.is_empty() => {
                carried(vec![patch.with_value(vec![name.to_string()], items.swap_remove(0))])
            }
            Some(Value::Array(_)) => dropped(patch, OpKind::Head, "empty sequence has no first element"),
            _ => dropped(patch, OpKind::Head, "value is not a sequence"),
        };
    };
    if index != "0" {
        return dropped(patch, OpKind::Head, "only the first element is kept");
    }
    let target = [vec![name.to_string()], tail.to_vec()].concat();
    match (patch.op, tail.is_empty()) {
        (PatchKind::Delete, true) => dropped(patch, OpKind::Head, "first element cannot be deleted"),
        (PatchKind::Insert, true) => {
            let value = patch.value.clone().unwrap_or(Value::Null);
            carried(vec![PatchOp::new(PatchKind::Set, target, Some(value))])
        }
        _ => carried(vec![patch.at(target)]),
    }
}

fn is_entity_key(key: &str, name: &str) -> bool {
    key.strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('#'))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}
