//! Document transforms for each lens operator.
//!
//! Every operator acts on the document in scope (the root for top-level
//! operators, the value at `name` inside `In`, each element inside `Map`).
//! Operators that name a field are no-ops when that field is absent, unless
//! the operator cannot work without it (Hoist, Plunge, Extract).

use crate::{
    error::Result,
    lens::{Fallback, LensOp, OpKind, Property, ValueMapping},
    pipeline::{run_doc, run_elements, DegradeReason, Direction, Pass, Stashed},
    value::{child, json_type_of, position_of, put_field, put_field_at, rename_field, take_field},
    Error, Lens,
};
use serde_json::{json, Map, Value};

/// Forward transform of one operator.
pub(crate) fn apply(op: &LensOp, doc: Value, pass: &mut Pass) -> Result<Value> {
    let kind = op.kind();
    match op {
        LensOp::Add(property) => with_object(doc, kind, pass, |obj, _| {
            add(obj, property);
            Ok(())
        }),
        LensOp::Remove(property) => with_object(doc, kind, pass, |obj, pass| {
            remove(obj, property, pass);
            Ok(())
        }),
        LensOp::Rename {
            source,
            destination,
        } => with_object(doc, kind, pass, |obj, pass| {
            rename(obj, source, destination, kind, pass)
        }),
        LensOp::Hoist { host, name } => with_object(doc, kind, pass, |obj, pass| {
            let position = hoist(obj, host, name, kind, pass, None)?;
            let key = pass.stash_key_at(&[host.as_str(), name.as_str()]);
            pass.recorded.record(key, Stashed::Position { position });
            Ok(())
        }),
        LensOp::Plunge { host, name } => with_object(doc, kind, pass, |obj, pass| {
            let position = plunge(obj, host, name, kind, pass, None)?;
            let key = pass.stash_key(name);
            pass.recorded.record(key, Stashed::Position { position });
            Ok(())
        }),
        LensOp::Wrap { name } => with_object(doc, kind, pass, |obj, _| {
            wrap(obj, name);
            Ok(())
        }),
        LensOp::Head { name } => {
            with_object(doc, kind, pass, |obj, pass| head(obj, name, kind, pass))
        }
        LensOp::In { name, lens } => with_object(doc, kind, pass, |obj, pass| {
            run_inside(obj, name, lens, Direction::Forward, pass)
        }),
        LensOp::Map { lens } => run_map(doc, lens, Direction::Forward, pass),
        LensOp::Convert { name, mapping, .. } => with_object(doc, kind, pass, |obj, pass| {
            convert(obj, name, mapping, Direction::Forward, pass)
        }),
        LensOp::Extract { host, name, fields } => with_object(doc, kind, pass, |obj, pass| {
            extract_entity(obj, host, name, fields, pass)
        }),
    }
}

/// Reverse transform of one operator.
pub(crate) fn revert(op: &LensOp, doc: Value, pass: &mut Pass) -> Result<Value> {
    let kind = op.kind();
    match op {
        LensOp::Add(property) => {
            with_object(doc, kind, pass, |obj, pass| unadd(obj, property, pass))
        }
        LensOp::Remove(property) => with_object(doc, kind, pass, |obj, pass| {
            unremove(obj, property, pass)
        }),
        LensOp::Rename {
            source,
            destination,
        } => with_object(doc, kind, pass, |obj, pass| {
            rename(obj, destination, source, kind, pass)
        }),
        LensOp::Hoist { host, name } => with_object(doc, kind, pass, |obj, pass| {
            let at = pass.stored_position(&pass.stash_key_at(&[host.as_str(), name.as_str()]));
            plunge(obj, host, name, kind, pass, at).map(drop)
        }),
        LensOp::Plunge { host, name } => with_object(doc, kind, pass, |obj, pass| {
            let at = pass.stored_position(&pass.stash_key(name));
            hoist(obj, host, name, kind, pass, at).map(drop)
        }),
        LensOp::Wrap { name } => {
            with_object(doc, kind, pass, |obj, pass| head(obj, name, kind, pass))
        }
        LensOp::Head { name } => with_object(doc, kind, pass, |obj, _| {
            wrap(obj, name);
            Ok(())
        }),
        LensOp::In { name, lens } => with_object(doc, kind, pass, |obj, pass| {
            run_inside(obj, name, lens, Direction::Reverse, pass)
        }),
        LensOp::Map { lens } => run_map(doc, lens, Direction::Reverse, pass),
        LensOp::Convert { name, mapping, .. } => with_object(doc, kind, pass, |obj, pass| {
            convert(obj, name, mapping, Direction::Reverse, pass)
        }),
        LensOp::Extract { host, name, fields } => with_object(doc, kind, pass, |obj, pass| {
            restore_entity(obj, host, name, fields, pass)
        }),
    }
}

fn with_object<F>(mut doc: Value, op: OpKind, pass: &mut Pass, f: F) -> Result<Value>
where
    F: FnOnce(&mut Map<String, Value>, &mut Pass) -> Result<()>,
{
    if !doc.is_object() {
        return Err(mismatch(op, pass.path.clone(), "object", &doc));
    }
    if let Some(obj) = doc.as_object_mut() {
        f(obj, pass)?;
    }
    Ok(doc)
}

fn mismatch(op: OpKind, path: Vec<String>, expected: &str, got: &Value) -> Error {
    Error::TypeMismatch {
        op,
        path,
        expected: expected.to_string(),
        got: json_type_of(got).to_string(),
    }
}

fn add(obj: &mut Map<String, Value>, property: &Property) {
    if !obj.contains_key(&property.name) {
        put_field(obj, property.name.clone(), property.default_value());
    }
}

fn unadd(obj: &mut Map<String, Value>, property: &Property, pass: &mut Pass) -> Result<()> {
    if let Some(value) = obj.get(&property.name) {
        if !property.admits(value) {
            let expected = property
                .property_type
                .map(|t| t.to_string())
                .unwrap_or_default();
            return Err(mismatch(
                OpKind::Add,
                child(&pass.path, property.name.clone()),
                &expected,
                value,
            ));
        }
        obj.shift_remove(&property.name);
    }
    Ok(())
}

fn remove(obj: &mut Map<String, Value>, property: &Property, pass: &mut Pass) {
    let key = pass.stash_key(&property.name);
    let stashed = match take_field(obj, &property.name) {
        Some((value, position)) => Stashed::Present { value, position },
        None => Stashed::Absent,
    };
    pass.recorded.record(key, stashed);
}

fn unremove(obj: &mut Map<String, Value>, property: &Property, pass: &mut Pass) -> Result<()> {
    if obj.contains_key(&property.name) {
        return Err(Error::KeyCollision {
            op: OpKind::Remove,
            path: pass.path.clone(),
            key: property.name.clone(),
        });
    }
    let key = pass.stash_key(&property.name);
    match pass.stored.and_then(|stored| stored.get(&key)) {
        Some(Stashed::Present { value, position }) => {
            put_field_at(obj, *position, property.name.clone(), value.clone());
        }
        Some(Stashed::Absent) => {}
        Some(Stashed::Position { .. }) | None => {
            let default = property.default_value();
            put_field(obj, property.name.clone(), default.clone());
            pass.degrade(
                OpKind::Remove,
                child(&pass.path, property.name.clone()),
                DegradeReason::MissingStoredDefault { default },
            );
        }
    }
    Ok(())
}

fn rename(
    obj: &mut Map<String, Value>,
    from: &str,
    to: &str,
    op: OpKind,
    pass: &mut Pass,
) -> Result<()> {
    if !obj.contains_key(from) {
        return Ok(());
    }
    if obj.contains_key(to) {
        return Err(Error::KeyCollision {
            op,
            path: pass.path.clone(),
            key: to.to_string(),
        });
    }
    rename_field(obj, from, to);
    Ok(())
}

/// The object at `host`, failing if it is absent or not an object.
fn host_object<'m>(
    obj: &'m mut Map<String, Value>,
    host: &str,
    op: OpKind,
    pass: &Pass,
) -> Result<&'m mut Map<String, Value>> {
    match obj.get_mut(host) {
        None => Err(Error::MissingField {
            op,
            path: pass.path.clone(),
            field: host.to_string(),
        }),
        Some(Value::Object(inner)) => Ok(inner),
        Some(other) => Err(mismatch(op, child(&pass.path, host), "object", other)),
    }
}

/// Move `host.name` to the enclosing object, at `at` or just before `host`.
///
/// Returns the position the field held inside `host`.
fn hoist(
    obj: &mut Map<String, Value>,
    host: &str,
    name: &str,
    op: OpKind,
    pass: &mut Pass,
    at: Option<usize>,
) -> Result<usize> {
    if obj.contains_key(name) {
        return Err(Error::KeyCollision {
            op,
            path: pass.path.clone(),
            key: name.to_string(),
        });
    }
    let inner = host_object(obj, host, op, pass)?;
    let (value, inner_position) = take_field(inner, name).ok_or_else(|| Error::MissingField {
        op,
        path: child(&pass.path, host),
        field: name.to_string(),
    })?;
    let position = at
        .or_else(|| position_of(obj, host))
        .unwrap_or(obj.len());
    put_field_at(obj, position, name, value);
    Ok(inner_position)
}

/// Move `name` from the enclosing object into `host`, at `at` or last.
///
/// Returns the position the field held in the enclosing object.
fn plunge(
    obj: &mut Map<String, Value>,
    host: &str,
    name: &str,
    op: OpKind,
    pass: &mut Pass,
    at: Option<usize>,
) -> Result<usize> {
    let inner = host_object(obj, host, op, pass)?;
    if inner.contains_key(name) {
        return Err(Error::KeyCollision {
            op,
            path: child(&pass.path, host),
            key: name.to_string(),
        });
    }
    let (value, outer_position) = take_field(obj, name).ok_or_else(|| Error::MissingField {
        op,
        path: pass.path.clone(),
        field: name.to_string(),
    })?;
    if let Some(Value::Object(inner)) = obj.get_mut(host) {
        let position = at.unwrap_or(inner.len());
        put_field_at(inner, position, name, value);
    }
    Ok(outer_position)
}

fn wrap(obj: &mut Map<String, Value>, name: &str) {
    if let Some(slot) = obj.get_mut(name) {
        let inner = slot.take();
        *slot = Value::Array(vec![inner]);
    }
}

/// Replace the sequence at `name` with its first element.
fn head(obj: &mut Map<String, Value>, name: &str, op: OpKind, pass: &mut Pass) -> Result<()> {
    let path = child(&pass.path, name);
    let Some(slot) = obj.get_mut(name) else {
        return Ok(());
    };
    let items = match slot {
        Value::Array(items) => items,
        other => return Err(mismatch(op, path, "array", other)),
    };
    let length = items.len();
    if length == 0 {
        return Err(Error::InvalidShape {
            op,
            path,
            reason: "empty sequence has no first element".to_string(),
        });
    }
    if length > 1 && pass.config.strict_arity {
        return Err(Error::InvalidShape {
            op,
            path,
            reason: format!("expected a single element, found {}", length),
        });
    }
    let first = items.swap_remove(0);
    *slot = first;
    if length > 1 {
        pass.degrade(op, path, DegradeReason::ArityCoerced { length });
    }
    Ok(())
}

fn run_inside(
    obj: &mut Map<String, Value>,
    name: &str,
    lens: &Lens,
    direction: Direction,
    pass: &mut Pass,
) -> Result<()> {
    let Some(slot) = obj.get_mut(name) else {
        return Ok(());
    };
    if slot.is_null() {
        return Ok(());
    }
    let inner = slot.take();
    pass.path.push(name.to_string());
    let result = run_doc(lens, inner, direction, pass);
    pass.path.pop();
    *slot = result?;
    Ok(())
}

fn run_map(doc: Value, lens: &Lens, direction: Direction, pass: &mut Pass) -> Result<Value> {
    match doc {
        Value::Array(items) => Ok(Value::Array(run_elements(lens, items, direction, pass)?)),
        other => Err(mismatch(OpKind::Map, pass.path.clone(), "array", &other)),
    }
}

fn convert(
    obj: &mut Map<String, Value>,
    name: &str,
    mapping: &ValueMapping,
    direction: Direction,
    pass: &mut Pass,
) -> Result<()> {
    let Some(slot) = obj.get_mut(name) else {
        return Ok(());
    };
    let mapped = match direction {
        Direction::Forward => mapping.lookup(slot),
        Direction::Reverse => mapping.lookup_reverse(slot),
    };
    match (mapped, mapping.fallback) {
        (Some(value), _) => *slot = value.clone(),
        (None, Fallback::Identity) => {
            let value = slot.clone();
            pass.degrade(
                OpKind::Convert,
                child(&pass.path, name),
                DegradeReason::IdentityFallback { value },
            );
        }
        (None, Fallback::Error) => {
            return Err(Error::UnmappedValue {
                op: OpKind::Convert,
                path: child(&pass.path, name),
                value: slot.clone(),
            })
        }
    }
    Ok(())
}

/// Smallest `name#n` (n >= 1) not used as a key of `obj`.
pub(crate) fn entity_key(obj: &Map<String, Value>, name: &str) -> String {
    (1..)
        .map(|n| format!("{}#{}", name, n))
        .find(|key| !obj.contains_key(key))
        .unwrap_or_else(|| format!("{}#0", name))
}

fn extract_entity(
    obj: &mut Map<String, Value>,
    host: &str,
    name: &str,
    fields: &[String],
    pass: &mut Pass,
) -> Result<()> {
    let op = OpKind::Extract;
    let key = entity_key(obj, name);
    let inner = host_object(obj, host, op, pass)?;
    if inner.contains_key(name) {
        return Err(Error::KeyCollision {
            op,
            path: child(&pass.path, host),
            key: name.to_string(),
        });
    }
    let mut entity = Map::new();
    let mut positions = Vec::new();
    for field in fields {
        if let Some(position) = position_of(inner, field) {
            positions.push((field.as_str(), position));
        }
    }
    for (field, _) in &positions {
        if let Some((value, _)) = take_field(inner, field) {
            entity.insert(field.to_string(), value);
        }
    }
    let link_at = positions
        .iter()
        .map(|(_, position)| *position)
        .min()
        .unwrap_or(inner.len());
    put_field_at(inner, link_at, name, json!(key));
    put_field(obj, key, Value::Object(entity));
    for (field, position) in positions {
        let key = pass.stash_key_at(&[host, field]);
        pass.recorded.record(key, Stashed::Position { position });
    }
    Ok(())
}

/// Fold the linked entity back into `host`.
///
/// Fields go back to their recorded positions, or where the link field sat
/// in `fields` order. The entity itself is dropped unless another sibling
/// object still links to it.
fn restore_entity(
    obj: &mut Map<String, Value>,
    host: &str,
    name: &str,
    fields: &[String],
    pass: &mut Pass,
) -> Result<()> {
    let op = OpKind::Extract;
    let host_path = child(&pass.path, host);
    let inner = host_object(obj, host, op, pass)?;
    let reference = match inner.get(name) {
        None => {
            return Err(Error::MissingField {
                op,
                path: host_path,
                field: name.to_string(),
            })
        }
        Some(Value::String(reference)) => reference.clone(),
        Some(other) => return Err(mismatch(op, child(&host_path, name), "string", other)),
    };

    let entity = match obj.get(&reference) {
        None => {
            return Err(Error::BrokenReference {
                op,
                path: child(&host_path, name),
                reference,
            })
        }
        Some(Value::Object(entity)) => entity.clone(),
        Some(other) => return Err(mismatch(op, child(&pass.path, reference), "object", other)),
    };

    let inner = host_object(obj, host, op, pass)?;
    if let Some(key) = entity.keys().find(|k| *k != name && inner.contains_key(*k)) {
        return Err(Error::KeyCollision {
            op,
            path: host_path,
            key: key.clone(),
        });
    }
    let link_position = take_field(inner, name).map_or(inner.len(), |(_, idx)| idx);

    let rank = |field: &String| fields.iter().position(|f| f == field).unwrap_or(fields.len());
    let mut placed: Vec<(Option<usize>, usize, String, Value)> = entity
        .into_iter()
        .map(|(field, value)| {
            let stored = pass.stored_position(&pass.stash_key_at(&[host, field.as_str()]));
            (stored, rank(&field), field, value)
        })
        .collect();
    placed.sort_by_key(|(stored, rank, _, _)| (stored.unwrap_or(link_position), *rank));

    let mut next = link_position;
    for (stored, _, field, value) in placed {
        match stored {
            Some(position) => put_field_at(inner, position, field, value),
            None => {
                put_field_at(inner, next, field, value);
                next += 1;
            }
        }
    }

    let linked = Value::String(reference.clone());
    let still_linked = obj
        .iter()
        .filter(|(key, _)| **key != reference)
        .any(|(_, value)| value.get(name) == Some(&linked));
    if !still_linked {
        obj.shift_remove(&reference);
    }
    Ok(())
}
