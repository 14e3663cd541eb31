//! Schema projection.
//!
//! Computes the schema on the other side of a lens without looking at any
//! document. Object schemas that do not declare `properties` are open: an
//! operator that reshapes an existing property leaves them unchanged, while
//! Add still declares its property.

use crate::{
    error::Result,
    lens::{Fallback, Lens, LensOp, OpKind, Property, ValueMapping},
    pipeline::Direction,
    schema::{
        declared_types, properties_mut, rename_required, require, type_keyword,
        unrequire, JsonType, SchemaFragment,
    },
    value::{child, position_of, put_field, put_field_at, rename_field, take_field, Path},
    Error,
};
use serde_json::{json, Map, Value};

/// Project `schema` through `lens` in the given direction.
pub fn project(lens: &Lens, schema: SchemaFragment, direction: Direction) -> Result<SchemaFragment> {
    let mut path = Vec::new();
    project_at(lens, schema, direction, &mut path)
}

fn project_at(
    lens: &Lens,
    mut schema: SchemaFragment,
    direction: Direction,
    path: &mut Path,
) -> Result<SchemaFragment> {
    let ops = lens.ops();
    match direction {
        Direction::Forward => {
            for op in ops {
                schema = apply_schema(op, schema, path)?;
            }
        }
        Direction::Reverse => {
            for op in ops.iter().rev() {
                schema = revert_schema(op, schema, path)?;
            }
        }
    }
    Ok(schema)
}

fn apply_schema(op: &LensOp, schema: SchemaFragment, path: &mut Path) -> Result<SchemaFragment> {
    let kind = op.kind();
    match op {
        LensOp::Add(property) => with_object(schema, kind, path, |s, path| {
            declare(s, property, kind, path)
        }),
        LensOp::Remove(property) => with_object(schema, kind, path, |s, path| {
            undeclare(s, &property.name, kind, path)
        }),
        LensOp::Rename {
            source,
            destination,
        } => with_object(schema, kind, path, |s, path| {
            rename(s, source, destination, kind, path)
        }),
        LensOp::Hoist { host, name } => with_object(schema, kind, path, |s, path| {
            hoist(s, host, name, kind, path)
        }),
        LensOp::Plunge { host, name } => with_object(schema, kind, path, |s, path| {
            plunge(s, host, name, kind, path)
        }),
        LensOp::Wrap { name } => with_object(schema, kind, path, |s, path| {
            wrap(s, name, kind, path)
        }),
        LensOp::Head { name } => with_object(schema, kind, path, |s, path| {
            head(s, name, kind, path)
        }),
        LensOp::In { name, lens } => with_object(schema, kind, path, |s, path| {
            project_inside(s, name, lens, Direction::Forward, path)
        }),
        LensOp::Map { lens } => items(schema, lens, Direction::Forward, path),
        LensOp::Convert {
            name,
            mapping,
            source_type,
            destination_type,
        } => with_object(schema, kind, path, |s, path| {
            convert(s, name, mapping, (*source_type, *destination_type), Direction::Forward, path)
        }),
        LensOp::Extract { host, name, fields } => with_object(schema, kind, path, |s, path| {
            extract_entity(s, host, name, fields, path)
        }),
    }
}

fn revert_schema(op: &LensOp, schema: SchemaFragment, path: &mut Path) -> Result<SchemaFragment> {
    let kind = op.kind();
    match op {
        LensOp::Add(property) => with_object(schema, kind, path, |s, path| {
            undeclare(s, &property.name, kind, path)
        }),
        LensOp::Remove(property) => with_object(schema, kind, path, |s, path| {
            declare(s, property, kind, path)
        }),
        LensOp::Rename {
            source,
            destination,
        } => with_object(schema, kind, path, |s, path| {
            rename(s, destination, source, kind, path)
        }),
        LensOp::Hoist { host, name } => with_object(schema, kind, path, |s, path| {
            plunge(s, host, name, kind, path)
        }),
        LensOp::Plunge { host, name } => with_object(schema, kind, path, |s, path| {
            hoist(s, host, name, kind, path)
        }),
        LensOp::Wrap { name } => with_object(schema, kind, path, |s, path| {
            head(s, name, kind, path)
        }),
        LensOp::Head { name } => with_object(schema, kind, path, |s, path| {
            wrap(s, name, kind, path)
        }),
        LensOp::In { name, lens } => with_object(schema, kind, path, |s, path| {
            project_inside(s, name, lens, Direction::Reverse, path)
        }),
        LensOp::Map { lens } => items(schema, lens, Direction::Reverse, path),
        LensOp::Convert {
            name,
            mapping,
            source_type,
            destination_type,
        } => with_object(schema, kind, path, |s, path| {
            convert(s, name, mapping, (*destination_type, *source_type), Direction::Reverse, path)
        }),
        LensOp::Extract { host, name, .. } => with_object(schema, kind, path, |s, path| {
            restore_entity(s, host, name, path)
        }),
    }
}

fn with_object<F>(mut schema: SchemaFragment, op: OpKind, path: &mut Path, f: F) -> Result<SchemaFragment>
where
    F: FnOnce(&mut Map<String, Value>, &mut Path) -> Result<()>,
{
    if schema == Value::Bool(true) {
        schema = json!({});
    }
    if !schema.is_object() {
        return Err(Error::TypeMismatch {
            op,
            path: path.clone(),
            expected: "object schema".to_string(),
            got: schema.to_string(),
        });
    }
    if let Some(map) = schema.as_object_mut() {
        let types = declared_types(map);
        if !types.is_empty() && !types.contains(&JsonType::Object) {
            return Err(Error::TypeMismatch {
                op,
                path: path.clone(),
                expected: "object".to_string(),
                got: describe_types(&types),
            });
        }
        f(map, path)?;
    }
    Ok(schema)
}

fn describe_types(types: &[JsonType]) -> String {
    types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(" or ")
}

fn is_open(schema: &Map<String, Value>) -> bool {
    !schema.contains_key("properties")
}

fn missing(op: OpKind, path: &Path, field: &str) -> Error {
    Error::MissingField {
        op,
        path: path.clone(),
        field: field.to_string(),
    }
}

fn collision(op: OpKind, path: &Path, key: &str) -> Error {
    Error::KeyCollision {
        op,
        path: path.clone(),
        key: key.to_string(),
    }
}

fn declare(schema: &mut Map<String, Value>, property: &Property, op: OpKind, path: &Path) -> Result<()> {
    let props = properties_mut(schema);
    if props.contains_key(&property.name) {
        return Err(collision(op, path, &property.name));
    }
    put_field(props, property.name.clone(), property.schema());
    if property.required {
        require(schema, &property.name);
    }
    Ok(())
}

fn undeclare(schema: &mut Map<String, Value>, name: &str, op: OpKind, path: &Path) -> Result<()> {
    if is_open(schema) {
        return Ok(());
    }
    if properties_mut(schema).shift_remove(name).is_none() {
        return Err(missing(op, path, name));
    }
    unrequire(schema, name);
    Ok(())
}

fn rename(schema: &mut Map<String, Value>, from: &str, to: &str, op: OpKind, path: &Path) -> Result<()> {
    if is_open(schema) {
        return Ok(());
    }
    let props = properties_mut(schema);
    if !props.contains_key(from) {
        return Err(missing(op, path, from));
    }
    if props.contains_key(to) {
        return Err(collision(op, path, to));
    }
    rename_field(props, from, to);
    rename_required(schema, from, to);
    Ok(())
}

/// The object schema of property `host`, failing if it is not declared.
fn host_schema<'m>(
    schema: &'m mut Map<String, Value>,
    host: &str,
    op: OpKind,
    path: &Path,
) -> Result<&'m mut Map<String, Value>> {
    match properties_mut(schema).get_mut(host) {
        None => Err(missing(op, path, host)),
        Some(Value::Object(inner)) => Ok(inner),
        Some(other) => Err(Error::TypeMismatch {
            op,
            path: child(path, host),
            expected: "object schema".to_string(),
            got: other.to_string(),
        }),
    }
}

fn hoist(schema: &mut Map<String, Value>, host: &str, name: &str, op: OpKind, path: &Path) -> Result<()> {
    if is_open(schema) {
        return Ok(());
    }
    if properties_mut(schema).contains_key(name) {
        return Err(collision(op, path, name));
    }
    let inner = host_schema(schema, host, op, path)?;
    if is_open(inner) {
        return Ok(());
    }
    let (moved, _) = take_field(properties_mut(inner), name)
        .ok_or_else(|| missing(op, &child(path, host), name))?;
    let was_required = unrequire(inner, name);

    let props = properties_mut(schema);
    let position = position_of(props, host).unwrap_or(props.len());
    put_field_at(props, position, name, moved);
    if was_required {
        require(schema, name);
    }
    Ok(())
}

fn plunge(schema: &mut Map<String, Value>, host: &str, name: &str, op: OpKind, path: &Path) -> Result<()> {
    if is_open(schema) {
        return Ok(());
    }
    let inner = host_schema(schema, host, op, path)?;
    if properties_mut(inner).contains_key(name) {
        return Err(collision(op, &child(path, host), name));
    }
    let (moved, _) = take_field(properties_mut(schema), name).ok_or_else(|| missing(op, path, name))?;
    let was_required = unrequire(schema, name);

    let inner = host_schema(schema, host, op, path)?;
    put_field(properties_mut(inner), name, moved);
    if was_required {
        require(inner, name);
    }
    Ok(())
}

/// The declared schema of property `name`, or `None` for open schemas.
fn property_slot<'m>(
    schema: &'m mut Map<String, Value>,
    name: &str,
    op: OpKind,
    path: &Path,
) -> Result<Option<&'m mut Value>> {
    if is_open(schema) {
        return Ok(None);
    }
    match properties_mut(schema).get_mut(name) {
        Some(slot) => Ok(Some(slot)),
        None => Err(missing(op, path, name)),
    }
}

fn wrap(schema: &mut Map<String, Value>, name: &str, op: OpKind, path: &Path) -> Result<()> {
    if let Some(slot) = property_slot(schema, name, op, path)? {
        let element = slot.take();
        *slot = json!({"type": "array", "items": element});
    }
    Ok(())
}

fn head(schema: &mut Map<String, Value>, name: &str, op: OpKind, path: &Path) -> Result<()> {
    let Some(slot) = property_slot(schema, name, op, path)? else {
        return Ok(());
    };
    let element = match &mut *slot {
        Value::Object(prop) => {
            let types = declared_types(prop);
            if !types.is_empty() && !types.contains(&JsonType::Array) {
                return Err(Error::TypeMismatch {
                    op,
                    path: child(path, name),
                    expected: "array".to_string(),
                    got: describe_types(&types),
                });
            }
            prop.remove("items").unwrap_or_else(|| json!({}))
        }
        _ => json!({}),
    };
    *slot = element;
    Ok(())
}

fn project_inside(
    schema: &mut Map<String, Value>,
    name: &str,
    lens: &Lens,
    direction: Direction,
    path: &mut Path,
) -> Result<()> {
    let Some(slot) = property_slot(schema, name, OpKind::In, path)? else {
        return Ok(());
    };
    let inner = slot.take();
    path.push(name.to_string());
    let result = project_at(lens, inner, direction, path);
    path.pop();
    *slot = result?;
    Ok(())
}

fn items(mut schema: SchemaFragment, lens: &Lens, direction: Direction, path: &mut Path) -> Result<SchemaFragment> {
    if schema == Value::Bool(true) {
        return Ok(schema);
    }
    let Some(map) = schema.as_object_mut() else {
        return Err(Error::TypeMismatch {
            op: OpKind::Map,
            path: path.clone(),
            expected: "array schema".to_string(),
            got: schema.to_string(),
        });
    };
    let types = declared_types(map);
    if !types.is_empty() && !types.contains(&JsonType::Array) {
        return Err(Error::TypeMismatch {
            op: OpKind::Map,
            path: path.clone(),
            expected: "array".to_string(),
            got: describe_types(&types),
        });
    }
    let element = map.remove("items").unwrap_or_else(|| json!({}));
    path.push("*".to_string());
    let result = project_at(lens, element, direction, path);
    path.pop();
    map.insert("items".to_string(), result?);
    Ok(schema)
}

fn convert(
    schema: &mut Map<String, Value>,
    name: &str,
    mapping: &ValueMapping,
    (from, to): (Option<JsonType>, Option<JsonType>),
    direction: Direction,
    path: &Path,
) -> Result<()> {
    let Some(Value::Object(prop)) = property_slot(schema, name, OpKind::Convert, path)? else {
        return Ok(());
    };

    let lookup = |value: &Value| match direction {
        Direction::Forward => mapping.lookup(value).cloned(),
        Direction::Reverse => mapping.lookup_reverse(value).cloned(),
    };
    let passthrough = mapping.fallback == Fallback::Identity;

    // Without a declared type, infer it from the mapping.
    let mut types = match to {
        Some(t) => vec![t],
        None => match direction {
            Direction::Forward => mapping.range_types(),
            Direction::Reverse => mapping.domain_types(),
        },
    };
    // Unmapped values keep their type. Read backward, the types this
    // Convert produced map away again.
    let untyped = passthrough && !prop.contains_key("type");
    if passthrough {
        let produced = match (direction, from) {
            (Direction::Forward, _) => Vec::new(),
            (Direction::Reverse, Some(t)) => vec![t],
            (Direction::Reverse, None) => mapping.range_types(),
        };
        for t in declared_types(prop) {
            if !types.contains(&t) && !produced.contains(&t) {
                types.push(t);
            }
        }
    }
    if !types.is_empty() && !untyped {
        prop.insert("type".to_string(), type_keyword(&types));
    }

    if let Some(Value::Array(allowed)) = prop.remove("enum") {
        let mut converted: Vec<Value> = Vec::new();
        for value in allowed {
            let next = match lookup(&value) {
                Some(mapped) => Some(mapped),
                None if passthrough => Some(value),
                None => None,
            };
            if let Some(next) = next {
                if !converted.contains(&next) {
                    converted.push(next);
                }
            }
        }
        prop.insert("enum".to_string(), Value::Array(converted));
    }

    if let Some(default) = prop.remove("default") {
        if let Some(mapped) = lookup(&default) {
            prop.insert("default".to_string(), mapped);
        } else if passthrough {
            prop.insert("default".to_string(), default);
        }
    }
    Ok(())
}

/// Pattern matching the keys extracted entities are stored under.
pub(crate) fn entity_pattern(name: &str) -> String {
    format!("^{}#[0-9]+$", regex::escape(name))
}

fn extract_entity(
    schema: &mut Map<String, Value>,
    host: &str,
    name: &str,
    fields: &[String],
    path: &Path,
) -> Result<()> {
    let op = OpKind::Extract;
    if is_open(schema) {
        return Ok(());
    }
    let pattern = entity_pattern(name);
    let taken = schema
        .get("patternProperties")
        .and_then(Value::as_object)
        .is_some_and(|patterns| patterns.contains_key(&pattern));
    if taken {
        return Err(collision(op, path, &pattern));
    }

    let inner = host_schema(schema, host, op, path)?;
    if properties_mut(inner).contains_key(name) {
        return Err(collision(op, &child(path, host), name));
    }
    let mut entity = Map::new();
    let mut entity_required = Vec::new();
    for field in fields {
        if let Some((field_schema, _)) = take_field(properties_mut(inner), field) {
            entity.insert(field.clone(), field_schema);
            if unrequire(inner, field) {
                entity_required.push(json!(field));
            }
        }
    }
    put_field(properties_mut(inner), name, json!({"type": "string"}));
    require(inner, name);

    let patterns = schema
        .entry("patternProperties")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(patterns) = patterns {
        patterns.insert(
            pattern,
            json!({"type": "object", "properties": entity, "required": entity_required}),
        );
    }
    Ok(())
}

fn restore_entity(schema: &mut Map<String, Value>, host: &str, name: &str, path: &Path) -> Result<()> {
    let op = OpKind::Extract;
    if is_open(schema) {
        return Ok(());
    }
    let pattern = entity_pattern(name);
    let entity = schema
        .get_mut("patternProperties")
        .and_then(Value::as_object_mut)
        .and_then(|patterns| patterns.shift_remove(&pattern))
        .ok_or_else(|| Error::BrokenReference {
            op,
            path: path.clone(),
            reference: pattern.clone(),
        })?;
    if schema
        .get("patternProperties")
        .and_then(Value::as_object)
        .is_some_and(Map::is_empty)
    {
        schema.shift_remove("patternProperties");
    }

    let inner = host_schema(schema, host, op, path)?;
    if properties_mut(inner).shift_remove(name).is_none() {
        return Err(missing(op, &child(path, host), name));
    }
    unrequire(inner, name);

    let entity_required = entity.get("required").and_then(Value::as_array).cloned().unwrap_or_default();
    if let Some(Value::Object(fields)) = entity.get("properties") {
        for (field, field_schema) in fields {
            let props = properties_mut(inner);
            if props.contains_key(field) {
                return Err(collision(op, &child(path, host), field));
            }
            put_field(props, field.clone(), field_schema.clone());
            if entity_required.iter().any(|r| r.as_str() == Some(field)) {
                require(inner, field);
            }
        }
    }
    Ok(())
}
