//! Lens composition and evaluation.
//!
//! `apply` folds a lens left-to-right through the operators' forward
//! transforms; `revert` folds right-to-left through their reverse
//! transforms. Documents and schemas are threaded through in lockstep but
//! independently: the schema result never depends on the document.
//!
//! # Stored state
//!
//! Remove needs the removed value from its forward call to reverse exactly,
//! and Hoist, Plunge and Extract need the positions of the fields they moved.
//! The forward pass records both in a [`LensContext`] returned with the
//! [`Outcome`]; passing that context to [`Engine::revert_with`] restores
//! them. Without it, Remove falls back to the declared default and marks the
//! outcome degraded, and moved fields land in a fixed place.

use crate::{
    config::EngineConfig,
    error::Result,
    lens::{Lens, OpKind},
    operator, projector,
    schema::{BasicValidator, SchemaFragment, Validator},
    value::{child, describe, pointer, Path},
    Error,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Direction of evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// A value stored by a forward step for its reverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Stashed {
    /// The field did not exist before the forward step
    Absent,
    /// The field held `value` at object position `position`
    Present { value: Value, position: usize },
    /// A moved field sat at object position `position`
    Position { position: usize },
}

/// Per-call state threaded from a forward pass to its reverse.
///
/// Entries are keyed by operator address within the lens (for example
/// `1.0` for the first operator nested in the second) and the document
/// pointer the operator acted on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LensContext {
    entries: BTreeMap<String, Stashed>,
}

impl LensContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&Stashed> {
        self.entries.get(key)
    }

    pub fn merge(&mut self, other: LensContext) {
        self.entries.extend(other.entries);
    }

    pub(crate) fn record(&mut self, key: String, stashed: Stashed) {
        self.entries.insert(key, stashed);
    }
}

/// Why a step succeeded without being exactly reversible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DegradeReason {
    /// Remove was reverted without stored state; the default was used
    MissingStoredDefault { default: Value },
    /// A sequence of `length` elements was reduced to its first element
    ArityCoerced { length: usize },
    /// A value had no mapping entry and passed through unchanged
    IdentityFallback { value: Value },
}

/// A lossy-but-successful step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    pub op: OpKind,
    pub path: Path,
    pub reason: DegradeReason,
}

/// Result of applying or reverting a lens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub value: Value,
    pub schema: SchemaFragment,
    /// State to hand to [`Engine::revert_with`]; empty after a revert
    #[serde(default, skip_serializing_if = "LensContext::is_empty")]
    pub context: LensContext,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<Degradation>,
}

impl Outcome {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn into_parts(self) -> (Value, SchemaFragment) {
        (self.value, self.schema)
    }
}

/// Mutable state of a single evaluation.
pub(crate) struct Pass<'a> {
    pub config: &'a EngineConfig,
    pub stored: Option<&'a LensContext>,
    pub recorded: LensContext,
    pub degradations: Vec<Degradation>,
    pub address: Vec<usize>,
    pub path: Path,
}

impl<'a> Pass<'a> {
    pub fn new(config: &'a EngineConfig, stored: Option<&'a LensContext>) -> Self {
        Self {
            config,
            stored,
            recorded: LensContext::new(),
            degradations: Vec::new(),
            address: Vec::new(),
            path: Vec::new(),
        }
    }

    /// Key under which the current operator stores state for `field`.
    pub fn stash_key(&self, field: &str) -> String {
        self.stash_key_at(&[field])
    }

    /// Key for a field nested `steps` below the current scope.
    pub fn stash_key_at(&self, steps: &[&str]) -> String {
        let mut path = self.path.clone();
        path.extend(steps.iter().map(|step| step.to_string()));
        let address = self
            .address
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        format!("{}@{}", address, pointer(&path))
    }

    /// Stored position for `key`, if the forward call recorded one.
    pub fn stored_position(&self, key: &str) -> Option<usize> {
        match self.stored.and_then(|stored| stored.get(key)) {
            Some(Stashed::Position { position }) => Some(*position),
            _ => None,
        }
    }

    pub fn degrade(&mut self, op: OpKind, path: Path, reason: DegradeReason) {
        tracing::warn!(op = %op, path = %describe(&path), reason = ?reason, "degraded lens step");
        self.degradations.push(Degradation { op, path, reason });
    }

    /// An independent pass for element `index` of the current sequence.
    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    pub fn fork(&self, index: usize) -> Pass<'a> {
        Pass {
            config: self.config,
            stored: self.stored,
            recorded: LensContext::new(),
            degradations: Vec::new(),
            address: self.address.clone(),
            path: child(&self.path, index.to_string()),
        }
    }

    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    pub fn absorb(&mut self, other: Pass<'a>) {
        self.recorded.merge(other.recorded);
        self.degradations.extend(other.degradations);
    }
}

/// Run every operator of `lens` over `doc` in the given direction.
pub(crate) fn run_doc(lens: &Lens, mut doc: Value, direction: Direction, pass: &mut Pass) -> Result<Value> {
    let ops = lens.ops();
    let order: Box<dyn Iterator<Item = usize>> = match direction {
        Direction::Forward => Box::new(0..ops.len()),
        Direction::Reverse => Box::new((0..ops.len()).rev()),
    };
    for idx in order {
        let op = &ops[idx];
        tracing::debug!(op = %op.kind(), path = %describe(&pass.path), ?direction, "lens step");
        pass.address.push(idx);
        let result = match direction {
            Direction::Forward => operator::apply(op, doc, pass),
            Direction::Reverse => operator::revert(op, doc, pass),
        };
        pass.address.pop();
        doc = result?;
    }
    Ok(doc)
}

/// Run `lens` over every element independently, preserving order.
#[cfg(not(feature = "parallel"))]
pub(crate) fn run_elements(
    lens: &Lens,
    items: Vec<Value>,
    direction: Direction,
    pass: &mut Pass,
) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        pass.path.push(idx.to_string());
        let result = run_doc(lens, item, direction, pass);
        pass.path.pop();
        out.push(result?);
    }
    Ok(out)
}

/// Run `lens` over every element in parallel, preserving order.
#[cfg(feature = "parallel")]
pub(crate) fn run_elements(
    lens: &Lens,
    items: Vec<Value>,
    direction: Direction,
    pass: &mut Pass,
) -> Result<Vec<Value>> {
    use rayon::prelude::*;

    let parent: &Pass = pass;
    let results: Vec<(Value, Pass)> = items
        .into_par_iter()
        .enumerate()
        .map(|(idx, item)| {
            let mut forked = parent.fork(idx);
            let value = run_doc(lens, item, direction, &mut forked)?;
            Ok((value, forked))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut out = Vec::with_capacity(results.len());
    for (value, forked) in results {
        pass.absorb(forked);
        out.push(value);
    }
    Ok(out)
}

/// Evaluates lenses under a configuration.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    validator: Arc<dyn Validator>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            validator: Arc::new(BasicValidator),
        }
    }

    /// Replace the validator used when input or output validation is enabled.
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Migrate `value` (conforming to `schema`) forward through `lens`.
    pub fn apply(&self, lens: &Lens, value: Value, schema: SchemaFragment) -> Result<Outcome> {
        self.run(lens, value, schema, Direction::Forward, None)
    }

    /// Migrate `value` backward through `lens` without stored state.
    pub fn revert(&self, lens: &Lens, value: Value, schema: SchemaFragment) -> Result<Outcome> {
        self.run(lens, value, schema, Direction::Reverse, None)
    }

    /// Migrate backward using the context returned by the forward call.
    pub fn revert_with(
        &self,
        lens: &Lens,
        value: Value,
        schema: SchemaFragment,
        context: &LensContext,
    ) -> Result<Outcome> {
        self.run(lens, value, schema, Direction::Reverse, Some(context))
    }

    /// Destination schema of `lens` for a source schema.
    pub fn project(&self, lens: &Lens, schema: SchemaFragment) -> Result<SchemaFragment> {
        projector::project(lens, schema, Direction::Forward)
    }

    /// Source schema of `lens` for a destination schema.
    pub fn project_reverse(&self, lens: &Lens, schema: SchemaFragment) -> Result<SchemaFragment> {
        projector::project(lens, schema, Direction::Reverse)
    }

    fn run(
        &self,
        lens: &Lens,
        value: Value,
        schema: SchemaFragment,
        direction: Direction,
        stored: Option<&LensContext>,
    ) -> Result<Outcome> {
        if self.config.validate_input {
            self.validator
                .validate(&value, &schema)
                .map_err(Error::Validation)?;
        }

        let mut pass = Pass::new(&self.config, stored);
        let value = run_doc(lens, value, direction, &mut pass)?;
        let schema = projector::project(lens, schema, direction)?;

        if self.config.validate_output {
            self.validator
                .validate(&value, &schema)
                .map_err(Error::Validation)?;
        }

        Ok(Outcome {
            value,
            schema,
            context: pass.recorded,
            degradations: pass.degradations,
        })
    }
}

/// Apply `lens` with the default configuration.
pub fn apply(lens: &Lens, value: Value, schema: SchemaFragment) -> Result<Outcome> {
    Engine::default().apply(lens, value, schema)
}

/// Revert `lens` with the default configuration and no stored state.
pub fn revert(lens: &Lens, value: Value, schema: SchemaFragment) -> Result<Outcome> {
    Engine::default().revert(lens, value, schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens::*;
    use crate::schema::JsonType;
    use serde_json::json;

    fn user_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "temp": {"type": "integer"}
            },
            "required": ["name"]
        })
    }

    #[test]
    fn apply_threads_value_and_schema() {
        let lens = Lens::new(vec![rename_property("name", "fullName")]);
        let out = apply(&lens, json!({"name": "Ada"}), user_schema()).unwrap();
        assert_eq!(out.value, json!({"fullName": "Ada"}));
        assert_eq!(out.schema["properties"]["fullName"], json!({"type": "string"}));
        assert_eq!(out.schema["required"], json!(["fullName"]));
        assert!(!out.is_degraded());
    }

    #[test]
    fn revert_runs_operators_in_reverse_order() {
        let lens = Lens::new(vec![
            rename_property("name", "title"),
            rename_property("title", "heading"),
        ]);
        let out = apply(&lens, json!({"name": "x"}), user_schema()).unwrap();
        assert_eq!(out.value, json!({"heading": "x"}));

        let back = revert(&lens, out.value, out.schema).unwrap();
        assert_eq!(back.value, json!({"name": "x"}));
        assert_eq!(back.schema, user_schema());
    }

    #[test]
    fn stored_context_restores_removed_value() {
        let lens = Lens::new(vec![remove_property(
            Property::new("temp", JsonType::Integer).with_default(0),
        )]);
        let engine = Engine::default();
        let out = engine
            .apply(&lens, json!({"name": "a", "temp": 5}), user_schema())
            .unwrap();
        assert_eq!(out.context.len(), 1);
        assert_eq!(
            out.context.get("0@/temp"),
            Some(&Stashed::Present {
                value: json!(5),
                position: 1
            })
        );

        let back = engine
            .revert_with(&lens, out.value.clone(), out.schema.clone(), &out.context)
            .unwrap();
        assert_eq!(back.value, json!({"name": "a", "temp": 5}));
        assert!(!back.is_degraded());

        let fresh = engine.revert(&lens, out.value, out.schema).unwrap();
        assert_eq!(fresh.value, json!({"name": "a", "temp": 0}));
        assert!(fresh.is_degraded());
    }

    #[test]
    fn first_failure_aborts_pipeline() {
        let lens = Lens::new(vec![
            rename_property("name", "fullName"),
            hoist_property("address", "city"),
            rename_property("fullName", "never"),
        ]);
        let err = apply(&lens, json!({"name": "Ada"}), json!({})).unwrap_err();
        assert_eq!(err.op(), Some(OpKind::Hoist));
    }

    #[test]
    fn output_validation() {
        let engine = Engine::new(EngineConfig {
            validate_output: true,
            ..EngineConfig::default()
        });
        let lens = Lens::new(vec![add_property(Property::new("age", JsonType::Integer))]);
        let out = engine.apply(&lens, json!({"name": "a"}), user_schema()).unwrap();
        assert_eq!(out.value, json!({"name": "a", "age": 0}));
    }

    #[test]
    fn input_validation_rejects_nonconforming_documents() {
        let engine = Engine::new(EngineConfig {
            validate_input: true,
            ..EngineConfig::default()
        });
        let lens = Lens::new(vec![]);
        let err = engine
            .apply(&lens, json!({"name": 42}), user_schema())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(errors) if errors.len() == 1));
    }

    #[test]
    fn custom_validator_is_used() {
        struct RejectAll;
        impl Validator for RejectAll {
            fn validate(
                &self,
                _value: &Value,
                _schema: &SchemaFragment,
            ) -> std::result::Result<(), Vec<crate::schema::ValidationError>> {
                Err(vec![crate::schema::ValidationError::new(vec![], "nope")])
            }
        }

        let engine = Engine::new(EngineConfig {
            validate_output: true,
            ..EngineConfig::default()
        })
        .with_validator(RejectAll);
        let err = engine
            .apply(&Lens::default(), json!({}), json!({}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn outcome_serialization_skips_empty_parts() {
        let out = apply(&Lens::default(), json!({"a": 1}), json!({})).unwrap();
        let json = serde_json::to_string(&out).unwrap();
        assert_eq!(json, r#"{"value":{"a":1},"schema":{}}"#);
    }

    #[test]
    fn direction_flip() {
        assert_eq!(Direction::Forward.flip(), Direction::Reverse);
        assert_eq!(Direction::Reverse.flip(), Direction::Forward);
    }
}
