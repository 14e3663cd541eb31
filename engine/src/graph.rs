//! Registry of schema versions connected by lenses.
//!
//! Each registered lens derives the schema of its destination version from
//! its source version, so every version's schema is known without a
//! document. Documents migrate between any two connected versions; edges can
//! be walked in either direction.

use crate::{
    error::Result,
    lens::Lens,
    pipeline::{Direction, Engine, LensContext, Outcome},
    schema::SchemaFragment,
    Error, VersionId,
};
use std::collections::{BTreeMap, HashMap, VecDeque};

#[derive(Debug, Clone)]
struct Edge {
    from: VersionId,
    to: VersionId,
    lens: Lens,
}

/// One hop of a route between versions.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteStep<'g> {
    pub from: &'g str,
    pub to: &'g str,
    pub lens: &'g Lens,
    /// `Forward` when the lens is applied, `Reverse` when it is reverted
    pub direction: Direction,
}

/// Schema versions and the lenses between them.
#[derive(Debug, Clone)]
pub struct LensGraph {
    versions: BTreeMap<VersionId, SchemaFragment>,
    edges: Vec<Edge>,
    engine: Engine,
}

impl LensGraph {
    /// A graph holding a single root version.
    pub fn new(root: impl Into<VersionId>, schema: SchemaFragment) -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(root.into(), schema);
        Self {
            versions,
            edges: Vec::new(),
            engine: Engine::default(),
        }
    }

    /// Evaluate migrations with `engine` instead of the default.
    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    /// Register `to` as the result of applying `lens` to `from`.
    ///
    /// Returns the derived schema of `to`.
    pub fn register(
        &mut self,
        from: &str,
        to: impl Into<VersionId>,
        lens: Lens,
    ) -> Result<&SchemaFragment> {
        let to = to.into();
        let source = self
            .versions
            .get(from)
            .ok_or_else(|| Error::UnknownVersion(from.to_string()))?;
        if self.versions.contains_key(&to) {
            return Err(Error::DuplicateVersion(to));
        }

        let schema = self.engine.project(&lens, source.clone())?;
        tracing::debug!(from = %from, to = %to, ops = lens.len(), "registered lens");
        self.edges.push(Edge {
            from: from.to_string(),
            to: to.clone(),
            lens,
        });
        Ok(self.versions.entry(to).or_insert(schema))
    }

    pub fn schema(&self, version: &str) -> Result<&SchemaFragment> {
        self.versions
            .get(version)
            .ok_or_else(|| Error::UnknownVersion(version.to_string()))
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    pub fn contains(&self, version: &str) -> bool {
        self.versions.contains_key(version)
    }

    /// Shortest sequence of hops from `from` to `to`.
    pub fn route(&self, from: &str, to: &str) -> Result<Vec<RouteStep<'_>>> {
        for version in [from, to] {
            if !self.contains(version) {
                return Err(Error::UnknownVersion(version.to_string()));
            }
        }

        // Breadth-first search; `reached` maps a version to the edge and
        // direction that first reached it.
        let mut reached: HashMap<&str, (usize, Direction)> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                break;
            }
            for (idx, edge) in self.edges.iter().enumerate() {
                let next = if edge.from == current {
                    (edge.to.as_str(), Direction::Forward)
                } else if edge.to == current {
                    (edge.from.as_str(), Direction::Reverse)
                } else {
                    continue;
                };
                if next.0 != from && !reached.contains_key(next.0) {
                    reached.insert(next.0, (idx, next.1));
                    queue.push_back(next.0);
                }
            }
        }

        let mut steps = Vec::new();
        let mut current = to;
        while current != from {
            let (idx, direction) = *reached.get(current).ok_or_else(|| Error::NoRoute {
                from: from.to_string(),
                to: to.to_string(),
            })?;
            let edge = &self.edges[idx];
            let step = match direction {
                Direction::Forward => RouteStep {
                    from: &edge.from,
                    to: &edge.to,
                    lens: &edge.lens,
                    direction,
                },
                Direction::Reverse => RouteStep {
                    from: &edge.to,
                    to: &edge.from,
                    lens: &edge.lens,
                    direction,
                },
            };
            current = step.from;
            steps.push(step);
        }
        steps.reverse();
        Ok(steps)
    }

    /// A single lens equivalent to the route from `from` to `to`.
    ///
    /// Fails with `InvalidLens` when a reverted hop contains an operator
    /// without an inverse (Extract).
    pub fn lens_between(&self, from: &str, to: &str) -> Result<Lens> {
        let mut lens = Lens::default();
        for step in self.route(from, to)? {
            let hop = match step.direction {
                Direction::Forward => step.lens.clone(),
                Direction::Reverse => step.lens.inverse().ok_or_else(|| {
                    Error::InvalidLens(format!(
                        "lens from {} to {} cannot be inverted",
                        step.to, step.from
                    ))
                })?,
            };
            lens = lens.then(hop);
        }
        Ok(lens)
    }

    /// Migrate `value` from version `from` to version `to`.
    ///
    /// Each hop runs without stored state, so the returned context is empty
    /// unless the route is a single forward hop. Degradations of all hops are
    /// collected in order.
    pub fn migrate(&self, from: &str, to: &str, value: serde_json::Value) -> Result<Outcome> {
        let steps = self.route(from, to)?;
        let single = steps.len() == 1;
        let mut outcome = Outcome {
            value,
            schema: self.schema(from)?.clone(),
            context: LensContext::new(),
            degradations: Vec::new(),
        };

        for step in steps {
            tracing::debug!(from = %step.from, to = %step.to, direction = ?step.direction, "migration hop");
            let schema = self.schema(step.from)?.clone();
            let hop = match step.direction {
                Direction::Forward => self.engine.apply(step.lens, outcome.value, schema)?,
                Direction::Reverse => self.engine.revert(step.lens, outcome.value, schema)?,
            };
            outcome.value = hop.value;
            outcome.schema = hop.schema;
            outcome.degradations.extend(hop.degradations);
            if single {
                outcome.context = hop.context;
            }
        }
        Ok(outcome)
    }
}
