//! # Lens Engine
//!
//! Bidirectional lenses over JSON documents and their JSON-Schema shapes.
//!
//! A lens is a pipeline of small invertible operators. Applying it migrates a
//! document (and the schema describing it) from one structural version to
//! another; reverting it migrates back. Where an operator discards
//! information, the engine either carries what it needs in an explicit
//! [`LensContext`] or reports the lossy step as a [`Degradation`].
//!
//! ## Design Principles
//!
//! - **No IO**: Lenses are plain data, evaluation is pure
//! - **Schema first**: The destination schema is derived without a document
//! - **Explicit state**: Stored values travel in the returned context, never in
//!   the lens
//! - **Loud failures**: Every operator failure names the operator and the path
//!
//! ## Core Concepts
//!
//! ### Operators
//!
//! - [`add_property`] / [`remove_property`] - Introduce or drop a field
//! - [`rename_property`] - Rename a field in place
//! - [`hoist_property`] / [`plunge_property`] - Move a field out of or into a
//!   nested object
//! - [`wrap_property`] / [`head_property`] - Scalar to single-element sequence
//!   and back
//! - [`inside`] / [`map`] - Run a nested lens on a field or on every element
//! - [`convert_value`] - Translate values through a finite mapping
//! - [`extract`] - Move fields into a keyed entity referenced by a link field
//!
//! ### Schemas
//!
//! Every operator transforms the schema in lockstep with the document
//! ([`Engine::project`]). The [`LensGraph`] builds on this to register schema
//! versions connected by lenses and migrate documents along the shortest
//! route between any two of them.
//!
//! ### Patches
//!
//! [`translate`] carries a single set/insert/delete edit across a lens
//! without migrating a whole document.
//!
//! ## Quick Start
//!
//! ```rust
//! use lens_engine::{apply, revert, rename_property, Lens};
//! use serde_json::json;
//!
//! let lens = Lens::new(vec![rename_property("title", "name")]);
//! let schema = json!({
//!     "type": "object",
//!     "properties": {"title": {"type": "string"}},
//!     "required": ["title"]
//! });
//!
//! let out = apply(&lens, json!({"title": "Hello"}), schema).unwrap();
//! assert_eq!(out.value, json!({"name": "Hello"}));
//! assert_eq!(out.schema["required"], json!(["name"]));
//!
//! let back = revert(&lens, out.value, out.schema).unwrap();
//! assert_eq!(back.value, json!({"title": "Hello"}));
//! ```
//!
//! ## FFI
//!
//! The [`ffi`] module provides C-compatible functions for use from other languages.
//! All data is exchanged as JSON strings.

pub mod config;
pub mod error;
pub mod ffi;
pub mod graph;
pub mod lens;
mod operator;
pub mod patch;
pub mod pipeline;
mod projector;
pub mod schema;
pub mod value;

// Re-export main types at crate root
pub use config::{ConfigError, EngineConfig};
pub use error::{Error, Result};
pub use graph::{LensGraph, RouteStep};
pub use lens::{
    add_property, compose, convert_value, extract, head_property, hoist_property, inside, map,
    plunge_property, remove_property, rename_property, wrap_property, Fallback, Lens, LensOp,
    OpKind, Property, ValueMapping,
};
pub use patch::{apply_patch, translate, translate_reverse, DroppedPatch, PatchKind, PatchOp, Translation};
pub use pipeline::{
    apply, revert, Degradation, DegradeReason, Direction, Engine, LensContext, Outcome, Stashed,
};
pub use schema::{validate, BasicValidator, JsonType, SchemaFragment, ValidationError, Validator};
pub use value::{Path, PathStep};

/// Identifier of a schema version in a [`LensGraph`]
pub type VersionId = String;
