//! Error types for the lens engine.

use crate::{schema::ValidationError, value::describe as location, OpKind, Path, VersionId};
use thiserror::Error;

/// All possible errors from the lens engine.
///
/// Operator failures carry the operator kind and the absolute document (or
/// schema property) path at which they occurred.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Operator errors
    #[error("{op}: missing field '{field}' at {}", location(.path))]
    MissingField {
        op: OpKind,
        path: Path,
        field: String,
    },

    #[error("{op}: type mismatch at {}: expected {expected}, got {got}", location(.path))]
    TypeMismatch {
        op: OpKind,
        path: Path,
        expected: String,
        got: String,
    },

    #[error("{op}: key '{key}' already present at {}", location(.path))]
    KeyCollision { op: OpKind, path: Path, key: String },

    #[error("{op}: no mapping for value {value} at {}", location(.path))]
    UnmappedValue {
        op: OpKind,
        path: Path,
        value: serde_json::Value,
    },

    #[error("{op}: invalid shape at {}: {reason}", location(.path))]
    InvalidShape {
        op: OpKind,
        path: Path,
        reason: String,
    },

    #[error("{op}: broken reference '{reference}' at {}", location(.path))]
    BrokenReference {
        op: OpKind,
        path: Path,
        reference: String,
    },

    // Validation errors
    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("invalid lens: {0}")]
    InvalidLens(String),

    // Lens graph errors
    #[error("unknown schema version: {0}")]
    UnknownVersion(VersionId),

    #[error("schema version already registered: {0}")]
    DuplicateVersion(VersionId),

    #[error("no lens route from {from} to {to}")]
    NoRoute { from: VersionId, to: VersionId },
}

impl Error {
    /// The operator that failed, for operator errors.
    pub fn op(&self) -> Option<OpKind> {
        match self {
            Error::MissingField { op, .. }
            | Error::TypeMismatch { op, .. }
            | Error::KeyCollision { op, .. }
            | Error::UnmappedValue { op, .. }
            | Error::InvalidShape { op, .. }
            | Error::BrokenReference { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// The path at which an operator error occurred.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::MissingField { path, .. }
            | Error::TypeMismatch { path, .. }
            | Error::KeyCollision { path, .. }
            | Error::UnmappedValue { path, .. }
            | Error::InvalidShape { path, .. }
            | Error::BrokenReference { path, .. } => Some(path),
            _ => None,
        }
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::MissingField {
            op: OpKind::Hoist,
            path: vec!["address".into()],
            field: "city".into(),
        };
        assert_eq!(err.to_string(), "hoist: missing field 'city' at /address");

        let err = Error::KeyCollision {
            op: OpKind::Rename,
            path: vec![],
            key: "fullName".into(),
        };
        assert_eq!(
            err.to_string(),
            "rename: key 'fullName' already present at /"
        );

        let err = Error::UnmappedValue {
            op: OpKind::Convert,
            path: vec!["status".into()],
            value: serde_json::json!("archived"),
        };
        assert_eq!(
            err.to_string(),
            "convert: no mapping for value \"archived\" at /status"
        );

        let err = Error::NoRoute {
            from: "v1".into(),
            to: "v9".into(),
        };
        assert_eq!(err.to_string(), "no lens route from v1 to v9");
    }

    #[test]
    fn operator_accessors() {
        let err = Error::InvalidShape {
            op: OpKind::Head,
            path: vec!["tags".into()],
            reason: "empty sequence".into(),
        };
        assert_eq!(err.op(), Some(OpKind::Head));
        assert_eq!(err.path(), Some(&vec!["tags".to_string()]));

        let err = Error::UnknownVersion("v2".into());
        assert_eq!(err.op(), None);
        assert_eq!(err.path(), None);
    }

    #[test]
    fn validation_display_joins_errors() {
        let err = Error::Validation(vec![
            ValidationError::new(vec!["a".into()], "expected string, got number"),
            ValidationError::new(vec![], "missing required property 'b'"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: /a: expected string, got number; /: missing required property 'b'"
        );
    }
}
