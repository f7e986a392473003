//! Error types for recast.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while registering rules, loading schemas or materializing.
///
/// Conversion errors abort the whole top-level call; no partially populated
/// instance is ever returned alongside one.
#[derive(Error, Debug)]
pub enum RecastError {
    /// A second rule was registered for the same (type, field) pair.
    #[error("a rule is already registered for field '{field}' of type '{type_name}'")]
    Conflict { type_name: String, field: String },

    /// More than one type in the resolved chain has a rule for the field.
    #[error("field '{field}' has rules on more than one type in the chain: {}", .types.join(", "))]
    AmbiguousRule { field: String, types: Vec<String> },

    /// A record was entered twice during one conversion.
    #[error("circular reference in input while materializing '{type_name}'")]
    CircularReference { type_name: String },

    /// A transform rule with no nested target type was consulted.
    #[error("transform rule for field '{field}' of type '{type_name}' has no target type")]
    MissingTargetType { type_name: String, field: String },

    /// A record or list was required but something else was found.
    #[error("cannot materialize '{type_name}' from a {found} value")]
    UnexpectedValue { type_name: String, found: &'static str },

    #[error("unknown type '{name}'")]
    UnknownType { name: String },

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A materialized value did not fit the requested Rust type.
    #[error("failed to decode materialized value: {0}")]
    Decode(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RecastError>;
