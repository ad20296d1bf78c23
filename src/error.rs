use thiserror::Error;

use crate::model::ValueKind;

/// Reasons a schema builder or schema document operation is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Unknown node definition '{0}'")]
    UnknownNode(String),

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid tag name '{0}'")]
    InvalidTagName(String),

    #[error("Node definition '{0}' already exists")]
    DuplicateNode(String),

    #[error("Value '{value}' already exists in the derivation chain of '{node}'")]
    DuplicateValue { node: String, value: String },

    #[error("Container '{container}' already exists in the derivation chain of '{node}'")]
    DuplicateContainer { node: String, container: String },

    #[error("'{0}' has a base and inherits its key from the chain root")]
    KeyOnDerivedNode(String),

    #[error("'{0}' has a base and inherits its derived id from the chain root")]
    DerivedIdOnDerivedNode(String),

    #[error("'{0}' already has a key value")]
    KeyAlreadyDefined(String),

    #[error("'{0}' already has a derived id value")]
    DerivedIdAlreadyDefined(String),

    #[error("Derived id of '{node}' must be of kind {expected}, got {actual}")]
    DerivedIdKindMismatch {
        node: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("Derived id '{derived_id}' is already used in the derivation chain of '{node}'")]
    DuplicateDerivedId { node: String, derived_id: String },

    #[error("Default of value '{value}' can not be converted to {kind}")]
    InvalidDefault { value: String, kind: ValueKind },

    #[error("Invalid cardinality [{min}, {max}] for container '{container}' on '{node}'")]
    InvalidCardinality {
        node: String,
        container: String,
        min: usize,
        max: usize,
    },

    #[error("Invalid options query on value '{value}': {source}")]
    InvalidOptionsQuery {
        value: String,
        #[source]
        source: QueryParseError,
    },
}

/// Grammar errors of the textual query language
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryParseError {
    #[error("Query is empty")]
    Empty,

    #[error("Unmatched brace in '{0}'")]
    UnmatchedBrace(String),

    #[error("Unknown query step '{0}'")]
    UnknownStep(String),

    #[error("Children step '{0}' has no container name")]
    MissingName(String),

    #[error("Leaf query '{0}' has no value name")]
    MissingValueName(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathParseError {
    #[error("Invalid path step '{0}', expected 'Name[index]'")]
    InvalidStep(String),
}
