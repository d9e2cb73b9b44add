//! Error types for the schema registry and wire codec

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema registry and codec errors
///
/// Validation variants carry a dotted path (`Record.field.items.union[1]`)
/// locating the offending declaration.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Invalid record name: '{name}'")]
    InvalidName { name: String },

    #[error("{path}: invalid field name '{name}'")]
    InvalidFieldName { path: String, name: String },

    #[error("{path}: invalid fields: {reason}")]
    InvalidFields { path: String, reason: String },

    #[error("{path}: field order is missing")]
    MissingOrder { path: String },

    #[error("{path}: field order must be a positive integer, got {order}")]
    InvalidOrder { path: String, order: String },

    #[error("{path}: order {order} is already used by {existing}")]
    DuplicateOrder {
        path: String,
        existing: String,
        order: i64,
    },

    #[error("{context}: record '{name}' is undefined")]
    UndefinedRecord { name: String, context: String },

    #[error("Record '{name}' definition is duplicated")]
    DuplicateRecord { name: String },

    #[error("Receiver {namespace}.{name} is defined more than once")]
    DuplicateReceiver { namespace: String, name: String },

    #[error("Receiver {namespace}.{name} has an unknown receiver type")]
    UnknownReceiverKind { namespace: String, name: String },

    #[error("Snapshot entry '{key}' holds '{name}'")]
    SnapshotKeyMismatch { key: String, name: String },

    #[error("Schema is locked and cannot be modified")]
    SchemaLocked,

    #[error("{path}: pointer has no target record")]
    MissingPointerRef { path: String },

    #[error("{path}: pointer target '{target}' is not a registered record")]
    UndefinedPointer { path: String, target: String },

    #[error("{path}: named type '{name}' conflicts with an existing definition")]
    ConflictingType { path: String, name: String },

    #[error("{path}: unsupported schema type")]
    UnsupportedType { path: String },

    #[error("Unknown record: {name}")]
    UnknownRecord { name: String },

    #[error("Unknown serializer: {0}")]
    UnknownSerializer(String),

    #[error("{path}: invalid value: {reason}")]
    InvalidValue { path: String, reason: String },

    #[error("{path}: constraint violated: {reason}")]
    ConstraintViolation { path: String, reason: String },

    #[error("Avro error: {0}")]
    Codec(#[from] apache_avro::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    pub(crate) fn invalid_value(path: &str, reason: impl Into<String>) -> Self {
        SchemaError::InvalidValue {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn constraint(path: &str, reason: impl Into<String>) -> Self {
        SchemaError::ConstraintViolation {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
