//! Errors raised while resolving types, rules, and queries.

/// Any failure that aborts a tree build or reachability collection.
/// No partial result is ever returned alongside one of these.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("unexpected GroupVersion string: {0}")]
    InvalidGroupVersion(String),
    #[error("object {0} has no apiVersion or kind")]
    MissingTypeMeta(String),
    #[error("no kind is registered for {0} in the scheme")]
    UnregisteredType(String),
    #[error("field path {path} not found on {object}")]
    FieldPath { path: String, object: String },
    #[error("field path {path} on {object} is not a label map")]
    NotLabelMap { path: String, object: String },
    #[error("unexpected result shape for {object_type}: {reason}")]
    UnexpectedShape { object_type: String, reason: String },
    #[error("query for {object_type} failed: {source}")]
    Query {
        object_type: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("query cancelled")]
    Cancelled,
    #[error("query deadline exceeded")]
    DeadlineExceeded,
    #[error("ownership cycle: {0} is its own transitive owner")]
    OwnershipCycle(String),
    #[error("ownership tree exceeds {0} levels")]
    DepthExceeded(usize),
}

pub type Result<T> = std::result::Result<T, LookupError>;
