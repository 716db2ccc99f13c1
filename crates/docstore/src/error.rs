//! Error types for the document store.
//!
//! Errors fall into two categories: configuration errors, raised while a
//! store is being constructed or before a request leaves the process, and
//! backend errors, surfaced by the remote search engine.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all document store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Invalid store configuration
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Errors reported by the search engine or its transport
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors caused by an inconsistent or incomplete store configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The text, name and document-id fields do not live under the same nested path.
    #[error(
        "text_field '{text_field}', name_field '{name_field}' and doc_id_field '{doc_id_field}' must share the same nested path"
    )]
    NestedPathMismatch {
        text_field: String,
        name_field: String,
        doc_id_field: String,
    },

    /// A field path is empty or contains an empty segment.
    #[error("invalid field path for {role}: '{path}'")]
    InvalidFieldPath { role: &'static str, path: String },

    /// An embedding query was attempted on a store without an embedding field.
    #[error("no embedding_field configured for index '{index}'")]
    EmbeddingFieldMissing { index: String },

    /// The embedding dimension is missing or zero while an embedding field is set.
    #[error("embedding_field '{field}' requires a non-zero embedding_dim")]
    EmbeddingDimMissing { field: String },

    /// A tag query named a field outside the configured tag fields.
    #[error("'{field}' is not a configured tag field (tag_fields: [{allowed}])")]
    UnknownTagField { field: String, allowed: String },

    /// At least one search field is required for text queries.
    #[error("search_fields must not be empty")]
    NoSearchFields,

    /// A transport option could not be applied.
    #[error("invalid transport option {option}: {message}")]
    InvalidTransport { option: &'static str, message: String },
}

/// Errors originating from the search engine backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// The backend is reachable but not serving requests.
    #[error("backend unavailable: {backend_name}: {message}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// The backend rejected the request (malformed query, mapping conflict, ...).
    #[error("{backend_name} rejected request (status {status}): {message}")]
    QueryRejected {
        backend_name: String,
        status: u16,
        message: String,
    },

    /// The target index does not exist.
    #[error("index not found in {backend_name}: {index}")]
    IndexNotFound { backend_name: String, index: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A response could not be decoded.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::SerializationError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(err.into())
    }
}

impl StoreError {
    /// Returns true if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, StoreError::Configuration(_))
    }
}
