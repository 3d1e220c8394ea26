/// Domain-specific error types for nestrag
///
/// Load-time problems (missing files, corrupt index pairs, model mismatch) are
/// fatal and surface before any request is served. Request-time upstream
/// failures are propagated unchanged; lookup misses are never errors.

#[derive(Debug, thiserror::Error)]
pub enum NestragError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inconsistent index: {vectors} vectors but {metadata} metadata entries")]
    InconsistentIndex {
        vectors: usize,
        metadata: usize
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize
    },

    #[error("Embedding error: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingError),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Request exceeded deadline of {0} ms")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NestragError {
    /// Helper to create validation errors with field names
    ///
    /// Example:
    /// ```
    /// use nestrag::errors::NestragError;
    /// let err = NestragError::validation("strategy", "Unknown fusion strategy");
    /// ```
    pub fn validation(field: &str, message: &str) -> Self {
        NestragError::Validation {
            message: message.to_string(),
            field: Some(field.to_string()),
        }
    }

    /// Wrap a file read/parse failure for one of the startup data files.
    pub fn load(path: &std::path::Path, what: &str, err: impl std::fmt::Display) -> Self {
        NestragError::Config(format!("Failed to load {} from {}: {}", what, path.display(), err))
    }
}
