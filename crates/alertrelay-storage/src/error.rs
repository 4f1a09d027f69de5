use std::path::PathBuf;

/// Errors that can occur while writing or reading audit records.
///
/// The dispatcher never aborts on these; they are logged and the dispatch
/// carries on.
///
/// # Examples
///
/// ```rust
/// use alertrelay_storage::error::StorageError;
///
/// let err = StorageError::NameExhausted { stem: "1_4_1625213114".to_string() };
/// assert!(err.to_string().contains("1_4_1625213114"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Creating the audit directory or writing a record failed.
    #[error("Storage: I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The payload could not be serialized, or a stored record is not JSON.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every candidate filename for this event is already taken.
    #[error("Storage: no free record name for '{stem}'")]
    NameExhausted { stem: String },
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
