/// Errors raised while decoding an incoming notice payload.
///
/// These are the only errors that abort a dispatch: everything downstream
/// of a successfully decoded payload is handled per channel.
///
/// # Examples
///
/// ```rust
/// use alertrelay_common::error::PayloadError;
///
/// let err = PayloadError::MissingField("event.trigger_time");
/// assert!(err.to_string().contains("trigger_time"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The payload is not valid JSON, or a field has the wrong JSON shape.
    #[error("Payload: invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required key is absent or null.
    #[error("Payload: missing required field '{0}'")]
    MissingField(&'static str),

    /// A key is present but its value cannot be interpreted.
    #[error("Payload: invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Convenience `Result` alias for payload decoding.
pub type Result<T> = std::result::Result<T, PayloadError>;
