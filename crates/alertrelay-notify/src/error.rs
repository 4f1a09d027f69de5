/// Errors that can occur within the notification subsystem.
///
/// None of these cross a channel boundary: the dispatcher turns them into a
/// failed [`DeliveryResult`](crate::DeliveryResult) for the channel that
/// raised them.
///
/// # Examples
///
/// ```rust
/// use alertrelay_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing smtp.host".to_string());
/// assert!(err.to_string().contains("smtp.host"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// An HTTP request to an external notification endpoint failed.
    #[error("Notify: HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// SMTP transport error when sending email.
    #[error("Notify: SMTP error: {0}")]
    SmtpError(String),

    /// An email address could not be parsed.
    #[error("Notify: invalid address '{address}': {reason}")]
    AddressError { address: String, reason: String },

    /// The external API returned a non-success HTTP status.
    #[error("Notify: API error from {service}: status={status}, body={body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },

    /// The external API answered 2xx but reported an error code in the body.
    #[error("Notify: {service} rejected the message: code={code}, message={message}")]
    ApiRejected {
        service: String,
        code: i64,
        message: String,
    },
}

impl From<lettre::transport::smtp::Error> for NotifyError {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        NotifyError::SmtpError(e.to_string())
    }
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
