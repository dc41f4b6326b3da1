use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while deciding on or delivering an alert.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Throttle store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Delivery through {channel} failed: {message}")]
    Delivery { channel: String, message: String },

    #[error("Channel {channel} is misconfigured: {reason}")]
    MisconfiguredChannel { channel: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    pub fn delivery(channel: &str, message: impl Into<String>) -> Self {
        Error::Delivery {
            channel: channel.to_string(),
            message: message.into(),
        }
    }

    pub fn misconfigured(channel: &str, reason: impl Into<String>) -> Self {
        Error::MisconfiguredChannel {
            channel: channel.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the failure came from a notification channel rather than the store or config.
    pub fn is_channel_error(&self) -> bool {
        matches!(
            self,
            Error::Delivery { .. } | Error::MisconfiguredChannel { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

impl From<envconfig::Error> for Error {
    fn from(err: envconfig::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Error::Validation(err.to_string())
    }
}
