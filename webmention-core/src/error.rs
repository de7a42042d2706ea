use thiserror::Error;

/// Error taxonomy for the Webmention engine (spec §7).
///
/// `Validation` and `Gone` are the two variants a caller should surface as a
/// 400-class response; everything else indicates a transient or internal
/// failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Gone(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::Gone(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Whether this error is part of the `WebmentionException` hierarchy the
    /// original distinguishes from ordinary failures — i.e. whether a caller
    /// should surface it as a 400 rather than a 500.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Gone(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::upstream(value.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        Error::storage(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
