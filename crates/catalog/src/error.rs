use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("source not found: {source_ref}")]
    SourceNotFound { source_ref: String },

    #[error("invalid source: {reason}")]
    InvalidSource { reason: String },

    #[error("repository not found or private; set a GitHub token to access private repos")]
    NotFoundOrPrivate,

    #[error("GitHub API rate limit exceeded; set a GitHub token and retry")]
    RateLimited,

    #[error("network error: {reason}")]
    Network { reason: String },

    #[error("{what} exceeds {limit} byte limit")]
    SizeLimitExceeded { what: String, limit: u64 },

    #[error("security violation: {reason}")]
    SecurityViolation { reason: String },

    #[error("invalid skill: {reason}")]
    Validation { reason: String },

    #[error("{message}")]
    Message { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    #[must_use]
    pub fn source_not_found(source_ref: impl Into<String>) -> Self {
        Self::SourceNotFound {
            source_ref: source_ref.into(),
        }
    }

    #[must_use]
    pub fn invalid_source(reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn size_limit(what: impl Into<String>, limit: u64) -> Self {
        Self::SizeLimitExceeded {
            what: what.into(),
            limit,
        }
    }

    #[must_use]
    pub fn security(reason: impl Into<String>) -> Self {
        Self::SecurityViolation {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
