//! Errors raised while answering a query request.
//!
//! The `Display` text of each variant is exactly the `message` returned to
//! the caller in an error envelope.

use thiserror::Error;
use vigil_influx::InfluxError;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown query_type: {0}")]
    UnknownQueryType(String),

    #[error("{0} is required")]
    MissingParam(&'static str),

    #[error("invalid {name}: {reason}")]
    InvalidParam { name: &'static str, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] InfluxError),

    #[error("malformed row: {0}")]
    MalformedRow(String),

    #[error("failed to encode answer: {0}")]
    Encode(#[from] serde_json::Error),
}

impl QueryError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            name,
            reason: reason.into(),
        }
    }

    /// Short label for log fields and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownQueryType(_) | Self::MissingParam(_) | Self::InvalidRequest(_) => "validation",
            Self::InvalidParam { .. } => "coercion",
            Self::Store(_) | Self::MalformedRow(_) => "store",
            Self::Encode(_) => "internal",
        }
    }
}
