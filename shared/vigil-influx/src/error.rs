//! Error types for the InfluxDB SDK

/// Result type alias
pub type Result<T> = std::result::Result<T, InfluxError>;

/// InfluxDB client errors
#[derive(Debug, thiserror::Error)]
pub enum InfluxError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("InfluxDB client is closed")]
    Closed,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<csv::Error> for InfluxError {
    fn from(err: csv::Error) -> Self {
        InfluxError::Parse(err.to_string())
    }
}
