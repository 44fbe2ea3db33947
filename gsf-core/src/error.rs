/// Error types for the GSF core library
use thiserror::Error;

/// A required reference dataset could not be loaded. Fatal at startup.
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// The backing file could not be read
    #[error("Failed to read {path}: {source}")]
    Missing {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A required column is absent from the header row
    #[error("{dataset} is missing required column '{column}'")]
    MissingColumn { dataset: String, column: String },

    /// Failed to parse CSV data
    #[error("Failed to parse CSV: {0}")]
    CsvParse(#[from] csv::Error),

    /// Failed to parse JSON data
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A row or feature holds a value outside its domain
    #[error("Malformed {dataset}: {reason}")]
    Malformed { dataset: String, reason: String },
}

/// A single forecast request failed. Recoverable: the country is reported and
/// left out of the aggregate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The request could not be sent or the connection dropped
    #[error("Forecast request failed: {0}")]
    Transport(String),

    /// The request did not complete within the configured timeout
    #[error("Forecast request timed out")]
    Timeout,

    /// The service answered with a non-success status
    #[error("Forecast service returned status {0}")]
    Status(u16),

    /// The response body could not be turned into a forecast
    #[error("Malformed forecast payload: {0}")]
    Payload(String),
}

/// Type alias for Results using DataLoadError
pub type Result<T> = std::result::Result<T, DataLoadError>;
