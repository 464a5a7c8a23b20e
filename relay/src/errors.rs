use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Errors raised while talking to a metrics backend
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("backend responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),
}

/// Errors that can occur while relaying webhook events
#[derive(Error, Debug)]
pub enum RelayError {
    /// The time-series write was rejected; counters were not sent.
    #[error("time-series write failed: {0}")]
    BackendWrite(#[source] SinkError),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("could not set up metrics backend: {0}")]
    BackendSetup(#[source] SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
