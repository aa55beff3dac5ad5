// Typed errors for configuration and the host REST boundary
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("widget {widget}: {field} must be {requirement}")]
    Invalid {
        widget: String,
        field: &'static str,
        requirement: &'static str,
    },

    #[error("widget {widget}: min ({min}) must be below max ({max})")]
    InvertedRange { widget: String, min: f64, max: f64 },

    #[error("duplicate widget id {0}")]
    DuplicateId(String),

    #[error("invalid listen address {0}")]
    ListenAddress(String),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("failed to send request to host")]
    Request(#[from] reqwest::Error),

    #[error("host request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("unexpected host response: {0}")]
    Payload(String),
}
