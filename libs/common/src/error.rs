//! Custom error types for the common library
//!
//! This module defines the error taxonomy shared by the API client and the
//! review capture flow, plus the storage and configuration errors.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Fallback message for a server error without a usable `error` field
pub const SERVER_FALLBACK_MESSAGE: &str = "An error occurred";
/// Message surfaced when the server could not be reached
pub const NETWORK_MESSAGE: &str = "Unable to connect to the server";
/// Message surfaced when a bounded wait elapsed
pub const TIMEOUT_MESSAGE: &str = "The server took too long to respond";
/// Message surfaced for any other failure
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred";

/// The three kinds every client failure is normalized into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Non-2xx response from the server
    Server,
    /// The request never reached the server or no response came back
    Network,
    /// Anything else
    Unexpected,
}

/// Normalized error returned by every outbound client operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Non-2xx response, message taken verbatim from the payload
    #[error("{message}")]
    Server { status: u16, message: String },

    /// Connectivity failure
    #[error("Network error: {0}")]
    Network(String),

    /// The bounded wait for a response elapsed
    #[error("Request timed out")]
    Timeout,

    /// Malformed payload, storage failure or programming error
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// Input rejected before any request was sent
    #[error("{0}")]
    Validation(String),
}

#[derive(Deserialize)]
struct ErrorPayload {
    error: Option<String>,
}

impl ClientError {
    /// Map onto the three-kind taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Server { .. } => ErrorKind::Server,
            ClientError::Network(_) | ClientError::Timeout => ErrorKind::Network,
            ClientError::Unexpected(_) | ClientError::Validation(_) => ErrorKind::Unexpected,
        }
    }

    /// Text suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Server { message, .. } => message.clone(),
            ClientError::Network(_) => NETWORK_MESSAGE.to_string(),
            ClientError::Timeout => TIMEOUT_MESSAGE.to_string(),
            ClientError::Unexpected(_) => UNEXPECTED_MESSAGE.to_string(),
            ClientError::Validation(message) => message.clone(),
        }
    }

    /// True for an HTTP 401 response
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Server { status: 401, .. })
    }

    /// Build a server error from a status code and a raw response body
    pub fn from_status_and_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorPayload>(body)
            .ok()
            .and_then(|payload| payload.error)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| SERVER_FALLBACK_MESSAGE.to_string());

        ClientError::Server { status, message }
    }

    /// Consume a non-2xx response into a server error
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => Self::from_status_and_body(status, &body),
            Err(e) => {
                debug!("Failed to read error body for status {}: {}", status, e);
                ClientError::Server {
                    status,
                    message: SERVER_FALLBACK_MESSAGE.to_string(),
                }
            }
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() || err.is_builder() {
            ClientError::Unexpected(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::Server {
                status: status.as_u16(),
                message: SERVER_FALLBACK_MESSAGE.to_string(),
            }
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Unexpected(err.to_string())
    }
}

impl From<StorageError> for ClientError {
    fn from(err: StorageError) -> Self {
        ClientError::Unexpected(err.to_string())
    }
}

/// Type alias for Result with ClientError
pub type ClientResult<T> = Result<T, ClientError>;

/// Custom error type for client storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error reading or writing the backing file
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error encoding or decoding the stored map
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store's lock was poisoned by a panicking writer
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Type alias for Result with StorageError
pub type StorageResult<T> = Result<T, StorageError>;

/// Custom error type for configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error raised by the layered configuration loader
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    /// A value parsed but is not usable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Type alias for Result with ConfigError
pub type ConfigResult<T> = Result<T, ConfigError>;
