//! Error types for queue storage operations.

use thiserror::Error;

/// Comprehensive error type for all queue storage operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Queue already exists with different metadata: {queue_name}")]
    QueueAlreadyExists { queue_name: String },

    #[error("Queue is being deleted: {queue_name}")]
    QueueBeingDeleted { queue_name: String },

    #[error("Message not found: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("Pop receipt does not match the latest dequeue of message {message_id}")]
    PopReceiptMismatch { message_id: String },

    #[error("Connection refused by {endpoint}")]
    ConnectionRefused { endpoint: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Service error ({status}): {code} - {message}")]
    ServiceError {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid response from service: {message}")]
    InvalidResponse { message: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl QueueError {
    /// Whether the remote endpoint actively refused the connection.
    ///
    /// This is the typical symptom of a storage emulator that is not running.
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused { .. })
    }

    /// Whether the error reports a missing queue or message.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::QueueNotFound { .. } | Self::MessageNotFound { .. }
        )
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Connection string parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
