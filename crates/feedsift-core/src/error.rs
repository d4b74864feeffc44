//! Error types for feedsift

use crate::types::SubscriptionId;

/// Result type alias using feedsift's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for feedsift operations
///
/// Only [`Error::ConfigurationInvalid`] is fatal, and only at startup. Every
/// other variant is contained at the task boundary that produced it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A content source could not be reached or refused the request
    #[error("source unavailable: {source_name}: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// The classifier did not answer within its deadline
    #[error("classifier timed out")]
    ClassifierTimeout,

    /// The classifier call failed at the transport level
    #[error("classifier transport error: {0}")]
    ClassifierTransport(String),

    /// The classifier answered with something that is not a verdict
    #[error("invalid classifier response: {0}")]
    ClassifierResponse(String),

    /// A registry operation raced an unregister
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    /// The client went away while a delivery loop was writing to it
    #[error("client disconnected")]
    ClientDisconnected,

    /// Configuration failed validation
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    /// An upstream update could not be normalized
    #[error("malformed update: {0}")]
    MalformedUpdate(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new source-unavailable error
    pub fn source_unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new classifier transport error
    pub fn classifier_transport(msg: impl Into<String>) -> Self {
        Self::ClassifierTransport(msg.into())
    }

    /// Create a new invalid-response error
    pub fn classifier_response(msg: impl Into<String>) -> Self {
        Self::ClassifierResponse(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationInvalid(msg.into())
    }

    /// Create a new malformed-update error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedUpdate(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the condition is expected to clear on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. }
                | Self::ClassifierTimeout
                | Self::ClassifierTransport(_)
                | Self::Io(_)
        )
    }
}
