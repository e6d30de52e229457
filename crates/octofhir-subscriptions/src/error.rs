//! Subscription error types.

use octofhir_core::CoreError;

/// Result type for subscription operations.
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

/// Errors that can occur while matching or delivering.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// Subscription not found
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Criteria the matcher cannot evaluate
    #[error("Unsupported criteria '{criteria}': {reason}")]
    UnsupportedCriteria { criteria: String, reason: String },

    /// Payload of the event could not be resolved
    #[error("Payload error: {0}")]
    Payload(#[from] CoreError),

    /// Channel delivery error
    #[error("Delivery error: {0}")]
    DeliveryError(String),

    /// Receiving side of a channel is gone
    #[error("Delivery channel '{0}' is closed")]
    ChannelClosed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SubscriptionError {
    pub fn unsupported_criteria(criteria: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedCriteria {
            criteria: criteria.into(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for SubscriptionError {
    fn from(e: reqwest::Error) -> Self {
        Self::DeliveryError(e.to_string())
    }
}
