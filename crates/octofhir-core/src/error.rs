use thiserror::Error;

/// Core error types shared by the pipeline crates
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid resource data: {message}")]
    InvalidResource { message: String },

    #[error("Payload unavailable for {resource_type}/{id}: {reason}")]
    PayloadUnavailable {
        resource_type: String,
        id: String,
        reason: String,
    },
}

impl CoreError {
    /// Create a new InvalidResource error
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    /// Create a new PayloadUnavailable error
    pub fn payload_unavailable(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PayloadUnavailable {
            resource_type: resource_type.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidResource { .. })
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
