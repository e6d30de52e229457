use octofhir_core::CoreError;
use octofhir_storage::StorageError;

/// Errors raised by identity linkage.
#[derive(Debug, thiserror::Error)]
pub enum EmpiError {
    #[error("Unsupported resource type submitted to EMPI matching queue: {0}")]
    UnsupportedResourceType(String),

    #[error("Resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Linking failed: {0}")]
    Link(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Payload(#[from] CoreError),
}

impl EmpiError {
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Whether retrying the same event can never succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedResourceType(_) | Self::InvalidResource(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EmpiError>;
