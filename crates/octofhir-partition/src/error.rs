use octofhir_storage::StorageError;

/// Errors raised while routing a request to a partition.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// The resource cannot be placed in any partition; the write must not happen.
    #[error("{message}")]
    PreconditionFailed { message: String },

    /// The request cannot be routed to a partition.
    #[error("{message}")]
    UnsupportedRequest { message: String },

    /// Routing configuration is unusable.
    #[error("Partition configuration error: {0}")]
    Configuration(String),
}

impl PartitionError {
    pub fn no_compartment_values(resource_type: &str, compartment: &str) -> Self {
        Self::PreconditionFailed {
            message: format!(
                "Resource of type {resource_type} has no values placing it in the {compartment} compartment"
            ),
        }
    }

    pub fn unsupported_search() -> Self {
        Self::UnsupportedRequest {
            message: "This server is not able to handle this request of type SEARCH_TYPE".into(),
        }
    }
}

impl From<PartitionError> for StorageError {
    fn from(e: PartitionError) -> Self {
        match e {
            PartitionError::PreconditionFailed { message } => {
                StorageError::precondition_failed(message)
            }
            PartitionError::UnsupportedRequest { message } => StorageError::invalid_request(message),
            PartitionError::Configuration(message) => StorageError::internal(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, PartitionError>;
