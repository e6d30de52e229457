//! Storage traits for the FHIR storage abstraction layer.

use async_trait::async_trait;
use serde_json::Value;

use octofhir_core::{PartitionId, RequestPartition};

use crate::error::StorageError;
use crate::types::{SearchParams, SearchResult, StoredResource};

/// The main storage trait that all FHIR storage backends must implement.
///
/// Every write names the partition it lands in; every read names the
/// partitions it may see. Deciding the partition is the caller's job
/// (see the partition routing crate).
///
/// # Example
///
/// ```ignore
/// use octofhir_storage::{FhirStorage, RequestPartition, StorageError, StoredResource};
///
/// async fn get_patient(storage: &dyn FhirStorage, id: &str) -> Result<StoredResource, StorageError> {
///     storage
///         .read(&RequestPartition::All, "Patient", id)
///         .await?
///         .ok_or_else(|| StorageError::not_found("Patient", id))
/// }
/// ```
#[async_trait]
pub trait FhirStorage: Send + Sync {
    /// Creates a new resource with a server-assigned id.
    ///
    /// Any `id` present on the input is replaced.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidResource` if the resource is malformed.
    async fn create(
        &self,
        resource: &Value,
        partition: PartitionId,
    ) -> Result<StoredResource, StorageError>;

    /// Reads a resource by type and ID within the given partitions.
    ///
    /// Returns `None` if the resource does not exist or is not visible.
    async fn read(
        &self,
        partition: &RequestPartition,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, StorageError>;

    /// Creates or updates a resource with a caller-assigned id.
    ///
    /// The first write produces version 1; later writes bump the version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidResource` if `resourceType` or `id` is missing.
    async fn update(
        &self,
        resource: &Value,
        partition: PartitionId,
    ) -> Result<StoredResource, StorageError>;

    /// Deletes a resource by type and ID within the given partitions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the resource does not exist.
    async fn delete(
        &self,
        partition: &RequestPartition,
        resource_type: &str,
        id: &str,
    ) -> Result<(), StorageError>;

    /// Searches for resources of a given type within the given partitions.
    async fn search(
        &self,
        partition: &RequestPartition,
        resource_type: &str,
        params: &SearchParams,
    ) -> Result<SearchResult, StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// Extract `resourceType` from resource JSON.
pub(crate) fn resource_type_of(resource: &Value) -> Result<&str, StorageError> {
    resource
        .get("resourceType")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| StorageError::invalid_resource("Resource is missing resourceType"))
}
