//! Storage front that applies partition routing before every operation.

use serde_json::Value;
use tracing::warn;

use octofhir_storage::{
    DynStorage, SearchParams, SearchResult, StorageError, StorageResult, StoredResource,
};

use crate::router::PatientIdPartitionRouter;

/// Routes writes, reads and searches through a [`PatientIdPartitionRouter`].
///
/// A routing failure surfaces as a [`StorageError`] and the inner storage is
/// never called, so nothing is persisted and no change event is published.
#[derive(Clone)]
pub struct PartitionedStorage {
    inner: DynStorage,
    router: PatientIdPartitionRouter,
}

impl PartitionedStorage {
    pub fn new(inner: DynStorage, router: PatientIdPartitionRouter) -> Self {
        Self { inner, router }
    }

    pub fn router(&self) -> &PatientIdPartitionRouter {
        &self.router
    }

    pub fn inner(&self) -> &DynStorage {
        &self.inner
    }

    /// Create with a server-assigned id.
    pub async fn create(&self, resource: &Value) -> StorageResult<StoredResource> {
        let partition = self.router.assign_partition(resource, false).map_err(|e| {
            warn!(error = %e, "Rejected create");
            StorageError::from(e)
        })?;
        self.inner.create(resource, partition).await
    }

    /// Create or update with a caller-assigned id.
    pub async fn update(&self, resource: &Value) -> StorageResult<StoredResource> {
        let partition = self.router.assign_partition(resource, true).map_err(|e| {
            warn!(error = %e, "Rejected update");
            StorageError::from(e)
        })?;
        self.inner.update(resource, partition).await
    }

    pub async fn read(&self, resource_type: &str, id: &str) -> StorageResult<Option<StoredResource>> {
        let partition = self.router.identify_for_read(resource_type, id);
        self.inner.read(&partition, resource_type, id).await
    }

    pub async fn delete(&self, resource_type: &str, id: &str) -> StorageResult<()> {
        let partition = self.router.identify_for_read(resource_type, id);
        self.inner.delete(&partition, resource_type, id).await
    }

    pub async fn search(
        &self,
        resource_type: &str,
        params: &SearchParams,
    ) -> StorageResult<SearchResult> {
        let partition = self.router.identify_for_search(resource_type, params)?;
        self.inner.search(&partition, resource_type, params).await
    }
}

impl std::fmt::Debug for PartitionedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedStorage")
            .field("backend", &self.inner.backend_name())
            .field("compartment", &self.router.compartment().code)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PartitionSettings;
    use octofhir_core::{EventBroadcaster, OperationType, PartitionId, RequestPartition};
    use octofhir_storage::{EventedStorage, FhirStorage, InMemoryStorage};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc::error::TryRecvError;

    fn setup() -> (PartitionedStorage, Arc<EventBroadcaster>) {
        let broadcaster = EventBroadcaster::new_shared();
        let evented = EventedStorage::new(InMemoryStorage::new(), broadcaster.clone());
        let router = PatientIdPartitionRouter::new(PartitionSettings::default()).unwrap();
        (PartitionedStorage::new(Arc::new(evented), router), broadcaster)
    }

    #[tokio::test]
    async fn test_patient_and_observation_share_partition() {
        let (storage, _) = setup();

        let patient = storage
            .update(&json!({"resourceType": "Patient", "id": "A", "active": true}))
            .await
            .unwrap();
        assert_eq!(patient.partition, PartitionId::Numbered(65));

        let obs = storage
            .create(&json!({"resourceType": "Observation", "subject": {"reference": "Patient/A"}}))
            .await
            .unwrap();
        assert_eq!(obs.partition, PartitionId::Numbered(65));

        let read = storage.read("Patient", "A").await.unwrap().unwrap();
        assert_eq!(read.partition, PartitionId::Numbered(65));

        let found = storage
            .search(
                "Observation",
                &SearchParams::new().with_param("subject", "Patient/A"),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.entries[0].id, obs.id);
    }

    #[tokio::test]
    async fn test_server_assigned_patient_rejected_and_not_persisted() {
        let (storage, broadcaster) = setup();
        let mut rx = broadcaster.subscribe();

        let err = storage
            .create(&json!({"resourceType": "Patient", "active": true}))
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
        assert_eq!(
            err.to_string(),
            "Resource of type Patient has no values placing it in the Patient compartment"
        );

        let all = storage
            .inner()
            .search(&RequestPartition::All, "Patient", &SearchParams::new())
            .await
            .unwrap();
        assert!(all.is_empty());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_organization_in_default_partition() {
        let (storage, broadcaster) = setup();
        let mut rx = broadcaster.subscribe();

        let org = storage
            .create(&json!({"resourceType": "Organization", "name": "Acme"}))
            .await
            .unwrap();
        assert_eq!(org.partition, PartitionId::Numbered(-1));

        let read = storage.read("Organization", &org.id).await.unwrap();
        assert!(read.is_some());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.operation, OperationType::Create);
        assert_eq!(event.partition, Some(PartitionId::Numbered(-1)));
    }

    #[tokio::test]
    async fn test_observation_search_without_compartment_param_rejected() {
        let (storage, _) = setup();
        let err = storage
            .search("Observation", &SearchParams::new().with_param("status", "final"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRequest { .. }));
        assert_eq!(
            err.to_string(),
            "This server is not able to handle this request of type SEARCH_TYPE"
        );
    }

    #[tokio::test]
    async fn test_delete_routes_to_owner_partition() {
        let (storage, _) = setup();
        storage
            .update(&json!({"resourceType": "Patient", "id": "A"}))
            .await
            .unwrap();
        storage.delete("Patient", "A").await.unwrap();
        assert!(storage.read("Patient", "A").await.unwrap().is_none());
    }
}
