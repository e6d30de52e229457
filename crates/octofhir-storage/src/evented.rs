//! EventedStorage - A storage wrapper that emits change events after writes.
//!
//! This wrapper delegates all operations to an inner storage implementation
//! while publishing exactly one `ChangeEvent` per successful mutation.
//!
//! # Example
//!
//! ```ignore
//! use octofhir_storage::{EventedStorage, InMemoryStorage};
//! use octofhir_core::events::EventBroadcaster;
//!
//! let broadcaster = EventBroadcaster::new_shared();
//! let storage = EventedStorage::new(InMemoryStorage::new(), broadcaster);
//!
//! // After this, an event will be published to the broadcaster
//! storage.update(&patient_json, partition).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use octofhir_core::events::{ChangeEvent, EventBroadcaster};
use octofhir_core::{PartitionId, RequestPartition};
use serde_json::Value;
use tracing::debug;

use crate::error::StorageError;
use crate::traits::FhirStorage;
use crate::types::{SearchParams, SearchResult, StoredResource};

/// A storage wrapper that publishes change events after successful writes.
///
/// Events are published **after** the inner write succeeds, so a failed
/// write never produces an event.
pub struct EventedStorage<S: FhirStorage> {
    /// The inner storage implementation.
    inner: S,
    /// The event broadcaster.
    broadcaster: Arc<EventBroadcaster>,
}

impl<S: FhirStorage> EventedStorage<S> {
    /// Create a new evented storage wrapper.
    pub fn new(inner: S, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { inner, broadcaster }
    }

    /// Get a reference to the inner storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a reference to the broadcaster.
    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    fn emit_written(&self, stored: &StoredResource) {
        let event = if stored.is_first_version() {
            ChangeEvent::created(&stored.resource_type, &stored.id, stored.resource.clone())
        } else {
            ChangeEvent::updated(&stored.resource_type, &stored.id, stored.resource.clone())
        }
        .with_version(stored.version_number())
        .with_partition(stored.partition);

        let operation = event.operation;
        let count = self.broadcaster.publish(event);
        debug!(
            resource_type = %stored.resource_type,
            resource_id = %stored.id,
            operation = %operation,
            subscribers = count,
            "Emitted change event"
        );
    }

    fn emit_deleted(&self, partition: &RequestPartition, resource_type: &str, resource_id: &str) {
        let mut event = ChangeEvent::deleted(resource_type, resource_id);
        if let RequestPartition::One(p) = partition {
            event = event.with_partition(*p);
        }
        let count = self.broadcaster.publish(event);
        debug!(
            resource_type = %resource_type,
            resource_id = %resource_id,
            subscribers = count,
            "Emitted delete event"
        );
    }
}

#[async_trait]
impl<S: FhirStorage> FhirStorage for EventedStorage<S> {
    async fn create(
        &self,
        resource: &Value,
        partition: PartitionId,
    ) -> Result<StoredResource, StorageError> {
        let result = self.inner.create(resource, partition).await?;
        self.emit_written(&result);
        Ok(result)
    }

    async fn read(
        &self,
        partition: &RequestPartition,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, StorageError> {
        self.inner.read(partition, resource_type, id).await
    }

    async fn update(
        &self,
        resource: &Value,
        partition: PartitionId,
    ) -> Result<StoredResource, StorageError> {
        let result = self.inner.update(resource, partition).await?;
        self.emit_written(&result);
        Ok(result)
    }

    async fn delete(
        &self,
        partition: &RequestPartition,
        resource_type: &str,
        id: &str,
    ) -> Result<(), StorageError> {
        self.inner.delete(partition, resource_type, id).await?;
        self.emit_deleted(partition, resource_type, id);
        Ok(())
    }

    async fn search(
        &self,
        partition: &RequestPartition,
        resource_type: &str,
        params: &SearchParams,
    ) -> Result<SearchResult, StorageError> {
        self.inner.search(partition, resource_type, params).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

impl<S: FhirStorage> std::fmt::Debug for EventedStorage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventedStorage")
            .field("backend", &self.inner.backend_name())
            .field("subscriber_count", &self.broadcaster.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStorage;
    use octofhir_core::OperationType;
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;

    fn evented() -> EventedStorage<InMemoryStorage> {
        EventedStorage::new(InMemoryStorage::new(), EventBroadcaster::new_shared())
    }

    #[tokio::test]
    async fn test_one_event_per_write() {
        let storage = evented();
        let mut rx = storage.broadcaster().subscribe();
        let patient = json!({"resourceType": "Patient", "id": "A"});
        let p = PartitionId::Numbered(65);

        storage.update(&patient, p).await.unwrap();
        storage.update(&patient, p).await.unwrap();
        storage.delete(&p.into(), "Patient", "A").await.unwrap();

        let created = rx.recv().await.unwrap();
        assert_eq!(created.operation, OperationType::Create);
        assert_eq!(created.version_id, Some(1));
        assert_eq!(created.partition, Some(p));

        let updated = rx.recv().await.unwrap();
        assert_eq!(updated.operation, OperationType::Update);
        assert_eq!(updated.version_id, Some(2));

        let deleted = rx.recv().await.unwrap();
        assert_eq!(deleted.operation, OperationType::Delete);
        assert!(deleted.payload.is_absent());

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_failed_write_emits_nothing() {
        let storage = evented();
        let mut rx = storage.broadcaster().subscribe();

        assert!(storage.update(&json!({"resourceType": "Patient"}), PartitionId::Default).await.is_err());
        assert!(storage.delete(&RequestPartition::All, "Patient", "missing").await.is_err());

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_reads_emit_nothing() {
        let storage = evented();
        storage
            .create(&json!({"resourceType": "Organization"}), PartitionId::Default)
            .await
            .unwrap();
        let mut rx = storage.broadcaster().subscribe();

        storage
            .search(&RequestPartition::All, "Organization", &SearchParams::new())
            .await
            .unwrap();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
}
