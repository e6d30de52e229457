//! In-memory storage backend keyed by `ResourceType/id`.
//!
//! Intended for tests, local runs and the pipeline binary. Only the current
//! version of each resource is kept.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tracing::trace;
use uuid::Uuid;

use octofhir_core::{PartitionId, RequestPartition, param_values};

use crate::error::StorageError;
use crate::traits::{FhirStorage, resource_type_of};
use crate::types::{SearchParams, SearchResult, StoredResource};

type StorageKey = String;

fn make_storage_key(resource_type: &str, id: &str) -> StorageKey {
    format!("{resource_type}/{id}")
}

/// In-memory FHIR storage backend using a concurrent `DashMap`.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    data: DashMap<StorageKey, StoredResource>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored resources across all partitions.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn with_id(resource: &Value, id: &str) -> Value {
    let mut resource = resource.clone();
    if let Some(obj) = resource.as_object_mut() {
        obj.insert("id".to_string(), Value::String(id.to_string()));
    }
    resource
}

/// Whether `resource` carries `expected` for `param`.
///
/// A bare id also matches a `Type/id` reference.
fn param_matches(resource: &Value, param: &str, expected: &[String]) -> bool {
    let actual = param_values(resource, param);
    expected.iter().any(|want| {
        actual.iter().any(|have| {
            have == want
                || (!want.contains('/')
                    && have
                        .rsplit_once('/')
                        .is_some_and(|(_, id)| id == want.as_str()))
        })
    })
}

#[async_trait]
impl FhirStorage for InMemoryStorage {
    async fn create(
        &self,
        resource: &Value,
        partition: PartitionId,
    ) -> Result<StoredResource, StorageError> {
        let resource_type = resource_type_of(resource)?;
        let id = Uuid::new_v4().to_string();
        let stored = StoredResource::new(&id, resource_type, partition, with_id(resource, &id));

        match self.data.entry(make_storage_key(resource_type, &id)) {
            Entry::Occupied(_) => Err(StorageError::already_exists(resource_type, id)),
            Entry::Vacant(slot) => {
                slot.insert(stored.clone());
                trace!(resource_type = %resource_type, id = %id, partition = %partition, "Stored new resource");
                Ok(stored)
            }
        }
    }

    async fn read(
        &self,
        partition: &RequestPartition,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, StorageError> {
        Ok(self
            .data
            .get(&make_storage_key(resource_type, id))
            .filter(|stored| partition.contains(&stored.partition))
            .map(|stored| stored.value().clone()))
    }

    async fn update(
        &self,
        resource: &Value,
        partition: PartitionId,
    ) -> Result<StoredResource, StorageError> {
        let resource_type = resource_type_of(resource)?;
        let id = resource
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StorageError::invalid_resource("Update requires a resource id"))?;

        let stored = match self.data.entry(make_storage_key(resource_type, id)) {
            Entry::Occupied(mut slot) => {
                let next = slot.get().new_version(partition, resource.clone());
                slot.insert(next.clone());
                next
            }
            Entry::Vacant(slot) => {
                let first = StoredResource::new(id, resource_type, partition, resource.clone());
                slot.insert(first.clone());
                first
            }
        };
        trace!(
            resource_type = %resource_type,
            id = %id,
            version = %stored.version_id,
            partition = %partition,
            "Stored resource version"
        );
        Ok(stored)
    }

    async fn delete(
        &self,
        partition: &RequestPartition,
        resource_type: &str,
        id: &str,
    ) -> Result<(), StorageError> {
        self.data
            .remove_if(&make_storage_key(resource_type, id), |_, stored| {
                partition.contains(&stored.partition)
            })
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(resource_type, id))
    }

    async fn search(
        &self,
        partition: &RequestPartition,
        resource_type: &str,
        params: &SearchParams,
    ) -> Result<SearchResult, StorageError> {
        let prefix = format!("{resource_type}/");
        let mut entries: Vec<StoredResource> = self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .filter(|entry| partition.contains(&entry.partition))
            .filter(|entry| {
                params
                    .parameters
                    .iter()
                    .all(|(param, values)| param_matches(&entry.resource, param, values))
            })
            .map(|entry| entry.value().clone())
            .collect();

        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if let Some(count) = params.count {
            entries.truncate(count as usize);
        }
        Ok(SearchResult::with_entries(entries))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
