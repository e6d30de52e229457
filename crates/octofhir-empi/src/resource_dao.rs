//! Read and search helpers over the partitioned store.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use octofhir_partition::PartitionedStorage;
use octofhir_storage::{SearchParams, StoredResource};

use crate::error::{EmpiError, Result};
use crate::settings::EmpiSettings;

/// Data access used by identity linkage.
#[derive(Debug, Clone)]
pub struct EmpiResourceDaoSvc {
    storage: Arc<PartitionedStorage>,
    settings: EmpiSettings,
}

impl EmpiResourceDaoSvc {
    pub fn new(storage: Arc<PartitionedStorage>, settings: EmpiSettings) -> Self {
        Self { storage, settings }
    }

    pub fn settings(&self) -> &EmpiSettings {
        &self.settings
    }

    async fn read(&self, resource_type: &str, id: &str) -> Result<Value> {
        self.storage
            .read(resource_type, id)
            .await?
            .map(|stored| stored.resource)
            .ok_or_else(|| EmpiError::not_found(resource_type, id))
    }

    pub async fn read_patient(&self, id: &str) -> Result<Value> {
        self.read("Patient", id).await
    }

    pub async fn read_person(&self, id: &str) -> Result<Value> {
        self.read("Person", id).await
    }

    pub async fn read_practitioner(&self, id: &str) -> Result<Value> {
        self.read("Practitioner", id).await
    }

    /// Create or update a Person that already carries an id.
    pub async fn update_person(&self, person: &Value) -> Result<StoredResource> {
        Ok(self.storage.update(person).await?)
    }

    /// Create a Person with a server-assigned id.
    pub async fn create_person(&self, person: &Value) -> Result<StoredResource> {
        Ok(self.storage.create(person).await?)
    }

    /// First Person carrying `eid` under the enterprise EID system.
    ///
    /// `None` when there is no such Person; zero results is not an error.
    pub async fn search_person_by_eid(&self, eid: &str) -> Result<Option<Value>> {
        let params = SearchParams::new()
            .with_param(
                "identifier",
                format!("{}|{eid}", self.settings.enterprise_eid_system),
            )
            .with_count(1);
        let found = self
            .storage
            .search("Person", &params)
            .await?
            .into_first()
            .map(|stored| stored.resource);
        debug!(eid = %eid, found = found.is_some(), "Searched Person by EID");
        Ok(found)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use octofhir_partition::{PartitionSettings, PatientIdPartitionRouter};
    use octofhir_storage::InMemoryStorage;
    use serde_json::json;

    pub(crate) fn dao() -> EmpiResourceDaoSvc {
        let router = PatientIdPartitionRouter::new(PartitionSettings::default()).unwrap();
        let storage = PartitionedStorage::new(Arc::new(InMemoryStorage::new()), router);
        EmpiResourceDaoSvc::new(
            Arc::new(storage),
            EmpiSettings {
                enabled: true,
                enterprise_eid_system: "urn:eid".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let err = dao().read_patient("nope").await.unwrap_err();
        assert!(matches!(err, EmpiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_read_by_type() {
        let dao = dao();
        dao.storage
            .update(&json!({"resourceType": "Patient", "id": "A"}))
            .await
            .unwrap();
        dao.storage
            .update(&json!({"resourceType": "Practitioner", "id": "P"}))
            .await
            .unwrap();

        assert_eq!(dao.read_patient("A").await.unwrap()["id"], "A");
        assert_eq!(dao.read_practitioner("P").await.unwrap()["id"], "P");
        assert!(dao.read_person("A").await.is_err());
    }

    #[tokio::test]
    async fn test_search_person_by_eid() {
        let dao = dao();
        assert!(dao.search_person_by_eid("E-1").await.unwrap().is_none());

        let created = dao
            .create_person(&json!({
                "resourceType": "Person",
                "identifier": [{"system": "urn:eid", "value": "E-1"}]
            }))
            .await
            .unwrap();

        let found = dao.search_person_by_eid("E-1").await.unwrap().unwrap();
        assert_eq!(found["id"], created.id.as_str());
        assert_eq!(dao.read_person(&created.id).await.unwrap()["id"], created.id.as_str());

        // Same value under another system is not a match.
        dao.create_person(&json!({
            "resourceType": "Person",
            "identifier": [{"system": "urn:other", "value": "E-2"}]
        }))
        .await
        .unwrap();
        assert!(dao.search_person_by_eid("E-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_person_bumps_version() {
        let dao = dao();
        let person = json!({"resourceType": "Person", "id": "X"});
        assert_eq!(dao.update_person(&person).await.unwrap().version_id, "1");
        assert_eq!(dao.update_person(&person).await.unwrap().version_id, "2");
    }
}
