//! Match-and-link services.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{EmpiError, Result};
use crate::resource_dao::EmpiResourceDaoSvc;
use crate::util::enterprise_eid;

/// Links a Patient or Practitioner to its Person.
#[async_trait]
pub trait EmpiMatchLinkSvc: Send + Sync {
    async fn update_links_for_target(&self, target: &Value) -> Result<()>;
}

/// Links targets to the Person that shares their enterprise identifier.
///
/// - Person with the EID exists: add a link to the target (once) and update it.
/// - No such Person: create one carrying the EID and the link.
/// - Target without an EID: left unlinked.
///
/// Targets sharing an EID are linked one at a time, so concurrent workers
/// never both miss the search and create two Persons.
#[derive(Debug, Clone)]
pub struct EidMatchLinkSvc {
    dao: Arc<EmpiResourceDaoSvc>,
    eid_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl EidMatchLinkSvc {
    pub fn new(dao: Arc<EmpiResourceDaoSvc>) -> Self {
        Self {
            dao,
            eid_locks: Arc::new(DashMap::new()),
        }
    }

    fn eid_lock(&self, eid: &str) -> Arc<Mutex<()>> {
        self.eid_locks.entry(eid.to_string()).or_default().clone()
    }

    /// Forget the lock once no other caller holds it.
    fn release_eid_lock(&self, eid: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.eid_locks
            .remove_if(eid, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn link(&self, target_ref: &str, eid: &str, system: &str) -> Result<()> {
        match self.dao.search_person_by_eid(eid).await? {
            Some(mut person) => {
                if has_link(&person, target_ref) {
                    debug!(target = %target_ref, eid = %eid, "Target already linked");
                    return Ok(());
                }
                let links = person
                    .as_object_mut()
                    .ok_or_else(|| EmpiError::Link("Person is not a JSON object".into()))?
                    .entry("link")
                    .or_insert_with(|| Value::Array(Vec::new()));
                match links.as_array_mut() {
                    Some(links) => links.push(link_entry(target_ref)),
                    None => return Err(EmpiError::Link("Person.link is not an array".into())),
                }
                let stored = self.dao.update_person(&person).await?;
                info!(target = %target_ref, person = %stored.id, eid = %eid, "Linked target to existing Person");
            }
            None => {
                let person = json!({
                    "resourceType": "Person",
                    "active": true,
                    "identifier": [{"system": system, "value": eid}],
                    "link": [link_entry(target_ref)],
                });
                let stored = self.dao.create_person(&person).await?;
                info!(target = %target_ref, person = %stored.id, eid = %eid, "Created Person for target");
            }
        }
        Ok(())
    }
}

fn target_reference(target: &Value) -> Result<String> {
    let resource_type = target
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| EmpiError::InvalidResource("target has no resourceType".into()))?;
    let id = target
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| EmpiError::InvalidResource(format!("{resource_type} target has no id")))?;
    Ok(format!("{resource_type}/{id}"))
}

fn has_link(person: &Value, reference: &str) -> bool {
    person
        .get("link")
        .and_then(Value::as_array)
        .is_some_and(|links| {
            links.iter().any(|link| {
                link.pointer("/target/reference").and_then(Value::as_str) == Some(reference)
            })
        })
}

fn link_entry(reference: &str) -> Value {
    json!({"target": {"reference": reference}, "assurance": "level3"})
}

#[async_trait]
impl EmpiMatchLinkSvc for EidMatchLinkSvc {
    async fn update_links_for_target(&self, target: &Value) -> Result<()> {
        let reference = target_reference(target)?;
        let system = &self.dao.settings().enterprise_eid_system;

        let Some(eid) = enterprise_eid(target, system) else {
            info!(target = %reference, "Target has no enterprise identifier, not linking");
            return Ok(());
        };

        let lock = self.eid_lock(&eid);
        let result = {
            let _guard = lock.lock().await;
            self.link(&reference, &eid, system).await
        };
        self.release_eid_lock(&eid, lock);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_dao::tests::dao;
    use crate::settings::EmpiSettings;
    use octofhir_partition::{PartitionSettings, PartitionedStorage, PatientIdPartitionRouter};
    use octofhir_storage::{InMemoryStorage, SearchParams};

    fn patient(id: &str, eid: Option<&str>) -> Value {
        let mut patient = json!({"resourceType": "Patient", "id": id});
        if let Some(eid) = eid {
            patient["identifier"] = json!([{"system": "urn:eid", "value": eid}]);
        }
        patient
    }

    #[tokio::test]
    async fn test_creates_person_then_links_second_target() {
        let dao = Arc::new(dao());
        let svc = EidMatchLinkSvc::new(dao.clone());

        svc.update_links_for_target(&patient("A", Some("E-1"))).await.unwrap();
        let person = dao.search_person_by_eid("E-1").await.unwrap().unwrap();
        assert!(has_link(&person, "Patient/A"));

        let practitioner = json!({
            "resourceType": "Practitioner",
            "id": "P",
            "identifier": [{"system": "urn:eid", "value": "E-1"}]
        });
        svc.update_links_for_target(&practitioner).await.unwrap();
        let person = dao.search_person_by_eid("E-1").await.unwrap().unwrap();
        assert!(has_link(&person, "Patient/A"));
        assert!(has_link(&person, "Practitioner/P"));
    }

    #[tokio::test]
    async fn test_linking_is_idempotent() {
        let dao = Arc::new(dao());
        let svc = EidMatchLinkSvc::new(dao.clone());
        let target = patient("A", Some("E-1"));

        svc.update_links_for_target(&target).await.unwrap();
        svc.update_links_for_target(&target).await.unwrap();

        let person = dao.search_person_by_eid("E-1").await.unwrap().unwrap();
        assert_eq!(person["link"].as_array().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_targets_with_same_eid_share_one_person() {
        let router = PatientIdPartitionRouter::new(PartitionSettings::default()).unwrap();
        let storage = Arc::new(PartitionedStorage::new(
            Arc::new(InMemoryStorage::new()),
            router,
        ));
        let settings = EmpiSettings {
            enabled: true,
            enterprise_eid_system: "urn:eid".into(),
        };
        let dao = Arc::new(EmpiResourceDaoSvc::new(storage.clone(), settings));
        let svc = EidMatchLinkSvc::new(dao);

        let targets: Vec<_> = (0..8)
            .map(|i| patient(&format!("P{i}"), Some("E-1")))
            .collect();
        let results = futures_util::future::join_all(targets.iter().map(|target| {
            let svc = svc.clone();
            let target = target.clone();
            tokio::spawn(async move { svc.update_links_for_target(&target).await })
        }))
        .await;
        for result in results {
            result.unwrap().unwrap();
        }

        let persons = storage.search("Person", &SearchParams::new()).await.unwrap();
        assert_eq!(persons.len(), 1);
        let person = &persons.entries[0].resource;
        assert_eq!(person["link"].as_array().unwrap().len(), 8);
        assert!(svc.eid_locks.is_empty());
    }

    #[tokio::test]
    async fn test_target_without_eid_is_left_alone() {
        let dao = Arc::new(dao());
        let svc = EidMatchLinkSvc::new(dao.clone());
        svc.update_links_for_target(&patient("A", None)).await.unwrap();
        assert!(dao.search_person_by_eid("E-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_target_without_id_is_invalid() {
        let svc = EidMatchLinkSvc::new(Arc::new(dao()));
        let err = svc
            .update_links_for_target(&json!({"resourceType": "Patient"}))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
