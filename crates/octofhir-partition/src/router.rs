//! Patient-id partition router.

use serde_json::Value;
use tracing::debug;

use octofhir_core::{PartitionId, RequestPartition, parse_reference};
use octofhir_storage::SearchParams;

use crate::compartment::CompartmentDefinition;
use crate::error::{PartitionError, Result};
use crate::settings::PartitionSettings;

/// Stable 32-bit hash of a compartment owner id.
///
/// `h = 31 * h + unit` over UTF-16 code units with wrapping arithmetic, so
/// `compartment_hash("A") == 65`. Independent of process state.
pub fn compartment_hash(id: &str) -> i32 {
    id.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Routes resources to partitions by the id of the compartment owner they belong to.
#[derive(Debug, Clone)]
pub struct PatientIdPartitionRouter {
    settings: PartitionSettings,
    compartment: CompartmentDefinition,
}

impl PatientIdPartitionRouter {
    pub fn new(settings: PartitionSettings) -> Result<Self> {
        let compartment = CompartmentDefinition::for_code(&settings.compartment).ok_or_else(|| {
            PartitionError::Configuration(format!(
                "unknown compartment '{}'",
                settings.compartment
            ))
        })?;
        Ok(Self {
            settings,
            compartment,
        })
    }

    pub fn settings(&self) -> &PartitionSettings {
        &self.settings
    }

    pub fn compartment(&self) -> &CompartmentDefinition {
        &self.compartment
    }

    fn default_partition(&self) -> PartitionId {
        self.settings.default_partition()
    }

    /// Decide the partition of a resource about to be written.
    ///
    /// `is_client_assigned_id` is true when the caller chose the id (update
    /// with id) and false when the server will generate it (create).
    pub fn assign_partition(&self, resource: &Value, is_client_assigned_id: bool) -> Result<PartitionId> {
        if !self.settings.enabled {
            return Ok(self.default_partition());
        }

        let resource_type = resource
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if self.compartment.is_owner(resource_type) {
            let id = resource
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| is_client_assigned_id && !id.is_empty())
                .ok_or_else(|| {
                    PartitionError::no_compartment_values(resource_type, &self.compartment.code)
                })?;
            let partition = PartitionId::Numbered(compartment_hash(id));
            debug!(resource_type = %resource_type, id = %id, partition = %partition, "Assigned owner partition");
            return Ok(partition);
        }

        if self.compartment.includes_resource_type(resource_type) {
            if let Some(owner) = self
                .compartment
                .owner_references(resource_type, resource)
                .into_iter()
                .next()
            {
                let partition = PartitionId::Numbered(compartment_hash(&owner.id));
                debug!(
                    resource_type = %resource_type,
                    owner = %owner,
                    partition = %partition,
                    "Assigned partition from compartment reference"
                );
                return Ok(partition);
            }
            debug!(resource_type = %resource_type, "No compartment reference, using default partition");
        }

        Ok(self.default_partition())
    }

    /// Partitions a read-by-id may see.
    pub fn identify_for_read(&self, resource_type: &str, id: &str) -> RequestPartition {
        if !self.settings.enabled {
            return RequestPartition::All;
        }
        if self.compartment.is_owner(resource_type) {
            RequestPartition::One(PartitionId::Numbered(compartment_hash(id)))
        } else if self.compartment.includes_resource_type(resource_type) {
            RequestPartition::All
        } else {
            RequestPartition::One(self.default_partition())
        }
    }

    /// Partitions a type-level search may see.
    ///
    /// Searches on compartment types must name the owner, either by `_id`
    /// (owner type) or by a reference parameter (member types).
    pub fn identify_for_search(
        &self,
        resource_type: &str,
        params: &SearchParams,
    ) -> Result<RequestPartition> {
        if !self.settings.enabled {
            return Ok(RequestPartition::All);
        }
        if !self.compartment.includes_resource_type(resource_type) {
            return Ok(RequestPartition::One(self.default_partition()));
        }

        let owner_ids: Vec<String> = if self.compartment.is_owner(resource_type) {
            params.values("_id").to_vec()
        } else {
            self.compartment
                .search_params(resource_type)
                .iter()
                .flat_map(|param| params.values(param))
                .filter_map(|value| self.owner_id_from_value(value))
                .collect()
        };

        let mut partitions = owner_ids
            .iter()
            .map(|id| PartitionId::Numbered(compartment_hash(id)));
        let first = partitions.next().ok_or_else(PartitionError::unsupported_search)?;
        if partitions.all(|p| p == first) {
            debug!(resource_type = %resource_type, partition = %first, "Routed search to partition");
            Ok(RequestPartition::One(first))
        } else {
            debug!(resource_type = %resource_type, "Search spans several partitions");
            Ok(RequestPartition::All)
        }
    }

    /// Owner id from a search value: `Patient/A` or a bare `A`.
    fn owner_id_from_value(&self, value: &str) -> Option<String> {
        if !value.contains('/') {
            return Some(value.to_string()).filter(|v| !v.is_empty());
        }
        parse_reference(value)
            .ok()
            .filter(|r| r.is_type(&self.compartment.code))
            .map(|r| r.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn router() -> PatientIdPartitionRouter {
        PatientIdPartitionRouter::new(PartitionSettings::default()).unwrap()
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(compartment_hash("A"), 65);
        assert_eq!(compartment_hash(""), 0);
        assert_eq!(compartment_hash("ab"), 97 * 31 + 98);
        // Wraps like a 32-bit integer.
        assert_eq!(compartment_hash("polygenelubricants"), i32::MIN);
    }

    #[test]
    fn test_patient_with_client_assigned_id() {
        let partition = router()
            .assign_partition(&json!({"resourceType": "Patient", "id": "A"}), true)
            .unwrap();
        assert_eq!(partition, PartitionId::Numbered(65));
    }

    #[test]
    fn test_patient_without_client_assigned_id_fails() {
        let err = router()
            .assign_partition(&json!({"resourceType": "Patient", "active": true}), false)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Resource of type Patient has no values placing it in the Patient compartment"
        );

        // An id on the body does not count when the server assigns ids.
        assert!(
            router()
                .assign_partition(&json!({"resourceType": "Patient", "id": "A"}), false)
                .is_err()
        );
    }

    #[test]
    fn test_dependent_inherits_owner_partition() {
        let obs = json!({"resourceType": "Observation", "subject": {"reference": "Patient/A"}});
        assert_eq!(
            router().assign_partition(&obs, false).unwrap(),
            PartitionId::Numbered(65)
        );
    }

    #[test]
    fn test_dependent_without_reference_uses_default() {
        let obs = json!({"resourceType": "Observation", "status": "final"});
        assert_eq!(
            router().assign_partition(&obs, false).unwrap(),
            PartitionId::Numbered(-1)
        );
    }

    #[test]
    fn test_unrelated_type_uses_default() {
        let org = json!({"resourceType": "Organization", "name": "Acme"});
        assert_eq!(
            router().assign_partition(&org, false).unwrap(),
            PartitionId::Numbered(-1)
        );
    }

    #[test]
    fn test_disabled_routes_everything_to_default() {
        let router = PatientIdPartitionRouter::new(PartitionSettings {
            enabled: false,
            ..PartitionSettings::default()
        })
        .unwrap();
        let patient = json!({"resourceType": "Patient"});
        assert_eq!(
            router.assign_partition(&patient, false).unwrap(),
            PartitionId::Numbered(-1)
        );
        assert_eq!(router.identify_for_read("Patient", "A"), RequestPartition::All);
    }

    #[test]
    fn test_unknown_compartment_rejected() {
        let err = PatientIdPartitionRouter::new(PartitionSettings {
            compartment: "Device".into(),
            ..PartitionSettings::default()
        })
        .unwrap_err();
        assert!(matches!(err, PartitionError::Configuration(_)));
    }

    #[test]
    fn test_read_routing() {
        let router = router();
        assert_eq!(
            router.identify_for_read("Patient", "A"),
            RequestPartition::One(PartitionId::Numbered(65))
        );
        assert_eq!(router.identify_for_read("Observation", "B"), RequestPartition::All);
        assert_eq!(
            router.identify_for_read("Organization", "C"),
            RequestPartition::One(PartitionId::Numbered(-1))
        );
    }

    #[test]
    fn test_search_routing() {
        let router = router();

        let by_subject = SearchParams::new().with_param("subject", "Patient/A");
        assert_eq!(
            router.identify_for_search("Observation", &by_subject).unwrap(),
            RequestPartition::One(PartitionId::Numbered(65))
        );

        let by_alias = SearchParams::new().with_param("patient", "A");
        assert_eq!(
            router.identify_for_search("Observation", &by_alias).unwrap(),
            RequestPartition::One(PartitionId::Numbered(65))
        );

        let by_id = SearchParams::new().with_param("_id", "A");
        assert_eq!(
            router.identify_for_search("Patient", &by_id).unwrap(),
            RequestPartition::One(PartitionId::Numbered(65))
        );

        let org = SearchParams::new().with_param("name", "Acme");
        assert_eq!(
            router.identify_for_search("Organization", &org).unwrap(),
            RequestPartition::One(PartitionId::Numbered(-1))
        );
    }

    #[test]
    fn test_search_without_compartment_param_rejected() {
        let params = SearchParams::new().with_param("code", "1234-5");
        let err = router().identify_for_search("Observation", &params).unwrap_err();
        assert_eq!(
            err.to_string(),
            "This server is not able to handle this request of type SEARCH_TYPE"
        );

        let performer_only = SearchParams::new().with_param("performer", "Practitioner/P");
        assert!(router().identify_for_search("Observation", &performer_only).is_err());
    }

    #[test]
    fn test_search_across_owners_spans_all() {
        let params = SearchParams::new()
            .with_param("subject", "Patient/A")
            .with_param("subject", "Patient/B");
        assert_eq!(
            router().identify_for_search("Observation", &params).unwrap(),
            RequestPartition::All
        );
    }
}
