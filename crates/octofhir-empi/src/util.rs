use serde_json::Value;

/// Resource types the identity linkage accepts.
pub const SUPPORTED_RESOURCE_TYPES: &[&str] = &["Patient", "Practitioner"];

pub fn is_supported_resource_type(resource_type: &str) -> bool {
    SUPPORTED_RESOURCE_TYPES.contains(&resource_type)
}

/// First identifier value with the given system.
pub fn enterprise_eid(resource: &Value, system: &str) -> Option<String> {
    resource
        .get("identifier")?
        .as_array()?
        .iter()
        .filter(|identifier| identifier.get("system").and_then(Value::as_str) == Some(system))
        .find_map(|identifier| identifier.get("value").and_then(Value::as_str))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_supported_types() {
        assert!(is_supported_resource_type("Patient"));
        assert!(is_supported_resource_type("Practitioner"));
        assert!(!is_supported_resource_type("Observation"));
        assert!(!is_supported_resource_type("Person"));
    }

    #[test]
    fn test_enterprise_eid() {
        let patient = json!({
            "resourceType": "Patient",
            "identifier": [
                {"system": "urn:mrn", "value": "M-1"},
                {"system": "urn:eid", "value": "E-1"}
            ]
        });
        assert_eq!(enterprise_eid(&patient, "urn:eid").as_deref(), Some("E-1"));
        assert_eq!(enterprise_eid(&patient, "urn:other"), None);
        assert_eq!(enterprise_eid(&json!({}), "urn:eid"), None);
    }
}
