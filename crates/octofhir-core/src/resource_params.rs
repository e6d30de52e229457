//! Lightweight parameter value extraction from resource JSON.
//!
//! Compartment routing, the in-memory store and the in-memory criteria
//! matcher all need the same thing: "which values does this resource carry
//! for parameter `x`?". Parameters map onto top-level elements of the same
//! name; `_id` maps onto the logical id.
//!
//! Values are flattened to strings:
//! - primitives become their textual form
//! - `Reference` yields its `reference` string
//! - `Identifier` yields `value` and `system|value`
//! - `CodeableConcept` yields each `coding.code` (and `system|code`)
//! - `Coding` yields `code` (and `system|code`)

use serde_json::Value;

/// Collect the string values a resource carries for `param`.
pub fn param_values(resource: &Value, param: &str) -> Vec<String> {
    let element = if param == "_id" {
        resource.get("id")
    } else {
        resource.get(param)
    };

    let mut out = Vec::new();
    if let Some(element) = element {
        collect(element, &mut out);
    }
    out
}

fn collect(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("reference") {
                out.push(reference.clone());
                return;
            }
            if let Some(Value::Array(codings)) = map.get("coding") {
                codings.iter().for_each(|coding| collect(coding, out));
                return;
            }
            let system = map.get("system").and_then(Value::as_str);
            for key in ["value", "code"] {
                if let Some(Value::String(v)) = map.get(key) {
                    out.push(v.clone());
                    if let Some(system) = system {
                        out.push(format!("{system}|{v}"));
                    }
                }
            }
        }
        Value::Null => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primitive_and_id_values() {
        let patient = json!({"resourceType": "Patient", "id": "A", "active": true});
        assert_eq!(param_values(&patient, "_id"), vec!["A"]);
        assert_eq!(param_values(&patient, "active"), vec!["true"]);
        assert!(param_values(&patient, "gender").is_empty());
    }

    #[test]
    fn test_identifier_values_include_system() {
        let patient = json!({
            "resourceType": "Patient",
            "identifier": [{"system": "urn:eid", "value": "E-1"}]
        });
        let values = param_values(&patient, "identifier");
        assert!(values.contains(&"E-1".to_string()));
        assert!(values.contains(&"urn:eid|E-1".to_string()));
    }

    #[test]
    fn test_codeable_concept_values() {
        let obs = json!({
            "resourceType": "Observation",
            "code": {"coding": [{"system": "http://loinc.org", "code": "1234-5"}]}
        });
        let values = param_values(&obs, "code");
        assert!(values.contains(&"1234-5".to_string()));
        assert!(values.contains(&"http://loinc.org|1234-5".to_string()));
    }
}
