use serde::{Deserialize, Serialize};

/// Identity linkage configuration (`[empi]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmpiSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Identifier system holding the enterprise id on Patient, Practitioner and Person.
    #[serde(default = "default_eid_system")]
    pub enterprise_eid_system: String,
}

fn default_enabled() -> bool {
    true
}

fn default_eid_system() -> String {
    "urn:octofhir:empi:enterprise-eid".to_string()
}

impl Default for EmpiSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            enterprise_eid_system: default_eid_system(),
        }
    }
}
