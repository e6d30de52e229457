use octofhir_core::PartitionId;
use serde::{Deserialize, Serialize};

/// Partition routing configuration (`[partitioning]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSettings {
    /// When false every resource lands in the default partition.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Numeric default partition; unset means the unnamed default partition.
    #[serde(default = "default_partition_id")]
    pub default_partition_id: Option<i32>,
    /// Compartment that owns partitions.
    #[serde(default = "default_compartment")]
    pub compartment: String,
}

fn default_enabled() -> bool {
    true
}

fn default_partition_id() -> Option<i32> {
    Some(-1)
}

fn default_compartment() -> String {
    "Patient".to_string()
}

impl Default for PartitionSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_partition_id: default_partition_id(),
            compartment: default_compartment(),
        }
    }
}

impl PartitionSettings {
    /// Partition for resources outside the compartment.
    pub fn default_partition(&self) -> PartitionId {
        match self.default_partition_id {
            Some(id) => PartitionId::Numbered(id),
            None => PartitionId::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PartitionSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.default_partition(), PartitionId::Numbered(-1));
        assert_eq!(settings.compartment, "Patient");
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let settings: PartitionSettings =
            serde_json::from_value(serde_json::json!({"enabled": false})).unwrap();
        assert!(!settings.enabled);
        assert_eq!(settings.default_partition_id, Some(-1));

        let unnamed = PartitionSettings {
            default_partition_id: None,
            ..PartitionSettings::default()
        };
        assert_eq!(unnamed.default_partition(), PartitionId::Default);
    }
}
