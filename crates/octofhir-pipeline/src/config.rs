use std::collections::{HashMap, HashSet};

use octofhir_empi::EmpiSettings;
use octofhir_partition::{CompartmentDefinition, PartitionSettings};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub partitioning: PartitionSettings,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub subscriptions: SubscriptionsConfig,
    /// Identity linkage
    #[serde(default)]
    pub empi: EmpiSettings,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.pipeline.workers == 0 {
            return Err("pipeline.workers must be > 0".into());
        }
        if self.pipeline.buffer_size == 0 {
            return Err("pipeline.buffer_size must be > 0".into());
        }
        if CompartmentDefinition::for_code(&self.partitioning.compartment).is_none() {
            return Err(format!(
                "partitioning.compartment '{}' is not a supported compartment",
                self.partitioning.compartment
            ));
        }
        if self.empi.enabled && self.empi.enterprise_eid_system.trim().is_empty() {
            return Err("empi.enterprise_eid_system must not be empty".into());
        }

        let mut seen = HashSet::new();
        for entry in &self.subscriptions.entries {
            if entry.id.trim().is_empty() {
                return Err("subscriptions.entries[].id must not be empty".into());
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(format!("duplicate subscription id '{}'", entry.id));
            }
            if let ChannelConfig::RestHook { endpoint, .. } = &entry.channel {
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    return Err(format!(
                        "subscription '{}': rest-hook endpoint must be an http(s) URL",
                        entry.id
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Consumer worker settings, applied to each consumer path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Worker shards per path; events of one resource always hit the same shard.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Capacity of each shard queue; a full shard holds back its router, never drops.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}
fn default_workers() -> usize {
    4
}
fn default_buffer_size() -> usize {
    1024
}
impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            buffer_size: default_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Subscriptions registered at startup.
    #[serde(default)]
    pub entries: Vec<SubscriptionEntry>,
}
fn default_true() -> bool {
    true
}
impl Default for SubscriptionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionEntry {
    pub id: String,
    pub criteria: String,
    #[serde(default)]
    pub channel: ChannelConfig,
}

/// Delivery channel of a configured subscription.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChannelConfig {
    /// Matches are logged as undeliverable.
    #[default]
    None,
    /// Matches are queued in-process and written to the log.
    Log,
    /// Matches are POSTed as JSON.
    RestHook {
        endpoint: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File, FileFormat};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "octofhir-pipeline.toml";

    /// Load configuration from an optional TOML file plus `OCTOFHIR__*` overrides.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf).format(FileFormat::Toml));
        } else if path.is_some() {
            return Err(format!("config file not found: {}", pathbuf.display()));
        }
        // Environment variable overrides, e.g., OCTOFHIR__PIPELINE__WORKERS=8
        builder = builder.add_source(
            Environment::with_prefix("OCTOFHIR")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pipeline.workers, 4);
        assert!(cfg.subscriptions.enabled);
        assert_eq!(cfg.partitioning.compartment, "Patient");
    }

    #[test]
    fn test_validation_errors() {
        let mut cfg = AppConfig::default();
        cfg.pipeline.workers = 0;
        assert_eq!(cfg.validate().unwrap_err(), "pipeline.workers must be > 0");

        let mut cfg = AppConfig::default();
        cfg.subscriptions.entries = vec![
            SubscriptionEntry {
                id: "s1".into(),
                criteria: "Patient?".into(),
                channel: ChannelConfig::None,
            },
            SubscriptionEntry {
                id: "s1".into(),
                criteria: "Observation?".into(),
                channel: ChannelConfig::Log,
            },
        ];
        assert!(cfg.validate().unwrap_err().contains("duplicate subscription id"));

        let mut cfg = AppConfig::default();
        cfg.subscriptions.entries = vec![SubscriptionEntry {
            id: "s1".into(),
            criteria: "Patient?".into(),
            channel: ChannelConfig::RestHook {
                endpoint: "ftp://nope".into(),
                headers: HashMap::new(),
            },
        }];
        assert!(cfg.validate().unwrap_err().contains("http(s) URL"));

        let mut cfg = AppConfig::default();
        cfg.partitioning.compartment = "Device".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_channel_config_toml_shape() {
        let entry: SubscriptionEntry = toml::from_str(
            r#"
id = "s1"
criteria = "Observation?code=1234-5"
channel = { type = "rest-hook", endpoint = "http://localhost:9000/hook", headers = { "x-api-key" = "k" } }
"#,
        )
        .unwrap();
        match entry.channel {
            ChannelConfig::RestHook { endpoint, headers } => {
                assert_eq!(endpoint, "http://localhost:9000/hook");
                assert_eq!(headers.get("x-api-key").map(String::as_str), Some("k"));
            }
            other => panic!("unexpected channel {other:?}"),
        }
    }
}
