//! Storage types for the FHIR storage abstraction layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use time::OffsetDateTime;

use octofhir_core::PartitionId;

/// A FHIR resource as stored in the storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResource {
    /// The resource ID.
    pub id: String,
    /// The version ID of this specific version.
    pub version_id: String,
    /// The FHIR resource type (e.g., "Patient", "Observation").
    pub resource_type: String,
    /// The partition this version was written to.
    pub partition: PartitionId,
    /// The full resource content as JSON.
    pub resource: Value,
    /// When this version was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    /// When the resource was originally created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl StoredResource {
    /// Creates a new `StoredResource` at version 1.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        resource_type: impl Into<String>,
        partition: PartitionId,
        resource: Value,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            version_id: "1".to_string(),
            resource_type: resource_type.into(),
            partition,
            resource,
            last_updated: now,
            created_at: now,
        }
    }

    /// Creates the next version of this resource with updated content.
    #[must_use]
    pub fn new_version(&self, partition: PartitionId, resource: Value) -> Self {
        Self {
            id: self.id.clone(),
            version_id: (self.version_number() + 1).to_string(),
            resource_type: self.resource_type.clone(),
            partition,
            resource,
            last_updated: OffsetDateTime::now_utc(),
            created_at: self.created_at,
        }
    }

    /// Numeric form of `version_id`; 0 when it is not numeric.
    #[must_use]
    pub fn version_number(&self) -> i64 {
        self.version_id.parse().unwrap_or(0)
    }

    /// Whether this is the first version of the resource.
    #[must_use]
    pub fn is_first_version(&self) -> bool {
        self.version_number() == 1
    }
}

/// Result of a search operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matching resources.
    pub entries: Vec<StoredResource>,
    /// Total count of matching resources.
    pub total: Option<u32>,
}

impl SearchResult {
    /// Creates a new empty `SearchResult`.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a new `SearchResult` with entries.
    #[must_use]
    pub fn with_entries(entries: Vec<StoredResource>) -> Self {
        let total = u32::try_from(entries.len()).ok();
        Self { entries, total }
    }

    /// Returns the number of entries in this result.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the result and returns its first entry.
    #[must_use]
    pub fn into_first(self) -> Option<StoredResource> {
        self.entries.into_iter().next()
    }
}

/// Parameters for a search operation.
///
/// Every parameter must match (AND); multiple values of one parameter are
/// alternatives (OR).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    /// Search parameters as key-value pairs.
    pub parameters: HashMap<String, Vec<String>>,
    /// Maximum number of results to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl SearchParams {
    /// Creates new empty `SearchParams`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a search parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Sets the count parameter.
    #[must_use]
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Values given for a parameter, empty if absent.
    #[must_use]
    pub fn values(&self, key: &str) -> &[String] {
        self.parameters.get(key).map_or(&[], Vec::as_slice)
    }

    /// Parse a `key=value&key=value` query string.
    ///
    /// Comma-separated values become alternatives of the same parameter.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key == "_count" {
                params.count = value.parse().ok();
                continue;
            }
            for v in value.split(',').filter(|v| !v.is_empty()) {
                params = params.with_param(key, v);
            }
        }
        params
    }
}
