//! Change event types for the post-write pipeline.
//!
//! One `ChangeEvent` is produced per committed mutation and shared read-only
//! (as `Arc<ChangeEvent>`) with every consumer path.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::fhir_reference::FhirReference;
use crate::partition::PartitionId;

// ============================================================================
// Operation Type
// ============================================================================

/// Kind of mutation a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    /// Resource was created
    Create,
    /// Resource was updated
    Update,
    /// Resource was deleted
    Delete,
    /// Redelivery requested by an operator, optionally for one subscription
    ManuallyTriggered,
}

impl OperationType {
    /// Returns the string representation of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "CREATE",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
            OperationType::ManuallyTriggered => "MANUALLY_TRIGGERED",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Payload
// ============================================================================

type ResolveFn = dyn Fn() -> Result<Value> + Send + Sync;

enum PayloadSource {
    Inline,
    Deferred(Box<ResolveFn>),
    Absent,
}

struct PayloadInner {
    resolved: OnceLock<Value>,
    source: PayloadSource,
}

/// The new content of a changed resource.
///
/// Either carried inline, resolved lazily on first access and memoized, or
/// absent (deletions). Cloning shares the memoized value.
#[derive(Clone)]
pub struct Payload {
    inner: Arc<PayloadInner>,
}

impl Payload {
    /// Payload already in hand.
    pub fn inline(resource: Value) -> Self {
        Self {
            inner: Arc::new(PayloadInner {
                resolved: OnceLock::from(resource),
                source: PayloadSource::Inline,
            }),
        }
    }

    /// Payload fetched on first access.
    pub fn deferred<F>(resolver: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PayloadInner {
                resolved: OnceLock::new(),
                source: PayloadSource::Deferred(Box::new(resolver)),
            }),
        }
    }

    /// No payload (e.g. a deletion).
    pub fn absent() -> Self {
        Self {
            inner: Arc::new(PayloadInner {
                resolved: OnceLock::new(),
                source: PayloadSource::Absent,
            }),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self.inner.source, PayloadSource::Absent)
    }

    /// Resolve the payload, `Ok(None)` when absent.
    pub fn resolve(&self) -> Result<Option<&Value>> {
        if let Some(value) = self.inner.resolved.get() {
            return Ok(Some(value));
        }
        match &self.inner.source {
            PayloadSource::Absent | PayloadSource::Inline => Ok(None),
            PayloadSource::Deferred(resolver) => {
                let value = resolver()?;
                // A concurrent resolver may have won; either value is the same resource.
                let _ = self.inner.resolved.set(value);
                Ok(self.inner.resolved.get())
            }
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match (&self.inner.source, self.inner.resolved.get().is_some()) {
            (PayloadSource::Absent, _) => "absent",
            (_, true) => "resolved",
            (_, false) => "deferred",
        };
        f.debug_struct("Payload").field("state", &state).finish()
    }
}

// ============================================================================
// Change Event
// ============================================================================

/// Immutable record of one committed resource mutation.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Kind of mutation
    pub operation: OperationType,
    /// FHIR resource type (e.g., "Patient", "Observation")
    pub resource_type: String,
    /// Logical id
    pub resource_id: String,
    /// Version id if known
    pub version_id: Option<i64>,
    /// Restricts delivery to one subscription (manual redelivery)
    pub subscription_id: Option<String>,
    /// Partition the resource was written to
    pub partition: Option<PartitionId>,
    /// New resource content
    pub payload: Payload,
}

impl ChangeEvent {
    pub fn new(
        operation: OperationType,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            operation,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            version_id: None,
            subscription_id: None,
            partition: None,
            payload,
        }
    }

    /// Create a CREATE event with an inline payload.
    pub fn created(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        resource: Value,
    ) -> Self {
        Self::new(
            OperationType::Create,
            resource_type,
            resource_id,
            Payload::inline(resource),
        )
    }

    /// Create an UPDATE event with an inline payload.
    pub fn updated(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        resource: Value,
    ) -> Self {
        Self::new(
            OperationType::Update,
            resource_type,
            resource_id,
            Payload::inline(resource),
        )
    }

    /// Create a DELETE event; deletions carry no payload.
    pub fn deleted(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self::new(
            OperationType::Delete,
            resource_type,
            resource_id,
            Payload::absent(),
        )
    }

    /// Create a MANUALLY_TRIGGERED event scoped to one subscription.
    pub fn manually_triggered(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        subscription_id: impl Into<String>,
        payload: Payload,
    ) -> Self {
        let mut event = Self::new(
            OperationType::ManuallyTriggered,
            resource_type,
            resource_id,
            payload,
        );
        event.subscription_id = Some(subscription_id.into());
        event
    }

    pub fn with_version(mut self, version_id: i64) -> Self {
        self.version_id = Some(version_id);
        self
    }

    pub fn with_partition(mut self, partition: PartitionId) -> Self {
        self.partition = Some(partition);
        self
    }

    /// The resource identifier, versioned when the version is known.
    pub fn id_element(&self) -> FhirReference {
        match self.version_id {
            Some(v) => FhirReference::with_version(
                self.resource_type.as_str(),
                self.resource_id.as_str(),
                v.to_string(),
            ),
            None => FhirReference::new(self.resource_type.as_str(), self.resource_id.as_str()),
        }
    }

    /// `Type/id` used as the ordering key of this resource.
    pub fn resource_key(&self) -> String {
        format!("{}/{}", self.resource_type, self.resource_id)
    }

    /// Resolve the new payload, failing if the event has none.
    pub fn new_payload(&self) -> Result<&Value> {
        self.payload.resolve()?.ok_or_else(|| {
            CoreError::payload_unavailable(
                self.resource_type.as_str(),
                self.resource_id.as_str(),
                format!("{} event carries no payload", self.operation),
            )
        })
    }

    /// The target subscription id, ignoring blank values.
    pub fn target_subscription(&self) -> Option<&str> {
        self.subscription_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_change_event_created() {
        let event = ChangeEvent::created("Patient", "123", serde_json::json!({"id": "123"}));
        assert_eq!(event.operation, OperationType::Create);
        assert_eq!(event.resource_type, "Patient");
        assert_eq!(event.resource_id, "123");
        assert_eq!(event.new_payload().unwrap()["id"], "123");
    }

    #[test]
    fn test_deleted_event_has_no_payload() {
        let event = ChangeEvent::deleted("Patient", "123");
        assert!(event.payload.is_absent());
        let err = event.new_payload().unwrap_err();
        assert!(matches!(err, CoreError::PayloadUnavailable { .. }));
    }

    #[test]
    fn test_deferred_payload_resolves_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let payload = Payload::deferred(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"resourceType": "Patient"}))
        });
        let event = ChangeEvent::new(OperationType::Update, "Patient", "1", payload);
        let clone = event.clone();

        assert_eq!(event.new_payload().unwrap()["resourceType"], "Patient");
        assert_eq!(clone.new_payload().unwrap()["resourceType"], "Patient");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_payload_error_propagates() {
        let payload = Payload::deferred(|| Err(CoreError::invalid_resource("gone")));
        let event = ChangeEvent::new(OperationType::Create, "Patient", "1", payload);
        assert!(event.new_payload().is_err());
    }

    #[test]
    fn test_id_element_versioned() {
        let event = ChangeEvent::created("Observation", "B", serde_json::json!({})).with_version(4);
        assert_eq!(event.id_element().to_versioned(), "Observation/B/_history/4");
        assert_eq!(event.resource_key(), "Observation/B");
    }

    #[test]
    fn test_target_subscription_ignores_blank() {
        let payload = Payload::inline(serde_json::json!({}));
        let event = ChangeEvent::manually_triggered("Patient", "1", "  ", payload.clone());
        assert_eq!(event.target_subscription(), None);

        let event = ChangeEvent::manually_triggered("Patient", "1", "sub-1", payload);
        assert_eq!(event.target_subscription(), Some("sub-1"));
        assert_eq!(event.operation, OperationType::ManuallyTriggered);
    }

    #[test]
    fn test_operation_type_serialization() {
        let json = serde_json::to_string(&OperationType::ManuallyTriggered).unwrap();
        assert_eq!(json, "\"MANUALLY_TRIGGERED\"");
        assert_eq!(OperationType::Delete.to_string(), "DELETE");
    }
}
