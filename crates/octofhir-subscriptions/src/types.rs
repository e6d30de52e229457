//! Subscription types shared by the registry, matcher and channels.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use octofhir_core::{ChangeEvent, FhirReference, OperationType, PartitionId};

use crate::channel::DeliveryChannel;

/// Cached view of one active subscription.
#[derive(Clone)]
pub struct ActiveSubscription {
    /// Subscription logical id
    pub id: String,
    /// Criteria string, e.g. `Observation?code=1234-5`
    pub criteria: String,
    /// Where matches are sent; absent channels are logged, not fatal
    pub channel: Option<Arc<dyn DeliveryChannel>>,
}

impl ActiveSubscription {
    pub fn new(id: impl Into<String>, criteria: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            criteria: criteria.into(),
            channel: None,
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn DeliveryChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// `Subscription/{id}`
    pub fn reference(&self) -> FhirReference {
        FhirReference::new("Subscription", self.id.as_str())
    }
}

impl std::fmt::Debug for ActiveSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSubscription")
            .field("id", &self.id)
            .field("criteria", &self.criteria)
            .field("channel", &self.channel.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

/// Outcome of evaluating one criteria against one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    /// Names the matcher that decided, for diagnostics.
    pub matcher_name: String,
}

impl MatchResult {
    pub fn matched(matcher_name: impl Into<String>) -> Self {
        Self {
            matched: true,
            matcher_name: matcher_name.into(),
        }
    }

    pub fn no_match(matcher_name: impl Into<String>) -> Self {
        Self {
            matched: false,
            matcher_name: matcher_name.into(),
        }
    }
}

/// Notification handed to a delivery channel, one per match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMessage {
    /// `Subscription/{id}`
    pub subscription: String,
    pub operation: OperationType,
    /// Identifier of the changed resource, versioned when known
    pub payload_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionId>,
    /// The resolved resource
    pub payload: Value,
}

impl DeliveryMessage {
    pub fn new(subscription: &ActiveSubscription, event: &ChangeEvent, payload: Value) -> Self {
        Self {
            subscription: subscription.reference().to_string(),
            operation: event.operation,
            payload_id: event.id_element().to_string(),
            partition: event.partition,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delivery_message_wire_shape() {
        let sub = ActiveSubscription::new("s1", "Patient?active=true");
        let event = ChangeEvent::updated("Patient", "A", json!({"resourceType": "Patient"}))
            .with_version(3)
            .with_partition(PartitionId::Numbered(65));
        let message = DeliveryMessage::new(&sub, &event, json!({"resourceType": "Patient"}));

        let wire = serde_json::to_value(&message).unwrap();
        assert_eq!(wire["subscription"], "Subscription/s1");
        assert_eq!(wire["operation"], "UPDATE");
        assert_eq!(wire["payloadId"], "Patient/A/_history/3");
        assert_eq!(message.subscription, "Subscription/s1");
    }

    #[test]
    fn test_subscription_reference() {
        let sub = ActiveSubscription::new("abc", "Observation?");
        assert_eq!(sub.reference().to_string(), "Subscription/abc");
        assert!(format!("{sub:?}").contains("abc"));
    }
}
