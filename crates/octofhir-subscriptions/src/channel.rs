//! Delivery channels for matched notifications.
//!
//! - [`QueueChannel`]: in-process queue, the consumer owns the receiver
//! - [`RestHookChannel`]: HTTP POST of the JSON message

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, header};
use tokio::sync::mpsc;

use crate::error::{SubscriptionError, SubscriptionResult};
use crate::types::DeliveryMessage;

/// Trait for notification delivery channels.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Channel name for logging.
    fn name(&self) -> &str;

    /// Send one message. May block; may fail.
    async fn send(&self, message: &DeliveryMessage) -> SubscriptionResult<()>;
}

/// Channel backed by a bounded tokio mpsc queue.
#[derive(Debug, Clone)]
pub struct QueueChannel {
    name: String,
    sender: mpsc::Sender<DeliveryMessage>,
}

impl QueueChannel {
    /// Create a channel and the receiver its consumer reads from.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<DeliveryMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                sender,
            },
            receiver,
        )
    }
}

#[async_trait]
impl DeliveryChannel for QueueChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &DeliveryMessage) -> SubscriptionResult<()> {
        self.sender
            .send(message.clone())
            .await
            .map_err(|_| SubscriptionError::ChannelClosed(self.name.clone()))
    }
}

/// REST-hook delivery channel.
pub struct RestHookChannel {
    /// HTTP client for making requests
    client: Client,
    endpoint: String,
    headers: HashMap<String, String>,
}

impl RestHookChannel {
    /// Create a new REST-hook channel posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> SubscriptionResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Create with a custom client.
    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a header sent with every notification.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DeliveryChannel for RestHookChannel {
    fn name(&self) -> &str {
        "rest-hook"
    }

    async fn send(&self, message: &DeliveryMessage) -> SubscriptionResult<()> {
        let start = Instant::now();

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json");
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let body = serde_json::to_vec(message)?;
        let response = request.body(body).send().await;
        let elapsed = start.elapsed().as_millis() as u64;

        match response {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(
                    subscription = %message.subscription,
                    endpoint = %self.endpoint,
                    status = resp.status().as_u16(),
                    elapsed_ms = elapsed,
                    "REST-hook delivery succeeded"
                );
                Ok(())
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let error_body = resp.text().await.unwrap_or_default();
                tracing::warn!(
                    subscription = %message.subscription,
                    endpoint = %self.endpoint,
                    status,
                    error = %error_body,
                    elapsed_ms = elapsed,
                    "REST-hook delivery failed with HTTP error"
                );
                Err(SubscriptionError::DeliveryError(format!(
                    "HTTP {status}: {error_body}"
                )))
            }
            Err(e) => {
                tracing::warn!(
                    subscription = %message.subscription,
                    endpoint = %self.endpoint,
                    error = %e,
                    elapsed_ms = elapsed,
                    "REST-hook delivery failed with network error"
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_core::OperationType;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> DeliveryMessage {
        DeliveryMessage {
            subscription: "Subscription/s1".into(),
            operation: OperationType::Create,
            payload_id: "Patient/A/_history/1".into(),
            partition: None,
            payload: json!({"resourceType": "Patient", "id": "A"}),
        }
    }

    #[tokio::test]
    async fn test_queue_channel_delivers() {
        let (channel, mut rx) = QueueChannel::new("queue", 4);
        channel.send(&message()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), message());
    }

    #[tokio::test]
    async fn test_queue_channel_closed() {
        let (channel, rx) = QueueChannel::new("queue", 4);
        drop(rx);
        let err = channel.send(&message()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::ChannelClosed(_)));
    }

    #[tokio::test]
    async fn test_rest_hook_posts_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(header_matcher("x-api-key", "secret"))
            .and(body_partial_json(json!({
                "subscription": "Subscription/s1",
                "operation": "CREATE",
                "payloadId": "Patient/A/_history/1"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = RestHookChannel::new(format!("{}/notify", server.uri()))
            .unwrap()
            .with_header("x-api-key", "secret");
        assert_eq!(channel.name(), "rest-hook");
        channel.send(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rest_hook_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let channel = RestHookChannel::new(server.uri()).unwrap();
        let err = channel.send(&message()).await.unwrap_err();
        assert_eq!(err.to_string(), "Delivery error: HTTP 503: busy");
    }
}
