//! Post-write fan-out: one unbounded event queue per consumer path.
//!
//! ```text
//!  PartitionedStorage ─► EventedStorage ─► EventBroadcaster
//!                                             │         │
//!                               subscription-matching   empi
//!                                   router task      router task
//!                                  ┌──┴──┐             ┌──┴──┐
//!                               shard .. shard      shard .. shard
//! ```
//!
//! Each path shards its events by resource key, so the events of one
//! resource are handled one at a time and in publish order while distinct
//! resources proceed in parallel. The paths never wait on each other.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use octofhir_core::{
    ChangeEvent, EventBroadcaster, HookError, HookParams, HookRegistry, Pointcut, VetoHook,
};
use octofhir_empi::{
    EidMatchLinkSvc, EmpiConsumer, EmpiResourceDaoSvc, is_supported_resource_type,
};
use octofhir_partition::{PartitionedStorage, PatientIdPartitionRouter};
use octofhir_storage::{DynStorage, EventedStorage, InMemoryStorage};
use octofhir_subscriptions::{
    ActiveSubscription, DeliveryChannel, InMemoryMatcher, QueueChannel, RestHookChannel,
    SubscriptionMatchingDispatcher, SubscriptionRegistry,
};

use crate::config::{AppConfig, ChannelConfig, SubscriptionEntry};

/// A consumer path's per-event handler.
///
/// Implementations handle their own errors; a panic is caught by the worker
/// and logged.
#[async_trait]
pub trait EventConsumer: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn consume(&self, event: Arc<ChangeEvent>);
}

/// Feeds events to the subscription matching dispatcher.
pub struct MatchingConsumer {
    dispatcher: Arc<SubscriptionMatchingDispatcher>,
}

impl MatchingConsumer {
    pub fn new(dispatcher: Arc<SubscriptionMatchingDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl EventConsumer for MatchingConsumer {
    fn name(&self) -> &'static str {
        "subscription-matching"
    }

    async fn consume(&self, event: Arc<ChangeEvent>) {
        let resource = event.resource_key();
        let report = self.dispatcher.dispatch(event).await;
        debug!(
            resource = %resource,
            matched = report.matched,
            delivered = report.delivered,
            failed = report.failed,
            "Dispatch pass complete"
        );
    }
}

/// Feeds Patient and Practitioner events to the identity-linkage consumer.
///
/// Other types, including the Persons the linker writes itself, never reach
/// the consumer.
pub struct LinkageConsumer {
    consumer: Arc<EmpiConsumer>,
}

impl LinkageConsumer {
    pub fn new(consumer: Arc<EmpiConsumer>) -> Self {
        Self { consumer }
    }
}

#[async_trait]
impl EventConsumer for LinkageConsumer {
    fn name(&self) -> &'static str {
        "empi"
    }

    async fn consume(&self, event: Arc<ChangeEvent>) {
        if !is_supported_resource_type(&event.resource_type) {
            trace!(resource = %event.resource_key(), "Not an EMPI resource type");
            return;
        }
        let resource = event.resource_key();
        match self.consumer.handle_message(event).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                error!(resource = %resource, error = %e, "Discarding EMPI event that can never be linked");
            }
            Err(e) => {
                // This in-process transport has no redelivery.
                debug!(resource = %resource, error = %e, "Dropping EMPI event after failure");
            }
        }
    }
}

/// Vetoes every event while subscription processing is disabled.
pub struct SubscriptionsDisabledVeto;

#[async_trait]
impl VetoHook for SubscriptionsDisabledVeto {
    fn name(&self) -> &str {
        "subscriptions-disabled"
    }

    async fn invoke(&self, _params: &HookParams) -> Result<bool, HookError> {
        Ok(false)
    }
}

fn shard_for(key: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

/// Router task plus shard workers of one consumer path.
pub struct ConsumerPath {
    name: &'static str,
    handles: Vec<JoinHandle<()>>,
}

impl ConsumerPath {
    /// Spawn the path on the current runtime.
    ///
    /// `receiver` is unbounded, so publishers never wait on this path and no
    /// committed event is lost while a shard is busy. Once `shutdown` flips
    /// to `true` the router stops forwarding and each worker exits after the
    /// event it is currently handling; queued events are not started.
    pub fn spawn(
        consumer: Arc<dyn EventConsumer>,
        receiver: mpsc::UnboundedReceiver<Arc<ChangeEvent>>,
        workers: usize,
        buffer_size: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let name = consumer.name();
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers + 1);

        for shard in 0..workers {
            let (tx, rx) = mpsc::channel(buffer_size.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(
                name,
                shard,
                consumer.clone(),
                rx,
                shutdown.clone(),
            )));
        }
        handles.push(tokio::spawn(run_router(name, receiver, senders, shutdown)));

        info!(path = name, workers, "Consumer path started");
        Self { name, handles }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the router and every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(path = self.name, error = %e, "Consumer task failed");
            }
        }
        info!(path = self.name, "Consumer path stopped");
    }
}

/// Resolves once shutdown was requested or its sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn run_router(
    name: &'static str,
    mut receiver: mpsc::UnboundedReceiver<Arc<ChangeEvent>>,
    shards: Vec<mpsc::Sender<Arc<ChangeEvent>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            biased;

            _ = stopped(&mut shutdown) => {
                info!(path = name, "Consumer path shutting down");
                break;
            }
            received = receiver.recv() => match received {
                Some(event) => event,
                None => {
                    debug!(path = name, "Change event channel closed");
                    break;
                }
            },
        };

        let shard = shard_for(&event.resource_key(), shards.len());
        // A full shard holds the router back; the backlog stays in `receiver`.
        tokio::select! {
            biased;

            _ = stopped(&mut shutdown) => break,
            sent = shards[shard].send(event) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

async fn run_worker(
    name: &'static str,
    shard: usize,
    consumer: Arc<dyn EventConsumer>,
    mut queue: mpsc::Receiver<Arc<ChangeEvent>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            biased;

            _ = stopped(&mut shutdown) => break,
            next = queue.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };

        let resource = event.resource_key();
        if let Err(panic) = AssertUnwindSafe(consumer.consume(event))
            .catch_unwind()
            .await
        {
            let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            error!(path = name, shard, resource = %resource, panic = %panic_msg, "Consumer panicked");
        }
    }
}

/// Build the delivery channel a configured subscription sends to.
pub fn build_channel(
    entry: &SubscriptionEntry,
    buffer_size: usize,
) -> anyhow::Result<Option<Arc<dyn DeliveryChannel>>> {
    match &entry.channel {
        ChannelConfig::None => Ok(None),
        ChannelConfig::Log => {
            let (channel, mut receiver) = QueueChannel::new(format!("log:{}", entry.id), buffer_size);
            tokio::spawn(async move {
                while let Some(message) = receiver.recv().await {
                    info!(
                        subscription = %message.subscription,
                        resource = %message.payload_id,
                        operation = %message.operation,
                        "Subscription notification"
                    );
                }
            });
            Ok(Some(Arc::new(channel)))
        }
        ChannelConfig::RestHook { endpoint, headers } => {
            let mut channel = RestHookChannel::new(endpoint.clone())
                .with_context(|| format!("subscription '{}': rest-hook channel", entry.id))?;
            for (key, value) in headers {
                channel = channel.with_header(key.clone(), value.clone());
            }
            Ok(Some(Arc::new(channel)))
        }
    }
}

/// The running pipeline: partitioned storage in front, consumer paths behind.
pub struct Pipeline {
    storage: Arc<PartitionedStorage>,
    broadcaster: Arc<EventBroadcaster>,
    hooks: Arc<HookRegistry>,
    registry: Arc<SubscriptionRegistry>,
    shutdown: watch::Sender<bool>,
    paths: Vec<ConsumerPath>,
}

impl Pipeline {
    /// Wire storage, registries and consumer paths from configuration.
    pub async fn start(config: &AppConfig) -> anyhow::Result<Self> {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let hooks = Arc::new(HookRegistry::new());

        let evented: DynStorage = Arc::new(EventedStorage::new(
            InMemoryStorage::new(),
            broadcaster.clone(),
        ));
        let router = PatientIdPartitionRouter::new(config.partitioning.clone())
            .context("invalid partitioning settings")?;
        let storage = Arc::new(PartitionedStorage::new(evented, router));

        let registry = Arc::new(SubscriptionRegistry::new());
        for entry in &config.subscriptions.entries {
            let mut subscription = ActiveSubscription::new(entry.id.clone(), entry.criteria.clone());
            if let Some(channel) = build_channel(entry, config.pipeline.buffer_size)? {
                subscription = subscription.with_channel(channel);
            }
            registry.register(subscription);
        }
        if !config.subscriptions.enabled {
            hooks
                .register_veto(
                    Pointcut::SubscriptionBeforeProcessed,
                    Arc::new(SubscriptionsDisabledVeto),
                )
                .await?;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut paths = Vec::new();

        let dispatcher = Arc::new(SubscriptionMatchingDispatcher::new(
            registry.clone(),
            Arc::new(InMemoryMatcher::new()),
            hooks.clone(),
        ));
        paths.push(ConsumerPath::spawn(
            Arc::new(MatchingConsumer::new(dispatcher)),
            broadcaster.subscribe(),
            config.pipeline.workers,
            config.pipeline.buffer_size,
            shutdown_rx.clone(),
        ));

        if config.empi.enabled {
            let dao = Arc::new(EmpiResourceDaoSvc::new(storage.clone(), config.empi.clone()));
            let consumer = Arc::new(EmpiConsumer::new(
                Arc::new(EidMatchLinkSvc::new(dao)),
                hooks.clone(),
            ));
            paths.push(ConsumerPath::spawn(
                Arc::new(LinkageConsumer::new(consumer)),
                broadcaster.subscribe(),
                config.pipeline.workers,
                config.pipeline.buffer_size,
                shutdown_rx,
            ));
        } else {
            info!("EMPI disabled");
        }

        info!(
            subscriptions = registry.len(),
            subscriptions_enabled = config.subscriptions.enabled,
            partitioning_enabled = config.partitioning.enabled,
            "Pipeline started"
        );

        Ok(Self {
            storage,
            broadcaster,
            hooks,
            registry,
            shutdown,
            paths,
        })
    }

    pub fn storage(&self) -> &Arc<PartitionedStorage> {
        &self.storage
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Names of the running consumer paths.
    pub fn path_names(&self) -> Vec<&'static str> {
        self.paths.iter().map(ConsumerPath::name).collect()
    }

    /// Stop taking new events, finish what was already published, and wait.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for path in self.paths {
            path.join().await;
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("paths", &self.path_names())
            .field("subscriptions", &self.registry.len())
            .finish_non_exhaustive()
    }
}
