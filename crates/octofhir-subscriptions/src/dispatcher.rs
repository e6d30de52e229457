//! Subscription matching dispatcher.
//!
//! For every change event: ask the pre-process hooks, snapshot the active
//! subscriptions, evaluate each one concurrently, deliver matches, then
//! fire the post-process hooks.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::join_all;
use tracing::{debug, error, info, trace, warn};

use octofhir_core::{ChangeEvent, HookParams, HookRegistry, OperationType, Pointcut};

use crate::criteria::{is_blank, passes_prefilter};
use crate::error::SubscriptionResult;
use crate::matcher::SubscriptionMatcher;
use crate::registry::SubscriptionRegistry;
use crate::types::{ActiveSubscription, DeliveryMessage};

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// A pre-process hook vetoed the event.
    pub vetoed: bool,
    /// The operation kind is never dispatched (e.g. DELETE).
    pub skipped_operation: bool,
    /// Subscriptions in the snapshot.
    pub considered: usize,
    /// Skipped for a different target subscription or blank criteria.
    pub skipped: usize,
    /// Rejected by the resource type pre-filter.
    pub prefiltered: usize,
    pub matched: usize,
    pub delivered: usize,
    /// Matches with no channel to send to.
    pub no_channel: usize,
    /// Matcher, payload, send errors and panics.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Skipped,
    Prefiltered,
    NotMatched,
    Delivered,
    NoChannel,
    Failed,
}

/// Dispatches change events to matching subscriptions.
pub struct SubscriptionMatchingDispatcher {
    registry: Arc<SubscriptionRegistry>,
    matcher: Arc<dyn SubscriptionMatcher>,
    hooks: Arc<HookRegistry>,
}

impl SubscriptionMatchingDispatcher {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        matcher: Arc<dyn SubscriptionMatcher>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            registry,
            matcher,
            hooks,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Run one dispatch pass for `event`.
    ///
    /// Never fails: per-subscription errors are logged and counted. The
    /// post-process hook runs once every subscription was evaluated, unless
    /// the event was vetoed or its operation is not dispatched.
    pub async fn dispatch(&self, event: Arc<ChangeEvent>) -> DispatchReport {
        let mut report = DispatchReport::default();

        let before = HookParams::new(Pointcut::SubscriptionBeforeProcessed, event.clone());
        if !self.hooks.call_veto(&before).await {
            debug!(resource = %event.resource_key(), "Subscription processing vetoed");
            report.vetoed = true;
            return report;
        }

        if !matches!(
            event.operation,
            OperationType::Create | OperationType::Update | OperationType::ManuallyTriggered
        ) {
            trace!(
                resource = %event.resource_key(),
                operation = %event.operation,
                "Operation is not dispatched to subscriptions"
            );
            report.skipped_operation = true;
            return report;
        }

        let snapshot = self.registry.snapshot();
        report.considered = snapshot.len();
        trace!(
            resource = %event.resource_key(),
            subscriptions = snapshot.len(),
            "Testing subscriptions for match"
        );

        let passes = snapshot.values().map(|subscription| {
            let event = event.as_ref();
            async move {
                match AssertUnwindSafe(self.process_subscription(subscription, event))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let panic_msg = panic
                            .downcast_ref::<&str>()
                            .map(|s| (*s).to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "Unknown panic".to_string());
                        error!(
                            subscription_id = %subscription.id,
                            panic = %panic_msg,
                            "Subscription evaluation panicked"
                        );
                        Outcome::Failed
                    }
                }
            }
        });

        for outcome in join_all(passes).await {
            match outcome {
                Outcome::Skipped => report.skipped += 1,
                Outcome::Prefiltered => report.prefiltered += 1,
                Outcome::NotMatched => {}
                Outcome::Delivered => {
                    report.matched += 1;
                    report.delivered += 1;
                }
                Outcome::NoChannel => {
                    report.matched += 1;
                    report.no_channel += 1;
                }
                Outcome::Failed => report.failed += 1,
            }
        }

        let after = HookParams::new(Pointcut::SubscriptionAfterProcessed, event.clone());
        self.hooks.call_observers(&after).await;

        debug!(
            resource = %event.resource_key(),
            considered = report.considered,
            matched = report.matched,
            delivered = report.delivered,
            failed = report.failed,
            "Subscription dispatch finished"
        );
        report
    }

    async fn process_subscription(
        &self,
        subscription: &ActiveSubscription,
        event: &ChangeEvent,
    ) -> Outcome {
        if let Some(target) = event.target_subscription() {
            if target != subscription.id {
                trace!(
                    subscription_id = %subscription.id,
                    target = %target,
                    "Ignoring subscription, event targets another"
                );
                return Outcome::Skipped;
            }
        }

        if is_blank(&subscription.criteria) {
            trace!(subscription_id = %subscription.id, "Subscription has no criteria, skipping");
            return Outcome::Skipped;
        }

        if !passes_prefilter(&subscription.criteria, &event.resource_type) {
            trace!(
                subscription_id = %subscription.id,
                criteria = %subscription.criteria,
                resource_type = %event.resource_type,
                "Criteria targets another resource type"
            );
            return Outcome::Prefiltered;
        }

        match self.try_deliver(subscription, event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    subscription_id = %subscription.id,
                    resource = %event.resource_key(),
                    error = %e,
                    "Subscription processing failed"
                );
                Outcome::Failed
            }
        }
    }

    async fn try_deliver(
        &self,
        subscription: &ActiveSubscription,
        event: &ChangeEvent,
    ) -> SubscriptionResult<Outcome> {
        let result = self.matcher.matches(&subscription.criteria, event).await?;
        if !result.matched {
            trace!(
                subscription_id = %subscription.id,
                matcher = %result.matcher_name,
                "Subscription did not match"
            );
            return Ok(Outcome::NotMatched);
        }

        info!(
            subscription_id = %subscription.id,
            resource = %event.id_element(),
            matcher = %result.matcher_name,
            "Subscription matched"
        );

        let payload = event.new_payload()?.clone();
        let message = DeliveryMessage::new(subscription, event, payload);

        let Some(channel) = &subscription.channel else {
            warn!(
                subscription_id = %subscription.id,
                "Matched subscription has no delivery channel, skipping delivery"
            );
            return Ok(Outcome::NoChannel);
        };

        channel.send(&message).await?;
        debug!(
            subscription_id = %subscription.id,
            channel = %channel.name(),
            payload_id = %message.payload_id,
            "Delivery message sent"
        );
        Ok(Outcome::Delivered)
    }
}

impl std::fmt::Debug for SubscriptionMatchingDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionMatchingDispatcher")
            .field("registry", &self.registry)
            .field("matcher", &self.matcher.name())
            .finish()
    }
}
