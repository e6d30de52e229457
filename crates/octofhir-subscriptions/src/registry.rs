//! In-memory registry of active subscriptions.
//!
//! Readers load an immutable snapshot with a single atomic pointer read and
//! never wait for writers. Writers copy the map, modify the copy and swap it
//! in; a dispatch pass that already holds a snapshot keeps seeing it.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::{SubscriptionError, SubscriptionResult};
use crate::types::ActiveSubscription;

type SubscriptionMap = HashMap<String, Arc<ActiveSubscription>>;

/// Registry of active subscriptions keyed by id.
pub struct SubscriptionRegistry {
    subscriptions: ArcSwap<SubscriptionMap>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Register or replace a subscription. Returns the replaced entry.
    pub fn register(&self, subscription: ActiveSubscription) -> Option<Arc<ActiveSubscription>> {
        let id = subscription.id.clone();
        let entry = Arc::new(subscription);
        let previous = self.subscriptions.rcu(|current| {
            let mut next = SubscriptionMap::clone(current);
            next.insert(id.clone(), entry.clone());
            next
        });
        tracing::debug!(subscription_id = %id, "Registered subscription");
        previous.get(&id).cloned()
    }

    /// Replace an existing subscription.
    pub fn update(&self, subscription: ActiveSubscription) -> SubscriptionResult<()> {
        let id = subscription.id.clone();
        let entry = Arc::new(subscription);
        let previous = self.subscriptions.rcu(|current| {
            if !current.contains_key(&id) {
                return Arc::clone(current);
            }
            let mut next = SubscriptionMap::clone(current);
            next.insert(id.clone(), entry.clone());
            Arc::new(next)
        });
        if previous.contains_key(&id) {
            tracing::debug!(subscription_id = %id, "Updated subscription");
            Ok(())
        } else {
            Err(SubscriptionError::SubscriptionNotFound(id))
        }
    }

    /// Remove a subscription. Returns the removed entry.
    pub fn unregister(&self, id: &str) -> Option<Arc<ActiveSubscription>> {
        let previous = self.subscriptions.rcu(|current| {
            if !current.contains_key(id) {
                return Arc::clone(current);
            }
            let mut next = SubscriptionMap::clone(current);
            next.remove(id);
            Arc::new(next)
        });
        let removed = previous.get(id).cloned();
        if removed.is_some() {
            tracing::debug!(subscription_id = %id, "Unregistered subscription");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<ActiveSubscription>> {
        self.subscriptions.load().get(id).cloned()
    }

    /// Atomic snapshot of every active subscription.
    pub fn snapshot(&self) -> Arc<SubscriptionMap> {
        self.subscriptions.load_full()
    }

    /// Every active subscription from one snapshot.
    pub fn get_all(&self) -> Vec<Arc<ActiveSubscription>> {
        self.snapshot().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &self.len())
            .finish()
    }
}
