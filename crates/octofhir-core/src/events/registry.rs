//! Hook registry: ordered hook handles per pointcut.
//!
//! Hooks are invoked inline (awaited by the caller) so that callers can rely
//! on "the hook has run" once `call_*` returns. Each invocation is still
//! isolated: a timeout, an error or a panic inside one hook is logged and the
//! remaining hooks run.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::hooks::{HookError, HookParams, ObserverHook, Pointcut, VetoHook};

/// Default timeout for hook execution.
const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry of veto and observer hooks keyed by pointcut.
pub struct HookRegistry {
    veto_hooks: RwLock<HashMap<Pointcut, Vec<Arc<dyn VetoHook>>>>,
    observer_hooks: RwLock<HashMap<Pointcut, Vec<Arc<dyn ObserverHook>>>>,
    timeout: Duration,
}

impl HookRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_HOOK_TIMEOUT)
    }

    /// Create a new registry with custom timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            veto_hooks: RwLock::new(HashMap::new()),
            observer_hooks: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Register a veto hook. Only vetoable pointcuts accept them.
    pub async fn register_veto(
        &self,
        pointcut: Pointcut,
        hook: Arc<dyn VetoHook>,
    ) -> Result<(), HookError> {
        if !pointcut.is_vetoable() {
            return Err(HookError::WrongPointcut {
                pointcut,
                kind: "veto",
            });
        }
        let name = hook.name().to_string();
        self.veto_hooks
            .write()
            .await
            .entry(pointcut)
            .or_default()
            .push(hook);
        debug!(hook = %name, pointcut = %pointcut, "Registered veto hook");
        Ok(())
    }

    /// Register an observer hook.
    pub async fn register_observer(&self, pointcut: Pointcut, hook: Arc<dyn ObserverHook>) {
        let name = hook.name().to_string();
        self.observer_hooks
            .write()
            .await
            .entry(pointcut)
            .or_default()
            .push(hook);
        debug!(hook = %name, pointcut = %pointcut, "Registered observer hook");
    }

    /// Remove every hook with the given name from a pointcut.
    ///
    /// Returns the number of hooks removed.
    pub async fn unregister(&self, pointcut: Pointcut, name: &str) -> usize {
        let mut removed = 0;
        if let Some(hooks) = self.veto_hooks.write().await.get_mut(&pointcut) {
            let before = hooks.len();
            hooks.retain(|h| h.name() != name);
            removed += before - hooks.len();
        }
        if let Some(hooks) = self.observer_hooks.write().await.get_mut(&pointcut) {
            let before = hooks.len();
            hooks.retain(|h| h.name() != name);
            removed += before - hooks.len();
        }
        removed
    }

    /// Number of hooks (both kinds) registered at a pointcut.
    pub async fn hook_count(&self, pointcut: Pointcut) -> usize {
        let veto = self
            .veto_hooks
            .read()
            .await
            .get(&pointcut)
            .map_or(0, Vec::len);
        let observers = self
            .observer_hooks
            .read()
            .await
            .get(&pointcut)
            .map_or(0, Vec::len);
        veto + observers
    }

    /// Run the veto hooks of a pointcut in order.
    ///
    /// Returns `false` as soon as one hook vetoes. A failing, panicking or
    /// timed-out hook does not veto.
    pub async fn call_veto(&self, params: &HookParams) -> bool {
        let hooks = self
            .veto_hooks
            .read()
            .await
            .get(&params.pointcut)
            .cloned()
            .unwrap_or_default();

        for hook in hooks {
            let hook_name = hook.name().to_string();
            let outcome = self.guarded(&hook_name, params, hook.invoke(params)).await;
            if outcome == Some(false) {
                debug!(hook = %hook_name, pointcut = %params.pointcut, "Hook vetoed processing");
                return false;
            }
        }
        true
    }

    /// Run the observer hooks of a pointcut in order.
    pub async fn call_observers(&self, params: &HookParams) {
        let hooks = self
            .observer_hooks
            .read()
            .await
            .get(&params.pointcut)
            .cloned()
            .unwrap_or_default();

        for hook in hooks {
            let hook_name = hook.name().to_string();
            self.guarded(&hook_name, params, hook.invoke(params)).await;
        }
    }

    /// Await one hook with timeout and panic protection.
    async fn guarded<T, F>(&self, hook_name: &str, params: &HookParams, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = Result<T, HookError>>,
    {
        let result =
            tokio::time::timeout(self.timeout, AssertUnwindSafe(fut).catch_unwind()).await;

        match result {
            Ok(Ok(Ok(value))) => Some(value),
            Ok(Ok(Err(e))) => {
                warn!(
                    hook = %hook_name,
                    pointcut = %params.pointcut,
                    error = %e,
                    "Hook execution failed"
                );
                None
            }
            Ok(Err(panic)) => {
                let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                error!(
                    hook = %hook_name,
                    pointcut = %params.pointcut,
                    panic = %panic_msg,
                    "Hook panicked!"
                );
                None
            }
            Err(_) => {
                error!(
                    hook = %hook_name,
                    pointcut = %params.pointcut,
                    timeout_secs = self.timeout.as_secs(),
                    "Hook timed out"
                );
                None
            }
        }
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::ChangeEvent;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingObserver {
        name: &'static str,
        count: AtomicU32,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl CountingObserver {
        fn new(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                name,
                count: AtomicU32::new(0),
                log,
            }
        }

        fn count(&self) -> u32 {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ObserverHook for CountingObserver {
        fn name(&self) -> &str {
            self.name
        }

        async fn invoke(&self, _params: &HookParams) -> Result<(), HookError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    struct FixedVeto(&'static str, bool);

    #[async_trait]
    impl VetoHook for FixedVeto {
        fn name(&self) -> &str {
            self.0
        }

        async fn invoke(&self, _params: &HookParams) -> Result<bool, HookError> {
            Ok(self.1)
        }
    }

    struct FailingVeto;

    #[async_trait]
    impl VetoHook for FailingVeto {
        fn name(&self) -> &str {
            "failing"
        }

        async fn invoke(&self, _params: &HookParams) -> Result<bool, HookError> {
            Err(HookError::execution("boom"))
        }
    }

    struct PanicObserver;

    #[async_trait]
    impl ObserverHook for PanicObserver {
        fn name(&self) -> &str {
            "panic_hook"
        }

        async fn invoke(&self, _params: &HookParams) -> Result<(), HookError> {
            panic!("This hook panics!");
        }
    }

    fn params(pointcut: Pointcut) -> HookParams {
        HookParams::new(
            pointcut,
            Arc::new(ChangeEvent::created("Patient", "1", serde_json::json!({}))),
        )
    }

    #[tokio::test]
    async fn test_observers_run_in_registration_order() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::new(CountingObserver::new("first", log.clone()));
        let second = Arc::new(CountingObserver::new("second", log.clone()));
        let pointcut = Pointcut::SubscriptionAfterProcessed;

        registry.register_observer(pointcut, first.clone()).await;
        registry.register_observer(pointcut, second.clone()).await;
        assert_eq!(registry.hook_count(pointcut).await, 2);

        registry.call_observers(&params(pointcut)).await;

        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_observers_only_for_their_pointcut() {
        let registry = HookRegistry::new();
        let hook = Arc::new(CountingObserver::new("c", Arc::new(Mutex::new(Vec::new()))));
        registry
            .register_observer(Pointcut::EmpiAfterPersistedResourceChecked, hook.clone())
            .await;

        registry
            .call_observers(&params(Pointcut::SubscriptionAfterProcessed))
            .await;
        assert_eq!(hook.count(), 0);
    }

    #[tokio::test]
    async fn test_veto_stops_processing() {
        let registry = HookRegistry::new();
        let pointcut = Pointcut::SubscriptionBeforeProcessed;
        assert!(registry.call_veto(&params(pointcut)).await);

        registry
            .register_veto(pointcut, Arc::new(FixedVeto("allow", true)))
            .await
            .unwrap();
        assert!(registry.call_veto(&params(pointcut)).await);

        registry
            .register_veto(pointcut, Arc::new(FixedVeto("deny", false)))
            .await
            .unwrap();
        assert!(!registry.call_veto(&params(pointcut)).await);

        assert_eq!(registry.unregister(pointcut, "deny").await, 1);
        assert!(registry.call_veto(&params(pointcut)).await);
    }

    #[tokio::test]
    async fn test_failing_veto_does_not_veto() {
        let registry = HookRegistry::new();
        let pointcut = Pointcut::SubscriptionBeforeProcessed;
        registry
            .register_veto(pointcut, Arc::new(FailingVeto))
            .await
            .unwrap();
        assert!(registry.call_veto(&params(pointcut)).await);
    }

    #[tokio::test]
    async fn test_veto_rejected_on_observational_pointcut() {
        let registry = HookRegistry::new();
        let err = registry
            .register_veto(
                Pointcut::EmpiAfterPersistedResourceChecked,
                Arc::new(FixedVeto("deny", false)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::WrongPointcut { .. }));
    }

    #[tokio::test]
    async fn test_panic_isolation() {
        let registry = HookRegistry::new();
        let counter = Arc::new(CountingObserver::new("counter", Arc::new(Mutex::new(Vec::new()))));
        let pointcut = Pointcut::SubscriptionAfterProcessed;

        registry.register_observer(pointcut, Arc::new(PanicObserver)).await;
        registry.register_observer(pointcut, counter.clone()).await;

        registry.call_observers(&params(pointcut)).await;

        assert_eq!(counter.count(), 1);
    }
}
