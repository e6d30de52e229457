//! Hook points and hook traits for the change pipeline.
//!
//! Consumers call hooks at named [`Pointcut`]s with a typed [`HookParams`].
//! Two kinds of hooks exist:
//! - **Veto hooks** return `bool`; `false` stops the caller from continuing.
//! - **Observer hooks** return nothing; they see the event and cannot
//!   influence processing.
//!
//! Hooks registered at the same pointcut run in registration order.

use std::sync::Arc;

use async_trait::async_trait;

use super::types::ChangeEvent;

/// Error type for hook operations.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Hook execution failed with a message.
    #[error("Hook execution failed: {0}")]
    Execution(String),

    /// Hook was registered at a pointcut that does not accept it.
    #[error("Pointcut {pointcut} does not accept {kind} hooks")]
    WrongPointcut { pointcut: Pointcut, kind: &'static str },

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HookError {
    /// Create an execution error from a string.
    pub fn execution(msg: impl Into<String>) -> Self {
        HookError::Execution(msg.into())
    }
}

// ============================================================================
// Pointcuts
// ============================================================================

/// Named places in the pipeline where hooks are invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pointcut {
    /// Before the matching dispatcher looks at an event. Vetoable.
    SubscriptionBeforeProcessed,
    /// After the matching dispatcher evaluated every subscription.
    SubscriptionAfterProcessed,
    /// After the identity-linkage consumer checked a persisted resource,
    /// whether or not linking succeeded.
    EmpiAfterPersistedResourceChecked,
}

impl Pointcut {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pointcut::SubscriptionBeforeProcessed => "SUBSCRIPTION_BEFORE_PROCESSED",
            Pointcut::SubscriptionAfterProcessed => "SUBSCRIPTION_AFTER_PROCESSED",
            Pointcut::EmpiAfterPersistedResourceChecked => {
                "EMPI_AFTER_PERSISTED_RESOURCE_CHECKED"
            }
        }
    }

    /// Whether hooks at this pointcut may stop processing.
    pub fn is_vetoable(&self) -> bool {
        matches!(self, Pointcut::SubscriptionBeforeProcessed)
    }
}

impl std::fmt::Display for Pointcut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Typed parameters passed to every hook invocation.
#[derive(Debug, Clone)]
pub struct HookParams {
    /// The pointcut being invoked
    pub pointcut: Pointcut,
    /// The change event being processed
    pub event: Arc<ChangeEvent>,
}

impl HookParams {
    pub fn new(pointcut: Pointcut, event: Arc<ChangeEvent>) -> Self {
        Self { pointcut, event }
    }
}

// ============================================================================
// Hook Traits
// ============================================================================

/// A hook that can stop the caller from continuing.
///
/// Returning `Ok(false)` vetoes. Errors are logged and do not veto.
#[async_trait]
pub trait VetoHook: Send + Sync {
    /// Unique name for this hook (for logging and unregistration).
    fn name(&self) -> &str;

    /// Decide whether processing should continue.
    async fn invoke(&self, params: &HookParams) -> Result<bool, HookError>;
}

/// A hook that observes an event without influencing processing.
///
/// # Example
///
/// ```ignore
/// struct AuditHook;
///
/// #[async_trait]
/// impl ObserverHook for AuditHook {
///     fn name(&self) -> &str { "audit" }
///
///     async fn invoke(&self, params: &HookParams) -> Result<(), HookError> {
///         tracing::info!(resource = %params.event.resource_key(), "checked");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ObserverHook: Send + Sync {
    /// Unique name for this hook (for logging and unregistration).
    fn name(&self) -> &str;

    /// Observe the event.
    async fn invoke(&self, params: &HookParams) -> Result<(), HookError>;
}
