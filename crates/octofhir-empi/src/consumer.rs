//! Identity-linkage consumer for change events.

use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{error, info, trace};

use octofhir_core::{ChangeEvent, HookParams, HookRegistry, OperationType, Pointcut};

use crate::error::{EmpiError, Result};
use crate::link_svc::EmpiMatchLinkSvc;
use crate::util::is_supported_resource_type;

/// Consumes change events for Patients and Practitioners.
pub struct EmpiConsumer {
    link_svc: Arc<dyn EmpiMatchLinkSvc>,
    hooks: Arc<HookRegistry>,
}

impl EmpiConsumer {
    pub fn new(link_svc: Arc<dyn EmpiMatchLinkSvc>, hooks: Arc<HookRegistry>) -> Self {
        Self { link_svc, hooks }
    }

    /// Entry point for the worker: logs the event and any failure.
    ///
    /// Errors are returned unchanged after logging; retry policy belongs to
    /// the transport.
    pub async fn handle_message(&self, event: Arc<ChangeEvent>) -> Result<()> {
        info!(
            resource = %event.id_element(),
            operation = %event.operation,
            "Handling resource modified message"
        );
        self.consume(event).await.inspect_err(|e| {
            error!(error = %e, "Failed to handle EMPI matching resource");
        })
    }

    /// Link the event's resource, then fire `EMPI_AFTER_PERSISTED_RESOURCE_CHECKED`.
    ///
    /// An unsupported resource type fails before anything runs and fires no
    /// hook. Past that point the hook fires exactly once with the original
    /// event, whether linking succeeded, failed or panicked; the failure or
    /// panic is propagated afterwards.
    pub async fn consume(&self, event: Arc<ChangeEvent>) -> Result<()> {
        if !is_supported_resource_type(&event.resource_type) {
            return Err(EmpiError::UnsupportedResourceType(event.resource_type.clone()));
        }

        let outcome = AssertUnwindSafe(self.match_and_update_links(&event))
            .catch_unwind()
            .await;

        let params = HookParams::new(Pointcut::EmpiAfterPersistedResourceChecked, event);
        self.hooks.call_observers(&params).await;

        match outcome {
            Ok(result) => result,
            Err(panic) => resume_unwind(panic),
        }
    }

    async fn match_and_update_links(&self, event: &ChangeEvent) -> Result<()> {
        match event.operation {
            OperationType::Create => {
                let target = event.new_payload()?;
                self.link_svc.update_links_for_target(target).await
            }
            OperationType::Update => {
                // TODO: re-evaluate links when the EID of an existing target changes.
                trace!(resource = %event.resource_key(), "Updates are not linked yet");
                Ok(())
            }
            other => {
                trace!(operation = %other, "Not processing modified message");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for EmpiConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmpiConsumer").finish_non_exhaustive()
    }
}
