pub mod error;
pub mod events;
pub mod fhir_reference;
pub mod partition;
pub mod resource_params;

pub use error::{CoreError, Result};
pub use events::{
    ChangeEvent, EventBroadcaster, HookError, HookParams, HookRegistry, ObserverHook,
    OperationType, Payload, Pointcut, VetoHook,
};
pub use fhir_reference::{FhirReference, UnresolvableReference, parse_reference};
pub use partition::{PartitionId, RequestPartition};
pub use resource_params::param_values;
