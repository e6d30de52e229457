//! Compartment-based partition routing.
//!
//! Every write is assigned a [`PartitionId`](octofhir_core::PartitionId)
//! before it reaches storage:
//!
//! - a Patient written with a caller-assigned id lands in `hash(id)`;
//! - a Patient without one is rejected, nothing is persisted;
//! - resources in the Patient compartment inherit the partition of the
//!   Patient they reference;
//! - everything else lands in the configured default partition.
//!
//! [`PartitionedStorage`] applies the router in front of any
//! [`FhirStorage`](octofhir_storage::FhirStorage).

pub mod compartment;
pub mod error;
pub mod router;
pub mod settings;
pub mod storage;

pub use compartment::CompartmentDefinition;
pub use error::{PartitionError, Result};
pub use router::{PatientIdPartitionRouter, compartment_hash};
pub use settings::PartitionSettings;
pub use storage::PartitionedStorage;
