//! # octofhir-storage
//!
//! Storage abstraction layer for the OctoFHIR change pipeline.
//!
//! ## Overview
//!
//! The main trait is [`FhirStorage`], a partition-aware contract for:
//! - create (server-assigned id) and update (caller-assigned id, upsert)
//! - read and delete by id
//! - search by simple parameters
//!
//! Writes name the [`PartitionId`] they land in and reads name the
//! [`RequestPartition`] they may see. [`EventedStorage`] wraps any backend
//! and publishes one [`ChangeEvent`](octofhir_core::ChangeEvent) per
//! successful write.
//!
//! ## Example
//!
//! ```ignore
//! use octofhir_storage::{FhirStorage, RequestPartition, SearchParams, StorageError};
//!
//! async fn observations_for(
//!     storage: &dyn FhirStorage,
//!     patient: &str,
//! ) -> Result<Vec<StoredResource>, StorageError> {
//!     let params = SearchParams::new().with_param("subject", format!("Patient/{patient}"));
//!     let result = storage.search(&RequestPartition::All, "Observation", &params).await?;
//!     Ok(result.entries)
//! }
//! ```

mod error;
pub mod evented;
pub mod memory;
mod traits;
mod types;

pub use error::StorageError;
pub use evented::EventedStorage;
pub use memory::InMemoryStorage;
pub use octofhir_core::{PartitionId, RequestPartition};
pub use traits::FhirStorage;
pub use types::{SearchParams, SearchResult, StoredResource};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared storage trait object.
pub type DynStorage = std::sync::Arc<dyn FhirStorage>;
