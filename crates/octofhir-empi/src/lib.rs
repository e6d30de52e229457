//! Enterprise master patient index (EMPI) linkage.
//!
//! Created Patients and Practitioners are linked to a `Person` sharing
//! their enterprise identifier (EID). [`EmpiConsumer`] drives the linkage
//! for each change event and always fires the
//! `EMPI_AFTER_PERSISTED_RESOURCE_CHECKED` hook once validation passed.

pub mod consumer;
pub mod error;
pub mod link_svc;
pub mod resource_dao;
pub mod settings;
pub mod util;

pub use consumer::EmpiConsumer;
pub use error::{EmpiError, Result};
pub use link_svc::{EidMatchLinkSvc, EmpiMatchLinkSvc};
pub use resource_dao::EmpiResourceDaoSvc;
pub use settings::EmpiSettings;
pub use util::is_supported_resource_type;
