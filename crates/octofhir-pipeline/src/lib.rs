//! Post-write change pipeline.
//!
//! Writes go through patient-compartment partition routing; every committed
//! change is fanned out to subscription matching and to identity linkage.

pub mod config;
pub mod ingest;
pub mod observability;
pub mod pipeline;

pub use config::{AppConfig, ChannelConfig, SubscriptionEntry};
pub use ingest::{LoadReport, load_ndjson};
pub use pipeline::{
    ConsumerPath, EventConsumer, LinkageConsumer, MatchingConsumer, Pipeline,
    SubscriptionsDisabledVeto, build_channel,
};
