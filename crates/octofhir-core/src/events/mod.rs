//! Change event infrastructure for the post-write pipeline.
//!
//! # Architecture
//!
//! ```text
//!   write path (commit)
//!          │  one ChangeEvent per mutation
//!          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Event Broadcaster                        │
//! │           (one unbounded tokio mpsc queue per path)          │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                   │
//!          ▼                                   ▼
//!  ┌────────────────────┐            ┌────────────────────┐
//!  │ Matching dispatcher│            │ Identity linkage   │
//!  └────────────────────┘            └────────────────────┘
//!          │  hooks at named pointcuts         │
//!          └──────────────► HookRegistry ◄─────┘
//! ```
//!
//! # Module Structure
//!
//! - [`types`]: `ChangeEvent`, `OperationType`, lazily resolved `Payload`
//! - [`broadcaster`]: event publishing
//! - [`hooks`]: pointcuts, hook params and hook traits
//! - [`registry`]: ordered hook registration and invocation

pub mod broadcaster;
pub mod hooks;
pub mod registry;
pub mod types;

pub use broadcaster::EventBroadcaster;
pub use hooks::{HookError, HookParams, ObserverHook, Pointcut, VetoHook};
pub use registry::HookRegistry;
pub use types::{ChangeEvent, OperationType, Payload};
