//! Subscription matching for committed changes.
//!
//! ```text
//! ChangeEvent ─► pre-process hooks ─► registry snapshot ─┬─► target/blank/type filters
//!                                                         ├─► SubscriptionMatcher
//!                                                         └─► DeliveryChannel
//!             ◄─ post-process hooks ◄─────────────────────┘
//! ```

pub mod channel;
pub mod criteria;
pub mod dispatcher;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod types;

pub use channel::{DeliveryChannel, QueueChannel, RestHookChannel};
pub use dispatcher::{DispatchReport, SubscriptionMatchingDispatcher};
pub use error::{SubscriptionError, SubscriptionResult};
pub use matcher::{InMemoryMatcher, SubscriptionMatcher};
pub use registry::SubscriptionRegistry;
pub use types::{ActiveSubscription, DeliveryMessage, MatchResult};
