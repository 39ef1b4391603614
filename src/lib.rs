//! # Location Relay
//!
//! Bridges a platform location service to a native consumer: recurring
//! location subscriptions are kept registered across the service's
//! connect / suspend / fail / reconnect cycle, and fixes and statuses are
//! forwarded to one consumer.
//!
//! ## Core Concepts
//!
//! - **Subscriptions**: recurring update requests, each with its own policy
//! - **Service**: the asynchronous platform collaborator, driven from a
//!   dedicated service-context thread
//! - **Consumer**: receives statuses and fixes, tagged by subscription
//! - **Tracker**: regular updates plus one-shot requests with timeouts
//!
//! ## Example
//!
//! ```ignore
//! use location_relay::{ManagerConfig, Priority, SubscriptionManager, UpdatePolicy};
//!
//! let (manager, events) = SubscriptionManager::with_channel(service, ManagerConfig::default())?;
//!
//! let id = manager.start_updates(UpdatePolicy::new(
//!     Priority::BalancedPowerAccuracy,
//!     Duration::from_secs(10),
//! ));
//!
//! // ... later
//! manager.stop_updates(id);
//! manager.shutdown();
//! ```

pub mod availability;
pub mod config;
pub mod consumer;
mod dispatch;
pub mod error;
pub mod service;
pub mod subscriptions;
pub mod tracker;
pub mod types;

// Re-exports
pub use availability::{is_service_available, AvailabilityCode, ServiceProbe};
pub use config::{ManagerConfig, TrackerConfig};
pub use consumer::{ChannelConsumer, LocationConsumer};
pub use error::{LocationError, Result, ServiceError};
pub use service::{LocationService, Registration, ServiceLink};
pub use subscriptions::{
    EventReceiver, Priority, ProviderEvent, SubscriptionId, SubscriptionManager, UpdatePolicy,
};
pub use tracker::{PositionTracker, TrackerEvent};
pub use types::*;
