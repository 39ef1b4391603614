//! Location subscriptions bound to a reconnecting service.
//!
//! A [`SubscriptionManager`] keeps a table of subscriptions, each with its
//! own [`UpdatePolicy`], and reconciles it with the service connection:
//! - connected: subscriptions are registered as they are created
//! - connecting or suspended: registration waits for the next connect
//! - disconnected or failed: a connect is triggered
//! - on every (re)connect, all recorded subscriptions are registered again
//!
//! # Example
//!
//! ```ignore
//! let (manager, events) = SubscriptionManager::with_channel(service, ManagerConfig::default())?;
//!
//! let id = manager.start_updates(
//!     UpdatePolicy::new(Priority::HighAccuracy, Duration::from_secs(5)),
//! );
//!
//! loop {
//!     match events.recv() {
//!         Ok(ProviderEvent::Location { location, .. }) => println!("Fix: {:?}", location),
//!         Ok(ProviderEvent::Status { status }) => println!("Status: {}", status),
//!         Err(_) => break,
//!     }
//! }
//!
//! manager.stop_updates(id);
//! ```

pub(crate) mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{EventReceiver, Priority, ProviderEvent, SubscriptionId, UpdatePolicy};
