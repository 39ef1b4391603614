//! Subscription types for recurring location updates.

use crate::error::{LocationError, Result};
use crate::types::{Location, Status, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    /// Tag of the connect-time initial emission; never allocated to a subscription.
    pub const BASELINE: SubscriptionId = SubscriptionId(0);
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accuracy class requested from the service.
///
/// Discriminants are the platform's numeric priority codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// The most accurate locations available.
    HighAccuracy = 100,
    /// "Block" level accuracy.
    #[default]
    BalancedPowerAccuracy = 102,
    /// "City" level accuracy.
    LowPower = 104,
    /// Only fixes other clients already paid for.
    NoPower = 105,
}

impl Priority {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Priority {
    type Error = LocationError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            100 => Ok(Priority::HighAccuracy),
            102 => Ok(Priority::BalancedPowerAccuracy),
            104 => Ok(Priority::LowPower),
            105 => Ok(Priority::NoPower),
            other => Err(LocationError::InvalidPriority(other)),
        }
    }
}

/// Delivery parameters for one subscription.
///
/// Count and expiration limits are interpreted by the service; the manager
/// only forwards them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePolicy {
    pub priority: Priority,

    /// Desired interval between updates.
    pub interval: Duration,

    /// Fastest rate the subscriber can handle.
    pub fastest_interval: Duration,

    /// Maximum batching delay (None = deliver immediately).
    pub max_wait: Option<Duration>,

    /// Stop after this many updates (None = unlimited).
    pub num_updates: Option<u32>,

    /// Expire this long after registration.
    pub expiration_duration: Option<Duration>,

    /// Expire at this absolute time.
    pub expiration_time: Option<Timestamp>,
}

impl UpdatePolicy {
    /// Policy with `fastest_interval` equal to `interval` and no limits.
    pub fn new(priority: Priority, interval: Duration) -> Self {
        Self {
            priority,
            interval,
            fastest_interval: interval,
            max_wait: None,
            num_updates: None,
            expiration_duration: None,
            expiration_time: None,
        }
    }

    /// Build a policy from the raw millisecond values native callers pass.
    ///
    /// Interval and fastest interval must be non-negative. Optional fields
    /// that are zero or negative are not applied.
    pub fn from_raw(
        priority: i32,
        interval_ms: i64,
        fastest_interval_ms: i64,
        max_wait_ms: i64,
        num_updates: i32,
        expiration_duration_ms: i64,
        expiration_time_ms: i64,
    ) -> Result<Self> {
        let priority = Priority::try_from(priority)?;
        if interval_ms < 0 {
            return Err(LocationError::InvalidPolicy(format!(
                "negative interval: {interval_ms}ms"
            )));
        }
        if fastest_interval_ms < 0 {
            return Err(LocationError::InvalidPolicy(format!(
                "negative fastest interval: {fastest_interval_ms}ms"
            )));
        }

        Ok(Self {
            priority,
            interval: Duration::from_millis(interval_ms as u64),
            fastest_interval: Duration::from_millis(fastest_interval_ms as u64),
            max_wait: positive_millis(max_wait_ms),
            num_updates: u32::try_from(num_updates).ok().filter(|n| *n > 0),
            expiration_duration: positive_millis(expiration_duration_ms),
            expiration_time: (expiration_time_ms > 0).then_some(Timestamp(expiration_time_ms)),
        })
    }

    pub fn with_fastest_interval(mut self, fastest: Duration) -> Self {
        self.fastest_interval = fastest;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = (!max_wait.is_zero()).then_some(max_wait);
        self
    }

    pub fn with_num_updates(mut self, count: u32) -> Self {
        self.num_updates = (count > 0).then_some(count);
        self
    }

    pub fn expire_after(mut self, duration: Duration) -> Self {
        self.expiration_duration = (!duration.is_zero()).then_some(duration);
        self
    }

    pub fn expire_at(mut self, at: Timestamp) -> Self {
        self.expiration_time = (at.0 > 0).then_some(at);
        self
    }

    /// Whether this policy asks for exactly one fix.
    pub fn is_single_shot(&self) -> bool {
        self.num_updates == Some(1)
    }
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self::new(Priority::default(), Duration::from_secs(1))
    }
}

fn positive_millis(ms: i64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms as u64))
}

/// Events delivered to a [`ChannelConsumer`](crate::ChannelConsumer).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// Connection or request status changed.
    Status { status: Status },

    /// A location fix.
    Location {
        location: Location,
        /// True for the connect-time emission of the last known location.
        initial: bool,
        /// Originating subscription, or `BASELINE` for the initial emission.
        subscription: SubscriptionId,
    },
}

/// Receiving end of a [`ChannelConsumer`](crate::ChannelConsumer).
#[derive(Clone, Debug)]
pub struct EventReceiver {
    pub receiver: crossbeam_channel::Receiver<ProviderEvent>,
}

impl EventReceiver {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> std::result::Result<ProviderEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<ProviderEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<ProviderEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<ProviderEvent> {
        self.receiver.try_iter().collect()
    }
}
