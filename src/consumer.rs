//! Consumer side of the relay: where statuses and fixes are delivered.

use crate::subscriptions::{EventReceiver, ProviderEvent, SubscriptionId};
use crate::types::{Location, Status};
use crossbeam_channel::{bounded, Sender, TrySendError};
use tracing::warn;

/// Receives statuses and location fixes from a
/// [`SubscriptionManager`](crate::SubscriptionManager).
///
/// Callbacks arrive one at a time and in the order the manager decided them,
/// on whichever thread is delivering at that moment, and never while the
/// manager's lock is held. Calling back into the manager from here is fine;
/// notices it produces are delivered after the current callback returns.
pub trait LocationConsumer: Send + Sync {
    fn on_status(&self, status: Status);

    /// `initial` is true (and `subscription` is `BASELINE`) only for the
    /// connect-time emission of the last known location.
    fn on_location(&self, location: &Location, initial: bool, subscription: SubscriptionId);
}

/// Consumer that forwards everything into a bounded channel.
///
/// When the buffer is full the event is dropped with a warning rather than
/// blocking the service's delivery thread.
#[derive(Debug)]
pub struct ChannelConsumer {
    sender: Sender<ProviderEvent>,
}

impl ChannelConsumer {
    /// Create a consumer and the receiver paired with it.
    pub fn new(buffer_size: usize) -> (Self, EventReceiver) {
        let (sender, receiver) = bounded(buffer_size.max(1));
        (Self { sender }, EventReceiver { receiver })
    }

    fn push(&self, event: ProviderEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(?event, "Consumer buffer full, dropping event");
            }
            // Receiver gone; nobody is listening any more.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl LocationConsumer for ChannelConsumer {
    fn on_status(&self, status: Status) {
        self.push(ProviderEvent::Status { status });
    }

    fn on_location(&self, location: &Location, initial: bool, subscription: SubscriptionId) {
        self.push(ProviderEvent::Location {
            location: location.clone(),
            initial,
            subscription,
        });
    }
}
