//! Position tracker: regular updates plus one-shot requests with a timeout.
//!
//! Built on a [`SubscriptionManager`] that reports into a channel. A pump
//! thread turns manager events into [`TrackerEvent`]s, keeps the last known
//! position, completes one-shot requests, and fires their timeouts.

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::service::LocationService;
use crate::subscriptions::{
    EventReceiver, Priority, ProviderEvent, SubscriptionId, SubscriptionManager, UpdatePolicy,
};
use crate::types::{Location, Status};
use crossbeam_channel::{after, bounded, never, select, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Events emitted by a [`PositionTracker`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerEvent {
    StatusChanged { status: Status },
    /// A position newer than the last known one, or the connect-time initial fix.
    PositionReceived { location: Location },
    /// The pending one-shot request got no fix in time and was cancelled.
    RequestTimeout,
}

struct TrackerState {
    priority: Priority,
    interval: Duration,
    fastest_interval: Duration,
    regular: Option<SubscriptionId>,
    single: Option<SubscriptionId>,
    last_known: Option<Location>,
}

impl TrackerState {
    fn policy(&self) -> UpdatePolicy {
        UpdatePolicy::new(self.priority, self.interval).with_fastest_interval(self.fastest_interval)
    }
}

enum Control {
    /// Start the timeout for a one-shot request.
    Arm { id: SubscriptionId, timeout: Duration },
    Disarm,
    Stop,
}

/// High-level location source with a single regular subscription and
/// on-demand single fixes.
pub struct PositionTracker {
    manager: Arc<SubscriptionManager>,
    state: Arc<Mutex<TrackerState>>,
    control: Sender<Control>,
    events: Receiver<TrackerEvent>,
    pump: Option<JoinHandle<()>>,
}

impl PositionTracker {
    pub fn new(service: Arc<dyn LocationService>, config: TrackerConfig) -> Result<Self> {
        let buffer = config.manager.event_buffer;
        let (manager, provider_events) = SubscriptionManager::with_channel(service, config.manager)?;
        let manager = Arc::new(manager);
        let state = Arc::new(Mutex::new(TrackerState {
            priority: config.priority,
            interval: config.interval,
            fastest_interval: config.fastest_interval,
            regular: None,
            single: None,
            last_known: None,
        }));
        let (control, control_rx) = unbounded();
        let (event_tx, events) = bounded(buffer.max(1));

        let pump = Pump {
            manager: Arc::clone(&manager),
            state: Arc::clone(&state),
            events: event_tx,
            deadline: None,
        };
        let pump = thread::Builder::new()
            .name("location-tracker".to_string())
            .spawn(move || pump.run(provider_events, control_rx))?;

        Ok(Self {
            manager,
            state,
            control,
            events,
            pump: Some(pump),
        })
    }

    /// Intervals used by the next `start_updates` / `request_update`.
    pub fn set_update_interval(&self, required: Duration, minimum: Duration) {
        let mut state = self.state.lock();
        state.interval = required;
        state.fastest_interval = minimum;
    }

    pub fn set_priority(&self, priority: Priority) {
        self.state.lock().priority = priority;
    }

    /// (Re)start regular updates with the current settings.
    pub fn start_updates(&self) -> SubscriptionId {
        let mut state = self.state.lock();
        if let Some(previous) = state.regular.take() {
            self.manager.stop_updates(previous);
        }
        let id = self.manager.start_updates(state.policy());
        state.regular = Some(id);
        info!(%id, "Regular location updates started");
        id
    }

    pub fn stop_updates(&self) {
        if let Some(id) = self.state.lock().regular.take() {
            self.manager.stop_updates(id);
            info!(%id, "Regular location updates stopped");
        }
    }

    /// Ask for a single fix, replacing any pending one.
    ///
    /// With a non-zero `timeout` the request is cancelled and
    /// [`TrackerEvent::RequestTimeout`] emitted if no fix arrives in time.
    pub fn request_update(&self, timeout: Duration) -> SubscriptionId {
        let mut state = self.state.lock();
        if let Some(previous) = state.single.take() {
            self.manager.stop_updates(previous);
        }
        let id = self.manager.start_updates(state.policy().with_num_updates(1));
        state.single = Some(id);

        let control = if timeout.is_zero() {
            Control::Disarm
        } else {
            Control::Arm { id, timeout }
        };
        if self.control.send(control).is_err() {
            error!("Tracker pump is gone, request timeout not armed");
        }
        debug!(%id, ?timeout, "Single location update requested");
        id
    }

    pub fn last_known_position(&self) -> Option<Location> {
        self.state.lock().last_known.clone()
    }

    pub fn events(&self) -> &Receiver<TrackerEvent> {
        &self.events
    }

    /// The underlying manager, e.g. for its [`ServiceLink`](crate::ServiceLink).
    pub fn manager(&self) -> &SubscriptionManager {
        &self.manager
    }
}

impl Drop for PositionTracker {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Stop);
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                error!("Tracker pump panicked");
            }
        }
        self.manager.shutdown();
    }
}

struct Pump {
    manager: Arc<SubscriptionManager>,
    state: Arc<Mutex<TrackerState>>,
    events: Sender<TrackerEvent>,
    /// Pending one-shot request and when it expires.
    deadline: Option<(SubscriptionId, Instant)>,
}

impl Pump {
    fn run(mut self, provider: EventReceiver, control: Receiver<Control>) {
        loop {
            let timer = match self.deadline {
                Some((_, at)) => after(at.saturating_duration_since(Instant::now())),
                None => never(),
            };

            let running = select! {
                recv(control) -> msg => match msg {
                    Ok(Control::Arm { id, timeout }) => {
                        self.arm(id, timeout);
                        true
                    }
                    Ok(Control::Disarm) => {
                        self.deadline = None;
                        true
                    }
                    Ok(Control::Stop) | Err(_) => false,
                },
                recv(provider.receiver) -> event => match event {
                    Ok(event) => {
                        self.handle(event);
                        true
                    }
                    Err(_) => false,
                },
                recv(timer) -> _ => {
                    self.expire();
                    true
                }
            };
            if !running {
                break;
            }
        }
        debug!("Tracker pump exiting");
    }

    fn arm(&mut self, id: SubscriptionId, timeout: Duration) {
        // The fix may already have arrived.
        if self.state.lock().single == Some(id) {
            self.deadline = Some((id, Instant::now() + timeout));
        }
    }

    fn handle(&mut self, event: ProviderEvent) {
        match event {
            ProviderEvent::Status { status } => self.emit(TrackerEvent::StatusChanged { status }),
            ProviderEvent::Location {
                location,
                initial,
                subscription,
            } => {
                let accepted = {
                    let mut state = self.state.lock();
                    if state.single == Some(subscription) {
                        state.single = None;
                        self.manager.stop_updates(subscription);
                        if matches!(self.deadline, Some((id, _)) if id == subscription) {
                            self.deadline = None;
                        }
                    }
                    let newer = state
                        .last_known
                        .as_ref()
                        .map_or(true, |last| location.is_newer_than(last));
                    if initial || newer {
                        state.last_known = Some(location.clone());
                        true
                    } else {
                        false
                    }
                };
                if accepted {
                    self.emit(TrackerEvent::PositionReceived { location });
                }
            }
        }
    }

    fn expire(&mut self) {
        let Some((id, _)) = self.deadline.take() else {
            return;
        };
        let timed_out = {
            let mut state = self.state.lock();
            if state.single == Some(id) {
                state.single = None;
                self.manager.stop_updates(id);
                true
            } else {
                false
            }
        };
        if timed_out {
            info!(%id, "Single location update timed out");
            self.emit(TrackerEvent::RequestTimeout);
        }
    }

    fn emit(&self, event: TrackerEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            warn!(?event, "Tracker event buffer full, dropping event");
        }
    }
}
