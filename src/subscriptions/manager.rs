//! Subscription manager binding location subscriptions to a reconnecting service.

use crate::config::ManagerConfig;
use crate::consumer::{ChannelConsumer, LocationConsumer};
use crate::dispatch::{spawn_worker, Command};
use crate::error::{LocationError, Result};
use crate::service::{LocationService, Registration, ServiceLink};
use crate::types::{ConnectionState, Location, Status};
use crossbeam_channel::{bounded, unbounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

use super::types::{EventReceiver, SubscriptionId, UpdatePolicy};

/// Internal subscription state.
struct Subscription {
    id: SubscriptionId,
    policy: UpdatePolicy,
}

impl Subscription {
    fn registration(&self) -> Registration {
        Registration {
            id: self.id,
            policy: self.policy.clone(),
        }
    }
}

/// A consumer notification, queued in decision order.
enum Notice {
    Status(Status),
    Location {
        location: Location,
        initial: bool,
        subscription: SubscriptionId,
    },
}

impl Notice {
    fn deliver(self, consumer: &dyn LocationConsumer) {
        match self {
            Notice::Status(status) => consumer.on_status(status),
            Notice::Location {
                location,
                initial,
                subscription,
            } => consumer.on_location(&location, initial, subscription),
        }
    }
}

/// Everything guarded by the manager lock.
///
/// Connection state, the table and the cache are read together when
/// deciding what to send to the service, so they share one lock.
struct State {
    connection: ConnectionState,
    /// Ordered by id, so iteration is first-registered-first.
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    last_location: Option<Location>,
    /// Detached on shutdown; later service callbacks are dropped.
    consumer: Option<Arc<dyn LocationConsumer>>,
    /// Notices decided but not yet handed to the consumer.
    outbox: VecDeque<(Arc<dyn LocationConsumer>, Notice)>,
    /// Some thread is draining the outbox.
    delivering: bool,
}

impl State {
    fn is_closed(&self) -> bool {
        self.consumer.is_none()
    }

    /// Queue a notice for the attached consumer. Returns false once shut down.
    fn notify(&mut self, notice: Notice) -> bool {
        match &self.consumer {
            Some(consumer) => {
                self.outbox.push_back((Arc::clone(consumer), notice));
                true
            }
            None => false,
        }
    }

    /// Whether the service may be holding registrations right now.
    fn may_hold_registrations(&self) -> bool {
        matches!(
            self.connection,
            ConnectionState::Connected | ConnectionState::Suspended
        )
    }

    /// Keep `candidate` if it is newer than the cache.
    fn offer_location(&mut self, candidate: &Location) {
        let newer = self
            .last_location
            .as_ref()
            .map_or(true, |current| candidate.is_newer_than(current));
        if newer {
            self.last_location = Some(candidate.clone());
        }
    }
}

/// Shared core of a manager. The service link and the worker hold weak
/// references to it.
pub(crate) struct ManagerCore {
    state: Mutex<State>,
    commands: Sender<Command>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl ManagerCore {
    /// Queue a command for the service context. Called with the state lock
    /// held so that queue order matches decision order.
    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            error!(command = ?e.into_inner(), "Service context is gone, dropping command");
        }
    }

    /// Hand queued notices to the consumer, outside the lock and in the
    /// order they were queued.
    ///
    /// One thread drains at a time. A caller that finds another thread
    /// draining leaves its notices to that thread, which also covers
    /// consumers calling back into the manager.
    fn deliver(&self) {
        {
            let mut state = self.state.lock();
            if state.delivering {
                return;
            }
            state.delivering = true;
        }
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.outbox.pop_front() {
                    Some(next) => next,
                    None => {
                        state.delivering = false;
                        return;
                    }
                }
            };
            let (consumer, notice) = next;
            notice.deliver(consumer.as_ref());
        }
    }

    fn connect_if_needed(&self, state: &mut State) {
        if state.connection.needs_connect() {
            info!(from = ?state.connection, "Connecting to location service");
            state.connection = ConnectionState::Connecting;
            self.send(Command::Connect);
        }
    }

    fn initialize(&self) {
        let mut state = self.state.lock();
        if state.is_closed() {
            return;
        }
        self.connect_if_needed(&mut state);
    }

    fn start_updates(&self, policy: UpdatePolicy) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut state = self.state.lock();
        if state.is_closed() {
            debug!(%id, "Manager is shut down, subscription not recorded");
            return id;
        }

        let holds = state.may_hold_registrations();
        if state.subscriptions.remove(&id).is_some() && holds {
            self.send(Command::Unregister(id));
        }

        let subscription = Subscription { id, policy };
        if state.connection == ConnectionState::Connected {
            self.send(Command::Register(subscription.registration()));
        } else {
            self.connect_if_needed(&mut state);
        }
        state.subscriptions.insert(id, subscription);

        debug!(%id, connection = ?state.connection, "Started location updates");
        id
    }

    fn stop_updates(&self, id: SubscriptionId) {
        let mut state = self.state.lock();
        if state.subscriptions.remove(&id).is_none() {
            debug!(%id, "Stop for unknown subscription ignored");
            return;
        }
        if state.may_hold_registrations() {
            self.send(Command::Unregister(id));
        }
        debug!(%id, "Stopped location updates");
    }

    pub(crate) fn on_connected(&self, baseline: Option<Location>) {
        {
            let mut state = self.state.lock();
            if state.is_closed() {
                return;
            }
            state.connection = ConnectionState::Connected;
            if let Some(baseline) = &baseline {
                state.offer_location(baseline);
            }
            for subscription in state.subscriptions.values() {
                self.send(Command::Register(subscription.registration()));
            }
            info!(
                subscriptions = state.subscriptions.len(),
                "Connected to location service"
            );
            if let Some(location) = state.last_location.clone() {
                state.notify(Notice::Location {
                    location,
                    initial: true,
                    subscription: SubscriptionId::BASELINE,
                });
            }
            state.notify(Notice::Status(Status::Connected));
        }
        self.deliver();
    }

    pub(crate) fn on_connection_suspended(&self, cause: i32) {
        {
            let mut state = self.state.lock();
            if !state.notify(Notice::Status(Status::ConnectionSuspended)) {
                return;
            }
            state.connection = ConnectionState::Suspended;
        }
        info!(cause, "Location service connection suspended");
        self.deliver();
    }

    pub(crate) fn on_connection_failed(&self, error_code: i32) {
        {
            let mut state = self.state.lock();
            if !state.notify(Notice::Status(Status::ConnectionError)) {
                return;
            }
            state.connection = ConnectionState::Failed;
        }
        info!(error_code, "Location service connection failed");
        self.deliver();
    }

    pub(crate) fn on_result(&self, id: SubscriptionId, location: Location) {
        {
            let mut state = self.state.lock();
            if state.is_closed() {
                return;
            }
            if !state.subscriptions.contains_key(&id) {
                debug!(%id, "Dropping result for inactive subscription");
                return;
            }
            state.offer_location(&location);
            state.notify(Notice::Location {
                location,
                initial: false,
                subscription: id,
            });
        }
        self.deliver();
    }

    pub(crate) fn on_availability_changed(&self, id: SubscriptionId, available: bool) {
        {
            let mut state = self.state.lock();
            if state.is_closed() {
                return;
            }
            if !state.subscriptions.contains_key(&id) {
                debug!(%id, "Dropping availability for inactive subscription");
                return;
            }
            // Reported on the shared status channel, not per subscription.
            state.notify(Notice::Status(if available {
                Status::RequestSuccess
            } else {
                Status::RequestFail
            }));
        }
        self.deliver();
    }

    /// The connect command could not be issued. Move from `Connecting` to
    /// `Failed` so that the next subscription retries.
    pub(crate) fn connect_dispatch_failed(&self) {
        let mut state = self.state.lock();
        if state.connection == ConnectionState::Connecting {
            state.connection = ConnectionState::Failed;
        }
    }

    fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if !state.notify(Notice::Status(Status::Disconnected)) {
                return;
            }
            state.consumer = None;
            if state.may_hold_registrations() {
                for id in state.subscriptions.keys() {
                    self.send(Command::Unregister(*id));
                }
            }
            state.subscriptions.clear();
            if !matches!(
                state.connection,
                ConnectionState::Disconnected | ConnectionState::Failed
            ) {
                self.send(Command::Disconnect);
            }
            state.connection = ConnectionState::Disconnected;
        }
        info!("Location manager shut down");
        self.deliver();
    }

    fn flush(&self, timeout: Duration) -> Result<()> {
        let (ack, done) = bounded(1);
        self.commands
            .send(Command::Barrier(ack))
            .map_err(|_| LocationError::Closed)?;
        match done.recv_timeout(timeout) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(LocationError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(LocationError::Closed),
        }
    }
}

/// Binds any number of location subscriptions to one, possibly
/// reconnecting, location service.
///
/// Every subscription is (re)registered with the service whenever it is
/// connected, and unregistered on cancellation or shutdown. Public calls
/// never block on the service: work is queued for the service-context
/// thread and outcomes arrive through the [`LocationConsumer`].
pub struct SubscriptionManager {
    core: Arc<ManagerCore>,
    worker: Option<JoinHandle<()>>,
}

impl SubscriptionManager {
    /// Create a manager driving `service` and reporting to `consumer`.
    ///
    /// Reports `Disconnected` right away and, if configured, starts
    /// connecting.
    pub fn new(
        service: Arc<dyn LocationService>,
        consumer: Arc<dyn LocationConsumer>,
        config: ManagerConfig,
    ) -> Result<Self> {
        let (commands, receiver) = unbounded();
        let mut state = State {
            connection: ConnectionState::Disconnected,
            subscriptions: BTreeMap::new(),
            last_location: None,
            consumer: Some(consumer),
            outbox: VecDeque::new(),
            delivering: false,
        };
        state.notify(Notice::Status(Status::Disconnected));
        let core = Arc::new(ManagerCore {
            state: Mutex::new(state),
            commands,
            next_id: AtomicU64::new(1),
        });
        let worker = spawn_worker(
            &config.worker_name,
            service,
            Arc::downgrade(&core),
            receiver,
        )?;

        core.deliver();

        let manager = Self {
            core,
            worker: Some(worker),
        };
        if config.connect_on_start {
            manager.initialize();
        }
        Ok(manager)
    }

    /// Create a manager reporting into a [`ChannelConsumer`] sized by
    /// `config.event_buffer`.
    pub fn with_channel(
        service: Arc<dyn LocationService>,
        config: ManagerConfig,
    ) -> Result<(Self, EventReceiver)> {
        let (consumer, events) = ChannelConsumer::new(config.event_buffer);
        let manager = Self::new(service, Arc::new(consumer), config)?;
        Ok((manager, events))
    }

    /// Begin connecting unless a connect is already in flight or done.
    pub fn initialize(&self) {
        self.core.initialize();
    }

    /// Subscribe to recurring updates. Returns immediately; the service is
    /// asked for updates now if connected, otherwise once it connects.
    pub fn start_updates(&self, policy: UpdatePolicy) -> SubscriptionId {
        self.core.start_updates(policy)
    }

    /// Cancel a subscription. Unknown ids are ignored.
    pub fn stop_updates(&self, id: SubscriptionId) {
        self.core.stop_updates(id);
    }

    /// Link for the service to report through. The manager also hands one
    /// to the service before its first connect.
    pub fn link(&self) -> ServiceLink {
        ServiceLink::new(Arc::downgrade(&self.core))
    }

    pub fn on_connected(&self, baseline: Option<Location>) {
        self.core.on_connected(baseline);
    }

    pub fn on_connection_suspended(&self, cause: i32) {
        self.core.on_connection_suspended(cause);
    }

    pub fn on_connection_failed(&self, error_code: i32) {
        self.core.on_connection_failed(error_code);
    }

    pub fn on_result(&self, id: SubscriptionId, location: Location) {
        self.core.on_result(id, location);
    }

    pub fn on_availability_changed(&self, id: SubscriptionId, available: bool) {
        self.core.on_availability_changed(id, available);
    }

    /// Cancel everything, disconnect, and report `Disconnected`.
    ///
    /// Later calls, and service callbacks arriving afterwards, do nothing.
    pub fn shutdown(&self) {
        self.core.shutdown();
    }

    /// Wait until every service command queued so far has been executed.
    ///
    /// Must not be called from the service-context thread itself.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.core.flush(timeout)
    }

    // --- Inspection ---

    pub fn connection_state(&self) -> ConnectionState {
        self.core.state.lock().connection
    }

    pub fn subscription_count(&self) -> usize {
        self.core.state.lock().subscriptions.len()
    }

    /// Live subscription ids, oldest first.
    pub fn active_subscriptions(&self) -> Vec<SubscriptionId> {
        self.core.state.lock().subscriptions.keys().copied().collect()
    }

    pub fn policy(&self, id: SubscriptionId) -> Option<UpdatePolicy> {
        self.core
            .state
            .lock()
            .subscriptions
            .get(&id)
            .map(|s| s.policy.clone())
    }

    /// Newest location seen from any subscription or connect baseline.
    pub fn last_location(&self) -> Option<Location> {
        self.core.state.lock().last_location.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.core.state.lock().is_closed()
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.core.shutdown();
        self.core.send(Command::Terminate);
        if let Some(worker) = self.worker.take() {
            // Dropped from a callback running on the worker itself: it exits on Terminate.
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                error!("Service worker panicked");
            }
        }
    }
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.lock();
        f.debug_struct("SubscriptionManager")
            .field("connection", &state.connection)
            .field("subscriptions", &state.subscriptions.len())
            .field("closed", &state.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::subscriptions::{Priority, ProviderEvent};
    use crate::types::Timestamp;

    /// Service that records calls and never calls back on its own.
    #[derive(Default)]
    struct RecordingService {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingService {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl LocationService for RecordingService {
        fn attach(&self, _link: ServiceLink) {
            self.calls.lock().push("attach".into());
        }

        fn connect(&self) -> std::result::Result<(), ServiceError> {
            self.calls.lock().push("connect".into());
            Ok(())
        }

        fn disconnect(&self) -> std::result::Result<(), ServiceError> {
            self.calls.lock().push("disconnect".into());
            Ok(())
        }

        fn request_updates(
            &self,
            registration: &Registration,
        ) -> std::result::Result<(), ServiceError> {
            self.calls
                .lock()
                .push(format!("request {}", registration.id));
            Ok(())
        }

        fn remove_updates(&self, id: SubscriptionId) -> std::result::Result<(), ServiceError> {
            self.calls.lock().push(format!("remove {id}"));
            Ok(())
        }
    }

    fn setup(connect_on_start: bool) -> (SubscriptionManager, Arc<RecordingService>, EventReceiver) {
        let service = Arc::new(RecordingService::default());
        let config = ManagerConfig {
            connect_on_start,
            ..Default::default()
        };
        let (manager, events) =
            SubscriptionManager::with_channel(service.clone(), config).unwrap();
        (manager, service, events)
    }

    fn policy() -> UpdatePolicy {
        UpdatePolicy::new(Priority::HighAccuracy, Duration::from_secs(1))
    }

    fn fix(t: i64) -> Location {
        Location::new(55.0, 37.0, Timestamp(t))
    }

    #[test]
    fn test_reports_disconnected_on_creation() {
        let (_manager, _service, events) = setup(false);
        assert_eq!(
            events.try_recv().unwrap(),
            ProviderEvent::Status {
                status: Status::Disconnected
            }
        );
    }

    #[test]
    fn test_initialize_connects_once() {
        let (manager, service, _events) = setup(false);
        manager.initialize();
        manager.initialize();
        assert_eq!(manager.connection_state(), ConnectionState::Connecting);
        manager.flush(Duration::from_secs(1)).unwrap();
        assert_eq!(service.calls(), vec!["attach", "connect"]);
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let (manager, _service, _events) = setup(false);
        let a = manager.start_updates(policy());
        let b = manager.start_updates(policy());
        manager.stop_updates(a);
        let c = manager.start_updates(policy());
        assert_eq!((a, b, c), (SubscriptionId(1), SubscriptionId(2), SubscriptionId(3)));
    }

    #[test]
    fn test_start_while_connected_registers_immediately() {
        let (manager, service, _events) = setup(true);
        manager.on_connected(None);
        let id = manager.start_updates(policy());
        manager.flush(Duration::from_secs(1)).unwrap();
        let expected = vec!["attach".to_string(), "connect".to_string(), format!("request {id}")];
        assert_eq!(service.calls(), expected);
    }

    #[test]
    fn test_start_while_connecting_defers() {
        let (manager, service, _events) = setup(true);
        manager.start_updates(policy());
        manager.flush(Duration::from_secs(1)).unwrap();
        assert_eq!(service.calls(), vec!["attach", "connect"]);
        assert_eq!(manager.subscription_count(), 1);
    }

    #[test]
    fn test_failed_connection_retried_by_next_start() {
        let (manager, service, events) = setup(true);
        manager.on_connection_failed(7);
        assert_eq!(manager.connection_state(), ConnectionState::Failed);
        manager.start_updates(policy());
        assert_eq!(manager.connection_state(), ConnectionState::Connecting);
        manager.flush(Duration::from_secs(1)).unwrap();
        assert_eq!(service.calls(), vec!["attach", "connect", "connect"]);

        let statuses: Vec<_> = events.drain();
        assert!(statuses.contains(&ProviderEvent::Status {
            status: Status::ConnectionError
        }));
    }

    #[test]
    fn test_suspended_defers_without_reconnect() {
        let (manager, service, events) = setup(true);
        manager.on_connected(None);
        manager.on_connection_suspended(2);
        manager.start_updates(policy());
        manager.flush(Duration::from_secs(1)).unwrap();
        assert_eq!(service.calls(), vec!["attach", "connect"]);
        assert!(events.drain().contains(&ProviderEvent::Status {
            status: Status::ConnectionSuspended
        }));
    }

    #[test]
    fn test_stale_result_not_cached() {
        let (manager, _service, events) = setup(true);
        manager.on_connected(None);
        let id = manager.start_updates(policy());
        manager.stop_updates(id);
        events.drain();

        manager.on_result(id, fix(500));
        assert_eq!(manager.last_location(), None);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_cache_never_regresses() {
        let (manager, _service, _events) = setup(true);
        manager.on_connected(None);
        let id = manager.start_updates(policy());
        manager.on_result(id, fix(200));
        manager.on_result(id, fix(100));
        assert_eq!(manager.last_location().unwrap().timestamp, Timestamp(200));
    }

    #[test]
    fn test_availability_uses_generic_status() {
        let (manager, _service, events) = setup(true);
        manager.on_connected(None);
        let id = manager.start_updates(policy());
        events.drain();

        manager.on_availability_changed(id, false);
        manager.on_availability_changed(id, true);
        assert_eq!(
            events.drain(),
            vec![
                ProviderEvent::Status {
                    status: Status::RequestFail
                },
                ProviderEvent::Status {
                    status: Status::RequestSuccess
                },
            ]
        );
        assert_eq!(manager.subscription_count(), 1);
    }

    #[test]
    fn test_shutdown_unregisters_and_disconnects() {
        let (manager, service, events) = setup(true);
        manager.on_connected(None);
        let a = manager.start_updates(policy());
        let b = manager.start_updates(policy());
        events.drain();

        manager.shutdown();
        manager.shutdown();
        manager.flush(Duration::from_secs(1)).unwrap();

        let calls = service.calls();
        let tail = &calls[calls.len() - 3..];
        assert_eq!(
            tail,
            &[format!("remove {a}"), format!("remove {b}"), "disconnect".to_string()]
        );
        assert_eq!(manager.subscription_count(), 0);
        assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
        assert_eq!(
            events.drain(),
            vec![ProviderEvent::Status {
                status: Status::Disconnected
            }]
        );
    }

    #[test]
    fn test_callbacks_after_shutdown_are_dropped() {
        let (manager, _service, events) = setup(true);
        manager.shutdown();
        events.drain();

        manager.on_connected(Some(fix(10)));
        manager.on_connection_failed(1);
        assert!(events.try_recv().is_err());
        assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_link_outlives_manager() {
        let (manager, _service, _events) = setup(false);
        let link = manager.link();
        assert!(link.is_alive());
        drop(manager);
        assert!(!link.is_alive());
        link.on_connected(Some(fix(1)));
    }
}
