//! Recording location service shared by the integration tests.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use location_relay::{
    Location, LocationService, Registration, ServiceError, ServiceLink, SubscriptionId, Timestamp,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;
use std::time::Duration;

/// A call the manager made on the service.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Attach,
    Connect,
    Disconnect,
    Request(Registration),
    Remove(SubscriptionId),
}

impl Call {
    pub fn request_id(&self) -> Option<SubscriptionId> {
        match self {
            Call::Request(registration) => Some(registration.id),
            _ => None,
        }
    }
}

/// Service double: records every call, optionally fails them, and can
/// answer `connect` with `on_connected` like a real service would.
pub struct MockService {
    link: Mutex<Option<ServiceLink>>,
    log: Mutex<Vec<Call>>,
    calls_tx: Sender<Call>,
    pub fail_connect: AtomicBool,
    pub fail_requests: AtomicBool,
    pub fail_removes: AtomicBool,
    /// Answer `connect` with `on_connected(baseline)`.
    pub auto_connect: AtomicBool,
    pub baseline: Mutex<Option<Location>>,
}

impl MockService {
    pub fn new() -> (Self, Receiver<Call>) {
        let (calls_tx, calls_rx) = unbounded();
        let service = Self {
            link: Mutex::new(None),
            log: Mutex::new(Vec::new()),
            calls_tx,
            fail_connect: AtomicBool::new(false),
            fail_requests: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
            auto_connect: AtomicBool::new(false),
            baseline: Mutex::new(None),
        };
        (service, calls_rx)
    }

    pub fn link(&self) -> ServiceLink {
        self.link
            .lock()
            .clone()
            .expect("service was never attached")
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().clone()
    }

    pub fn requests(&self) -> Vec<SubscriptionId> {
        self.calls().iter().filter_map(Call::request_id).collect()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    fn record(&self, call: Call) {
        self.log.lock().push(call.clone());
        let _ = self.calls_tx.send(call);
    }
}

impl LocationService for MockService {
    fn attach(&self, link: ServiceLink) {
        *self.link.lock() = Some(link);
        self.record(Call::Attach);
    }

    fn connect(&self) -> Result<(), ServiceError> {
        self.record(Call::Connect);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("binder not ready".into()));
        }
        if self.auto_connect.load(Ordering::SeqCst) {
            let baseline = self.baseline.lock().clone();
            self.link().on_connected(baseline);
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<(), ServiceError> {
        self.record(Call::Disconnect);
        Ok(())
    }

    fn request_updates(&self, registration: &Registration) -> Result<(), ServiceError> {
        self.record(Call::Request(registration.clone()));
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(ServiceError::NotConnected);
        }
        Ok(())
    }

    fn remove_updates(&self, id: SubscriptionId) -> Result<(), ServiceError> {
        self.record(Call::Remove(id));
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(ServiceError::Rejected("unknown callback".into()));
        }
        Ok(())
    }
}

pub const WAIT: Duration = Duration::from_secs(2);

pub fn fix(t: i64) -> Location {
    Location::new(59.93, 30.31, Timestamp(t))
}

/// Route library logs to the test output once per binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}
