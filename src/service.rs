//! The platform location service the manager drives, and the link it calls back through.

use crate::error::ServiceError;
use crate::subscriptions::manager::ManagerCore;
use crate::subscriptions::{SubscriptionId, UpdatePolicy};
use crate::types::Location;
use std::fmt;
use std::sync::Weak;

/// One subscription as handed to the service.
///
/// The service echoes `id` back through [`ServiceLink::on_result`] and
/// [`ServiceLink::on_availability_changed`]; that id is all the manager needs
/// to route a delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub id: SubscriptionId,
    pub policy: UpdatePolicy,
}

/// An asynchronous platform location service.
///
/// Every method is invoked on the manager's service-context thread, one at a
/// time, in the order the manager decided on them. All calls are best-effort:
/// an `Err` is logged by the manager and never reaches its callers.
/// Outcomes are reported later through the attached [`ServiceLink`].
pub trait LocationService: Send + Sync {
    /// Hand over the callback link. Called once, before the first `connect`.
    fn attach(&self, link: ServiceLink);

    /// Begin connecting. Completion is reported via `on_connected` or
    /// `on_connection_failed`.
    fn connect(&self) -> Result<(), ServiceError>;

    fn disconnect(&self) -> Result<(), ServiceError>;

    /// Start delivering updates for `registration`. A second request for an
    /// id that is already registered replaces the first.
    fn request_updates(&self, registration: &Registration) -> Result<(), ServiceError>;

    /// Stop delivering updates for `id`.
    fn remove_updates(&self, id: SubscriptionId) -> Result<(), ServiceError>;
}

/// Handle a [`LocationService`] uses to report back to its manager.
///
/// Holds only a weak reference: once the manager is gone every call is a
/// no-op. Safe to call from any thread.
#[derive(Clone)]
pub struct ServiceLink {
    core: Weak<ManagerCore>,
}

impl ServiceLink {
    pub(crate) fn new(core: Weak<ManagerCore>) -> Self {
        Self { core }
    }

    /// The connection is up. `baseline` is the service's last known location
    /// at connect time, if it has one.
    pub fn on_connected(&self, baseline: Option<Location>) {
        if let Some(core) = self.core.upgrade() {
            core.on_connected(baseline);
        }
    }

    pub fn on_connection_suspended(&self, cause: i32) {
        if let Some(core) = self.core.upgrade() {
            core.on_connection_suspended(cause);
        }
    }

    pub fn on_connection_failed(&self, error_code: i32) {
        if let Some(core) = self.core.upgrade() {
            core.on_connection_failed(error_code);
        }
    }

    /// A fix delivered for subscription `id`.
    pub fn on_result(&self, id: SubscriptionId, location: Location) {
        if let Some(core) = self.core.upgrade() {
            core.on_result(id, location);
        }
    }

    pub fn on_availability_changed(&self, id: SubscriptionId, available: bool) {
        if let Some(core) = self.core.upgrade() {
            core.on_availability_changed(id, available);
        }
    }

    /// Whether the manager on the other end still exists.
    pub fn is_alive(&self) -> bool {
        self.core.strong_count() > 0
    }
}

impl fmt::Debug for ServiceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceLink")
            .field("alive", &self.is_alive())
            .finish()
    }
}
