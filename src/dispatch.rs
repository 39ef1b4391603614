//! Service-context worker.
//!
//! The manager never calls the [`LocationService`] directly. It enqueues
//! [`Command`]s on an unbounded channel, and a single named worker thread
//! executes them in order. Enqueueing never blocks, and the caller never
//! waits for the outcome.

use crate::service::{LocationService, Registration, ServiceLink};
use crate::subscriptions::manager::ManagerCore;
use crate::subscriptions::SubscriptionId;
use crossbeam_channel::{Receiver, Sender};
use std::io;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Work item for the service context.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    Register(Registration),
    Unregister(SubscriptionId),
    /// Acknowledged once every earlier command has run.
    Barrier(Sender<()>),
    /// Stop the worker after draining earlier commands.
    Terminate,
}

/// Executes commands against the service on the worker thread.
struct ServiceWorker {
    service: Arc<dyn LocationService>,
    core: Weak<ManagerCore>,
    /// The link is handed over lazily, on the first connect.
    attached: bool,
}

impl ServiceWorker {
    fn run(mut self, commands: Receiver<Command>) {
        for command in commands.iter() {
            if matches!(command, Command::Terminate) {
                break;
            }
            self.execute(command);
        }
        debug!("Service worker exiting");
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Connect => {
                if !self.attached {
                    self.service.attach(ServiceLink::new(self.core.clone()));
                    self.attached = true;
                }
                if let Err(e) = self.service.connect() {
                    error!(error = %e, "Failed to connect to location service");
                    if let Some(core) = self.core.upgrade() {
                        core.connect_dispatch_failed();
                    }
                }
            }
            Command::Disconnect => {
                if let Err(e) = self.service.disconnect() {
                    error!(error = %e, "Failed to disconnect from location service");
                }
            }
            Command::Register(registration) => {
                if let Err(e) = self.service.request_updates(&registration) {
                    warn!(id = %registration.id, error = %e, "Failed to request location updates");
                }
            }
            Command::Unregister(id) => {
                if let Err(e) = self.service.remove_updates(id) {
                    warn!(id = %id, error = %e, "Failed to remove location updates");
                }
            }
            Command::Barrier(ack) => {
                let _ = ack.send(());
            }
            Command::Terminate => {}
        }
    }
}

/// Spawn the worker thread draining `commands`.
pub(crate) fn spawn_worker(
    name: &str,
    service: Arc<dyn LocationService>,
    core: Weak<ManagerCore>,
    commands: Receiver<Command>,
) -> io::Result<JoinHandle<()>> {
    let worker = ServiceWorker {
        service,
        core,
        attached: false,
    };
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || worker.run(commands))
}
