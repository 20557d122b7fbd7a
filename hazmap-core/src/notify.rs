//! Change notifications delivered on a single dedicated thread.
//!
//! Background tasks publish [`Event`]s into a channel; one delivery thread
//! drains it and calls every registered [`Listener`] in registration order.
//! Listener code therefore never runs concurrently with itself for bus
//! callbacks.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use log::{debug, warn};
use parking_lot::Mutex;

use crate::{EngineError, PointsError};

/// Name of the delivery thread.
pub const NOTIFY_THREAD_NAME: &str = "hazmap-notify";

/// Observer of catalog changes.
pub trait Listener: Send + Sync {
    /// Data changed. `is_remote_update` is `true` after a catalog refresh and
    /// `false` after a local mutation.
    fn on_data_updated(&self, is_remote_update: bool);

    /// A catalog refresh failed.
    fn on_data_update_failed(&self, cause: &PointsError);
}

/// Notification carried by the bus.
#[derive(Debug, Clone)]
pub enum Event {
    /// See [`Listener::on_data_updated`].
    Updated {
        /// Whether the change came from the remote catalog.
        remote: bool,
    },
    /// See [`Listener::on_data_update_failed`].
    UpdateFailed(PointsError),
}

type ListenerSet = Arc<Mutex<Vec<Arc<dyn Listener>>>>;

enum Message {
    Deliver(Event),
    Flush(Sender<()>),
}

/// Registered listeners plus the delivery thread.
///
/// Do not call [`NotificationBus::flush`] or [`NotificationBus::shutdown`]
/// from inside a listener callback: both wait for the delivery thread.
pub struct NotificationBus {
    listeners: ListenerSet,
    sender: Mutex<Option<Sender<Message>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("listeners", &self.listeners.lock().len())
            .field("running", &self.sender.lock().is_some())
            .finish()
    }
}

impl NotificationBus {
    /// Start the delivery thread.
    pub fn start() -> Result<Self, EngineError> {
        let listeners: ListenerSet = Arc::default();
        let (sender, receiver) = unbounded();
        let dispatcher = thread::Builder::new()
            .name(NOTIFY_THREAD_NAME.to_owned())
            .spawn({
                let listeners = Arc::clone(&listeners);
                move || dispatch(&receiver, &listeners)
            })
            .map_err(|err| EngineError::Spawn {
                thread: NOTIFY_THREAD_NAME,
                message: err.to_string(),
            })?;
        Ok(Self {
            listeners,
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Register a listener. Returns `false` when it was already registered.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) -> bool {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|known| same_listener(known, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Unregister a listener. Returns `false` when it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn Listener>) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|known| !same_listener(known, listener));
        listeners.len() != before
    }

    /// Queue an update notification.
    pub fn notify_updated(&self, remote: bool) {
        self.publish(Event::Updated { remote });
    }

    /// Queue an update-failed notification.
    pub fn notify_failed(&self, cause: PointsError) {
        self.publish(Event::UpdateFailed(cause));
    }

    fn publish(&self, event: Event) {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            debug!("notification bus stopped; dropping {event:?}");
            return;
        };
        if sender.send(Message::Deliver(event)).is_err() {
            warn!("notification thread exited; event dropped");
        }
    }

    /// Block until every notification queued so far has been delivered.
    pub fn flush(&self) {
        let (ack, done) = bounded(1);
        let queued = self
            .sender
            .lock()
            .as_ref()
            .is_some_and(|sender| sender.send(Message::Flush(ack)).is_ok());
        if queued && done.recv().is_err() {
            warn!("notification thread exited during flush");
        }
    }

    /// Deliver everything already queued, then stop the delivery thread.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("notification thread panicked");
            }
        }
    }
}

impl Drop for NotificationBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn same_listener(left: &Arc<dyn Listener>, right: &Arc<dyn Listener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(left), Arc::as_ptr(right))
}

fn dispatch(receiver: &Receiver<Message>, listeners: &ListenerSet) {
    for message in receiver {
        let event = match message {
            Message::Deliver(event) => event,
            Message::Flush(ack) => {
                if ack.send(()).is_err() {
                    debug!("flush requester went away");
                }
                continue;
            }
        };
        let snapshot: Vec<Arc<dyn Listener>> = listeners.lock().clone();
        for listener in &snapshot {
            match &event {
                Event::Updated { remote } => listener.on_data_updated(*remote),
                Event::UpdateFailed(cause) => listener.on_data_update_failed(cause),
            }
        }
    }
}
