//! Event bridge: host notifications -> canonical events.
//!
//! Installing the bridge registers the four comp notifications with the
//! host. `start()` spawns the [`Poller`], which forwards raw notifications
//! over a channel; `pump()` runs on the owning (scripting) thread, decodes
//! each notification once and emits the resulting [`CanonicalEvent`] on the
//! bus.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info, trace};

use super::event_bus::EventBus;
use super::poller::Poller;
use crate::entities::keys::ACTION_IDS;
use crate::entities::{
    CanonicalEvent, FusionApp, HostError, HostNotification, RawNotification, TaskChange,
};

/// Decode a raw notification. Cancelled saves and unknown kinds yield
/// nothing.
pub fn dispatch(raw: RawNotification) -> Option<CanonicalEvent> {
    let decoded = HostNotification::decode(raw);
    let kind = decoded.kind;
    let event = decoded.into_canonical();
    match &event {
        Some(e) => trace!("{:?} -> {}", kind, e.topic()),
        None => trace!("Ignoring {:?} notification", kind),
    }
    event
}

pub struct EventBridge {
    app: Arc<dyn FusionApp>,
    bus: EventBus,
    interval: Duration,
    tx: Sender<RawNotification>,
    rx: Receiver<RawNotification>,
    poller: Option<Poller>,
}

impl EventBridge {
    /// Register interest in the comp notifications. The poller is not
    /// started yet.
    pub fn install(app: Arc<dyn FusionApp>, interval: Duration) -> Result<Self, HostError> {
        for action_id in ACTION_IDS {
            app.add_notify(action_id)?;
        }
        debug!("Registered Fusion notifications: {}", ACTION_IDS.join(", "));

        let (tx, rx) = unbounded();
        Ok(Self {
            app,
            bus: EventBus::new(),
            interval,
            tx,
            rx,
            poller: None,
        })
    }

    /// Spawn the poller thread. No-op when already running.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let source = self.app.notification_source();
        self.poller = Some(Poller::spawn(source, self.interval, self.tx.clone())?);
        info!("Fusion event bridge started");
        Ok(())
    }

    /// Interrupt the poller and wait for it. Notifications it already
    /// forwarded stay available to `pump()`.
    pub fn stop(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.request_interruption();
            poller.wait();
            info!("Fusion event bridge stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.poller.as_ref().is_some_and(Poller::is_running)
    }

    /// Dispatch every forwarded notification. Returns the number of
    /// canonical events emitted.
    pub fn pump(&self) -> usize {
        let mut emitted = 0;
        for raw in self.rx.try_iter() {
            if let Some(event) = dispatch(raw) {
                self.bus.emit(event);
                emitted += 1;
            }
        }
        emitted
    }

    /// Emitted by the workfile tool after switching context.
    pub fn emit_task_changed(&self, change: TaskChange) {
        self.bus.emit(CanonicalEvent::TaskChanged(change));
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn app(&self) -> &Arc<dyn FusionApp> {
        &self.app
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
