//! Background poller for host notifications.
//!
//! One named thread per bridge. Each wake cycle drains every queued
//! notification into the channel (FIFO as delivered by the host), then parks
//! for the configured interval. The thread never touches comp or tool state.
//!
//! Interruption is cooperative: the flag is checked once per wake cycle and
//! `request_interruption` unparks the thread, so it exits well within one
//! interval. Notifications queued after that are left to the host.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, trace, warn};

use crate::entities::{NotificationSource, RawNotification};

/// Default delay between drains.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

pub struct Poller {
    handle: Option<thread::JoinHandle<()>>,
    interrupt: Arc<AtomicBool>,
}

impl Poller {
    /// Spawn the poller thread.
    ///
    /// With no notification source (host UI manager not found) the thread
    /// exits right away and the bridge never emits.
    pub fn spawn(
        source: Option<Arc<dyn NotificationSource>>,
        interval: Duration,
        tx: Sender<RawNotification>,
    ) -> std::io::Result<Self> {
        let interrupt = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupt);

        let handle = thread::Builder::new()
            .name("fusion-sync-poller".into())
            .spawn(move || {
                let Some(source) = source else {
                    debug!("No Fusion notification source, poller exiting");
                    return;
                };
                trace!("Poller started ({} ms interval)", interval.as_millis());
                run(&*source, interval, &tx, &flag);
                trace!("Poller stopped");
            })?;

        Ok(Self {
            handle: Some(handle),
            interrupt,
        })
    }

    /// Ask the thread to stop at its next wake cycle and wake it now.
    pub fn request_interruption(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
    }

    pub fn is_interruption_requested(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Block until the thread has exited.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Poller thread panicked");
            }
        }
    }
}

fn run(
    source: &dyn NotificationSource,
    interval: Duration,
    tx: &Sender<RawNotification>,
    interrupt: &AtomicBool,
) {
    loop {
        if interrupt.load(Ordering::SeqCst) {
            return;
        }

        while let Some(notification) = source.next_notification() {
            trace!("Host notification: {}", notification.what);
            if tx.send(notification).is_err() {
                // Receiver gone, nobody left to dispatch to
                return;
            }
        }

        thread::park_timeout(interval);
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.request_interruption();
        self.wait();
    }
}
