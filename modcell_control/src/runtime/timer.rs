//! One-shot monitoring timers.
//!
//! A timer posts a fixed event into its owner's inbox when its interval
//! elapses. Cancelling clears the armed flag first, so an expiry racing the
//! cancel is never delivered. Restarting cancels the previous arming.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use super::active::ActorRef;
use super::message::Event;

type Expiry = Arc<dyn Fn() + Send + Sync>;

pub struct MonitoringTimer {
    interval: Duration,
    expiry: Expiry,
    armed: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl MonitoringTimer {
    /// Timer posting `event` to `target` on expiry.
    pub fn posting(interval: Duration, target: ActorRef, event: Event) -> Self {
        Self::new(
            interval,
            Arc::new(move || {
                if let Err(e) = target.post(event.clone()) {
                    error!("Timer expiry lost: {}", e);
                }
            }),
        )
    }

    pub fn new(interval: Duration, expiry: Expiry) -> Self {
        Self {
            interval,
            expiry,
            armed: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Arm the timer, cancelling a previous arming.
    pub fn start(&mut self) {
        self.cancel();
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("Monitoring timer started outside a runtime, ignored");
                return;
            }
        };
        let armed = Arc::new(AtomicBool::new(true));
        self.armed = Arc::clone(&armed);
        let expiry = Arc::clone(&self.expiry);
        let interval = self.interval;
        self.task = Some(handle.spawn(async move {
            tokio::time::sleep(interval).await;
            if armed.swap(false, Ordering::AcqRel) {
                expiry();
            }
        }));
    }

    /// Disarm the timer. No-op when not armed.
    pub fn cancel(&mut self) {
        self.armed.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

impl Drop for MonitoringTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
