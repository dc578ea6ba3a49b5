//! Force control loop.
//!
//! Samples one analog input every control tick and feeds the force sensor:
//! an `AnalogSample` whenever the reading changes and a synthesized `Edge`
//! whenever it crosses the setpoint. The edge is posted first so the motor
//! cut is not queued behind the sample.

use std::sync::Arc;
use std::time::Duration;

use modcell_common::io::image::{Edge, ProcessImage};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::runtime::active::ActorRef;
use crate::runtime::message::{ActorId, Event, EventKind};

/// Edge and sample tracking of one analog point.
#[derive(Debug, Clone, Copy)]
struct Threshold {
    setpoint: i64,
    last: Option<i64>,
    above: bool,
}

impl Threshold {
    fn new(setpoint: i64) -> Self {
        Self {
            setpoint,
            last: None,
            above: false,
        }
    }

    /// Events caused by `reading`, in posting order.
    fn update(&mut self, reading: i64) -> heapless::Vec<EventKind, 2> {
        let mut out = heapless::Vec::new();
        let above = reading >= self.setpoint;
        if let Some(edge) = Edge::between(self.above, above) {
            self.above = above;
            let _ = out.push(EventKind::Edge(edge));
        }
        if self.last != Some(reading) {
            self.last = Some(reading);
            let _ = out.push(EventKind::AnalogSample(reading));
        }
        out
    }
}

/// Running control loop task.
pub struct ControlLoop {
    task: JoinHandle<()>,
}

impl ControlLoop {
    pub const ID: ActorId = ActorId::ControlLoop;

    /// Start sampling `pin` every `tick`, posting to `target`.
    pub fn spawn(
        image: Arc<dyn ProcessImage>,
        pin: impl Into<String>,
        setpoint: i64,
        tick: Duration,
        target: ActorRef,
    ) -> Self {
        let pin = pin.into();
        info!(%pin, setpoint, tick_ms = tick.as_millis() as u64, "Starting force control loop");
        let task = tokio::spawn(async move {
            let mut ticker = interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut threshold = Threshold::new(setpoint);
            let mut failing = false;
            loop {
                ticker.tick().await;
                let reading = match image.read_analog(&pin) {
                    Ok(reading) => reading,
                    Err(e) => {
                        if !failing {
                            warn!(%pin, "Force sampling failed: {}", e);
                            failing = true;
                        }
                        continue;
                    }
                };
                if failing {
                    info!(%pin, "Force sampling recovered");
                    failing = false;
                }
                for kind in threshold.update(reading) {
                    if let Err(e) = target.post(Event::new(kind, Self::ID)) {
                        debug!("Control loop post failed: {}", e);
                    }
                }
            }
        });
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop sampling and wait for the task to end.
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
        debug!("Force control loop stopped");
    }
}
