//! Active objects: one tokio task per actor.
//!
//! Each actor owns a bounded inbox. Posting never blocks; a full inbox
//! rejects the event with [`PostError::Overflow`]. The task dispatches one
//! message at a time, in arrival order, so a behavior never needs a lock
//! around its own state.

use std::fmt;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::message::{ActorId, Event, EventKind, Message, TopicMessage};
use super::pubsub::Callback;
use crate::error::PostError;

/// Inbox item.
#[derive(Debug)]
enum Envelope {
    Deliver(Message),
    Shutdown,
}

/// Posting handle of an actor. Cheap to clone.
#[derive(Clone)]
pub struct ActorRef {
    id: ActorId,
    tx: mpsc::Sender<Envelope>,
}

impl ActorRef {
    #[inline]
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Enqueue a message without blocking.
    pub fn post(&self, message: impl Into<Message>) -> Result<(), PostError> {
        self.tx
            .try_send(Envelope::Deliver(message.into()))
            .map_err(|e| match e {
                TrySendError::Full(_) => PostError::Overflow(self.id),
                TrySendError::Closed(_) => PostError::Closed(self.id),
            })
    }

    /// Post an event from `sender`, logging a failed delivery.
    pub fn send(&self, kind: EventKind, sender: ActorId) {
        if let Err(e) = self.post(Event::new(kind, sender)) {
            error!(from = %sender, "Dropped event: {}", e);
        }
    }

    /// Subscription callback forwarding topic messages into this inbox.
    pub fn forwarder(&self) -> Callback {
        let target = self.clone();
        std::sync::Arc::new(move |message: &TopicMessage| {
            if let Err(e) = target.post(message.clone()) {
                match e {
                    PostError::Overflow(_) => {
                        error!(topic = %message.topic, from = %message.sender, "Dropped topic message: {}", e)
                    }
                    PostError::Closed(_) => {
                        debug!(topic = %message.topic, "Subscriber gone: {}", e)
                    }
                }
            }
        })
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActorRef").field(&self.id).finish()
    }
}

/// Receiving side of an inbox, consumed when the actor is spawned.
pub struct Mailbox {
    id: ActorId,
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
}

impl Mailbox {
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Next queued message, if any. Used to drive behaviors by hand.
    pub fn try_next(&mut self) -> Option<Message> {
        loop {
            match self.rx.try_recv().ok()? {
                Envelope::Deliver(message) => return Some(message),
                Envelope::Shutdown => continue,
            }
        }
    }

    /// Every queued message.
    pub fn drain(&mut self) -> Vec<Message> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Queued events only, dropping topic messages.
    pub fn drain_events(&mut self) -> Vec<EventKind> {
        self.drain()
            .into_iter()
            .filter_map(|m| match m {
                Message::Event(event) => Some(event.kind),
                Message::Topic(_) => None,
            })
            .collect()
    }
}

/// Create an inbox holding at most `capacity` messages.
pub fn mailbox(id: ActorId, capacity: usize) -> (ActorRef, Mailbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ActorRef { id, tx: tx.clone() },
        Mailbox { id, tx, rx },
    )
}

/// Behavior run by an active object.
pub trait Behavior: Send + 'static {
    /// Called once on the actor task before the first message.
    fn on_start(&mut self) {}

    /// Handle one message to completion.
    fn dispatch(&mut self, message: Message);

    /// Called once after the inbox was drained up to the shutdown request.
    fn on_stop(&mut self) {}
}

impl<B: Behavior + ?Sized> Behavior for Box<B> {
    fn on_start(&mut self) {
        (**self).on_start();
    }

    fn dispatch(&mut self, message: Message) {
        (**self).dispatch(message);
    }

    fn on_stop(&mut self) {
        (**self).on_stop();
    }
}

/// A running actor task.
pub struct ActiveObject {
    id: ActorId,
    tx: mpsc::Sender<Envelope>,
    task: JoinHandle<()>,
}

impl ActiveObject {
    /// Spawn `behavior` on the current tokio runtime.
    pub fn spawn<B: Behavior>(mailbox: Mailbox, behavior: B) -> Self {
        let Mailbox { id, tx, rx } = mailbox;
        let task = tokio::spawn(run(id, rx, behavior));
        Self { id, tx, task }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Deliver a shutdown request behind every queued message and wait for
    /// the task to finish.
    pub async fn stop(self) {
        if self.tx.send(Envelope::Shutdown).await.is_err() {
            debug!(actor = %self.id, "Already stopped");
        }
        if let Err(e) = self.task.await {
            warn!(actor = %self.id, "Actor task ended abnormally: {}", e);
        }
    }
}

async fn run<B: Behavior>(id: ActorId, mut rx: mpsc::Receiver<Envelope>, mut behavior: B) {
    debug!(actor = %id, "Actor started");
    behavior.on_start();
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Deliver(message) => behavior.dispatch(message),
            Envelope::Shutdown => break,
        }
    }
    behavior.on_stop();
    debug!(actor = %id, "Actor stopped");
}
