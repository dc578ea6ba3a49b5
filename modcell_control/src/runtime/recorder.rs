//! Topic capture.

use std::sync::Arc;

use parking_lot::Mutex;

use super::message::{ActorId, Topic, TopicMessage, Value};
use super::pubsub::{Callback, Publisher};
use crate::error::PubSubError;

/// Records every message of the topics it is attached to.
#[derive(Clone, Default)]
pub struct Recorder {
    messages: Arc<Mutex<Vec<TopicMessage>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> Callback {
        let messages = Arc::clone(&self.messages);
        Arc::new(move |m: &TopicMessage| messages.lock().push(m.clone()))
    }

    /// Attach to every topic `publisher` offers.
    pub fn attach(&self, publisher: &Publisher) -> Result<(), PubSubError> {
        publisher
            .topics()
            .iter()
            .try_for_each(|t| publisher.register(*t, ActorId::Bridge, self.callback()))
    }

    pub fn snapshot(&self) -> Vec<TopicMessage> {
        self.messages.lock().clone()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    /// Values of `topic` published by `sender`, oldest first.
    pub fn values(&self, sender: ActorId, topic: Topic) -> Vec<Value> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.sender == sender && m.topic == topic)
            .map(|m| m.value.clone())
            .collect()
    }

    /// Same as [`values`](Self::values), rendered as text.
    pub fn texts(&self, sender: ActorId, topic: Topic) -> Vec<String> {
        self.values(sender, topic)
            .iter()
            .map(Value::to_string)
            .collect()
    }

    pub fn last(&self, sender: ActorId, topic: Topic) -> Option<Value> {
        self.values(sender, topic).pop()
    }

    pub fn contains(&self, sender: ActorId, topic: Topic, value: impl Into<Value>) -> bool {
        let value = value.into();
        self.messages
            .lock()
            .iter()
            .any(|m| m.sender == sender && m.topic == topic && m.value == value)
    }
}
