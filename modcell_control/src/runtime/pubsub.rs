//! Topic publishers.
//!
//! Every actor that emits topics owns one [`Publisher`] listing the topics
//! it may publish. Subscribers register a callback per topic; publishing
//! runs the callbacks registered at that moment, in registration order, on
//! the publishing thread. Callbacks must not block.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, trace};

use super::active::ActorRef;
use super::message::{ActorId, Topic, TopicMessage, Value};
use crate::error::PubSubError;

/// Subscription callback.
pub type Callback = Arc<dyn Fn(&TopicMessage) + Send + Sync>;

struct Subscription {
    topic: Topic,
    subscriber: ActorId,
    callback: Callback,
}

/// Topic registry of one actor.
pub struct Publisher {
    owner: ActorId,
    topics: Vec<Topic>,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl Publisher {
    pub fn new(owner: ActorId, topics: &[Topic]) -> Arc<Self> {
        Arc::new(Self {
            owner,
            topics: topics.to_vec(),
            subscriptions: RwLock::new(Vec::new()),
        })
    }

    pub fn owner(&self) -> ActorId {
        self.owner
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn allows(&self, topic: Topic) -> bool {
        self.topics.contains(&topic)
    }

    fn check(&self, topic: Topic) -> Result<(), PubSubError> {
        if self.allows(topic) {
            Ok(())
        } else {
            Err(PubSubError::UnknownTopic {
                publisher: self.owner,
                topic,
            })
        }
    }

    /// Register `callback` for `topic` on behalf of `subscriber`.
    pub fn register(
        &self,
        topic: Topic,
        subscriber: ActorId,
        callback: Callback,
    ) -> Result<(), PubSubError> {
        self.check(topic)?;
        self.subscriptions.write().push(Subscription {
            topic,
            subscriber,
            callback,
        });
        Ok(())
    }

    /// Forward `topic` into `target`'s inbox.
    pub fn subscribe(&self, topic: Topic, target: &ActorRef) -> Result<(), PubSubError> {
        self.register(topic, target.id(), target.forwarder())
    }

    pub fn subscribe_all(&self, topics: &[Topic], target: &ActorRef) -> Result<(), PubSubError> {
        topics.iter().try_for_each(|t| self.subscribe(*t, target))
    }

    /// Actors subscribed to `topic`, in registration order.
    pub fn subscribers(&self, topic: Topic) -> Vec<ActorId> {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| s.subscriber)
            .collect()
    }

    /// Publish `value` on `topic` with `sender` as the apparent sender.
    pub fn publish(
        &self,
        topic: Topic,
        value: impl Into<Value>,
        sender: ActorId,
    ) -> Result<(), PubSubError> {
        self.check(topic)?;
        let message = TopicMessage::new(topic, value, sender);
        let callbacks: Vec<Callback> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| Arc::clone(&s.callback))
            .collect();
        trace!(
            publisher = %self.owner,
            topic = %message.external_topic(),
            value = %message.value,
            subscribers = callbacks.len(),
            "publish"
        );
        for callback in callbacks {
            callback(&message);
        }
        Ok(())
    }

    /// Publish as the owner. A topic outside the registered set is a wiring
    /// bug and is logged instead of returned.
    pub fn announce(&self, topic: Topic, value: impl Into<Value>) {
        if let Err(e) = self.publish(topic, value, self.owner) {
            error!("{}", e);
        }
    }
}
