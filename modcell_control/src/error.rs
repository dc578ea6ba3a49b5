//! Error types of the control core.

use std::path::PathBuf;

use modcell_common::config::ConfigError;
use modcell_common::io::image::IoError;
use modcell_common::io::registry::IoConfigError;
use thiserror::Error;

use crate::runtime::message::{ActorId, Topic};

/// Failure to deliver an event into an actor inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PostError {
    /// The bounded inbox is full; the event was dropped.
    #[error("inbox of {0} is full")]
    Overflow(ActorId),

    /// The actor has stopped.
    #[error("{0} is no longer running")]
    Closed(ActorId),
}

/// Misuse of a topic publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PubSubError {
    #[error("{publisher} does not publish topic {topic}")]
    UnknownTopic { publisher: ActorId, topic: Topic },
}

/// Failure while assembling a station.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Wiring(#[from] IoConfigError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    PubSub(#[from] PubSubError),

    #[error("cannot prepare storage directory {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
