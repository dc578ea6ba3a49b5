//! Active-object runtime.
//!
//! - [`message`] - events, topic messages and actor identities
//! - [`active`] - actor tasks with bounded inboxes
//! - [`pubsub`] - topic publishers with per-topic subscriber lists
//! - [`hsm`] - hierarchical state machine engine
//! - [`timer`] - one-shot monitoring timers
//! - [`report`] - error and message code reporting
//! - [`recorder`] - topic capture for tests and tooling

pub mod active;
pub mod hsm;
pub mod message;
pub mod pubsub;
pub mod recorder;
pub mod report;
pub mod timer;
