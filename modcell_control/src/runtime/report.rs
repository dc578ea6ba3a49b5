//! Error and message code reporting on the station surface.

use std::sync::Arc;

use modcell_common::station::codes::{ErrorCode, MessageCode};
use tracing::{error, info, warn};

use super::message::{ActorId, Topic};
use super::pubsub::Publisher;

/// Publishes code/description pairs on the station publisher.
#[derive(Clone)]
pub struct Reporter {
    surface: Arc<Publisher>,
    sender: ActorId,
}

impl Reporter {
    pub fn new(surface: Arc<Publisher>, sender: ActorId) -> Self {
        Self { surface, sender }
    }

    /// Same surface, different apparent sender.
    pub fn for_actor(&self, sender: ActorId) -> Self {
        Self {
            surface: Arc::clone(&self.surface),
            sender,
        }
    }

    pub fn error(&self, code: ErrorCode) {
        if code != ErrorCode::NoError {
            warn!(actor = %self.sender, "{}: {}", code, code.description());
        }
        self.pair(
            Topic::StationErrorCode,
            Topic::StationErrorDescription,
            code.hex(),
            code.description(),
        );
    }

    pub fn message(&self, code: MessageCode) {
        info!(actor = %self.sender, "{}: {}", code, code.description());
        self.pair(
            Topic::StationMessageCode,
            Topic::StationMessageDescription,
            code.hex(),
            code.description(),
        );
    }

    /// Publish `NoError` and `NoMessage`.
    pub fn clear(&self) {
        self.error(ErrorCode::NoError);
        self.message(MessageCode::NoMessage);
    }

    fn pair(&self, code_topic: Topic, text_topic: Topic, code: String, text: &str) {
        let result = self
            .surface
            .publish(code_topic, code, self.sender)
            .and_then(|_| self.surface.publish(text_topic, text, self.sender));
        if let Err(e) = result {
            error!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::recorder::Recorder;

    #[test]
    fn error_publishes_code_and_description() {
        let surface = Publisher::new(
            ActorId::Station,
            &[
                Topic::StationErrorCode,
                Topic::StationErrorDescription,
                Topic::StationMessageCode,
                Topic::StationMessageDescription,
            ],
        );
        let recorder = Recorder::new();
        recorder.attach(&surface).unwrap();
        let reporter = Reporter::new(surface, ActorId::Station).for_actor(ActorId::Carriage);
        reporter.error(ErrorCode::CarriageMovingToRackTimeout);
        reporter.message(MessageCode::CancelJob);
        assert_eq!(
            recorder.texts(ActorId::Carriage, Topic::StationErrorCode),
            ["0x0101"]
        );
        assert_eq!(
            recorder.texts(ActorId::Carriage, Topic::StationErrorDescription),
            [ErrorCode::CarriageMovingToRackTimeout.description()]
        );
        assert_eq!(
            recorder.texts(ActorId::Carriage, Topic::StationMessageCode),
            ["0x1001"]
        );
    }
}
