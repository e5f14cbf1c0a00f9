use boneguide_overlay::ValidationError;
use boneguide_protocol::ProtocolError;
use boneguide_types::{SessionPhase, UserError};
use thiserror::Error;

use crate::session::Trigger;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Server URL missing or still the placeholder.
    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The scene had no camera frame to send.
    #[error("no camera frame is available")]
    NoFrame,

    #[error("cannot {trigger} while {from}")]
    InvalidTransition { from: SessionPhase, trigger: Trigger },

    /// A continuous loop is already polling; a manual refresh would race it.
    #[error("continuous tracking is already running")]
    TrackingActive,

    /// `max_tracking_frames` round trips were already made for this session.
    #[error("frame limit of {max} tracking requests reached")]
    FrameCapReached { max: u32 },

    /// A tracking loop ended without reporting its first round trip.
    #[error("tracking loop ended without a result")]
    LoopVanished,

    /// The coordinator task is gone.
    #[error("engine has shut down")]
    EngineStopped,

    /// A blocking capture or encode job panicked.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// Wraps the error for display with a context-specific title.
    pub fn to_user_error(&self, title: &str) -> UserError {
        UserError::new(title, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_keep_their_message() {
        let err: EngineError = ProtocolError::ServerError {
            status_code: 500,
            body: "boom".into(),
        }
        .into();
        let user = err.to_user_error("Tracking failed");
        assert_eq!(user.title, "Tracking failed");
        assert_eq!(user.message, "server responded with status 500: boom");
    }

    #[test]
    fn frame_cap_names_the_limit() {
        let user = EngineError::FrameCapReached { max: 5 }.to_user_error("Tracking stopped");
        assert_eq!(user.message, "frame limit of 5 tracking requests reached");
    }

    #[test]
    fn invalid_transition_names_phase_and_trigger() {
        let err = EngineError::InvalidTransition {
            from: SessionPhase::NotStarted,
            trigger: Trigger::ConfirmAlignment,
        };
        assert_eq!(err.to_string(), "cannot confirm alignment while not started");
    }
}
