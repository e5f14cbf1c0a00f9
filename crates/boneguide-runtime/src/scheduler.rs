//! The per-session tracking loop.
//!
//! Each loop is bound to one session id and one cancellation token.  It never
//! touches [`TrackingSession`] directly: finished poses are handed to the
//! coordinator as [`Command::ApplyPose`] and the loop waits for the verdict.

use std::sync::Arc;

use boneguide_geometry::{Mat4, apply_offset};
use boneguide_protocol::{
    FrameEncoder, PoseService, RequestRecorder, build_tracking_request, parse_pose,
};
use boneguide_types::SessionPhase;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Command;
use crate::error::EngineError;
use crate::scene::SceneHost;
use crate::session::TrackingSession;

/// Title shown to the user when a round trip fails.
pub(crate) const TRACKING_FAILED: &str = "Tracking failed";

/// A pose ready to be applied to the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseUpdate {
    /// World-space overlay pose, offsets included.
    pub overlay: Mat4,
    /// Camera pose the request was captured with.
    pub camera: Mat4,
}

/// Why a loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The current session is no longer the one this loop was bound to.
    Superseded,
    Cancelled,
    SingleShotDone,
    FrameCapReached,
    /// The coordinator is gone.
    Rejected,
    Failed,
}

pub(crate) type FirstResult = oneshot::Sender<Result<(), EngineError>>;

pub(crate) struct LoopContext {
    pub bound_session_id: String,
    pub continuous: bool,
    /// `tracking_count` when the loop was spawned.
    pub baseline: u32,
    pub max_frames: u32,
    pub token: CancellationToken,
    pub state: watch::Receiver<TrackingSession>,
    pub commands: mpsc::WeakSender<Command>,
    pub service: Arc<dyn PoseService>,
    pub scene: Arc<dyn SceneHost>,
    pub encoder: Arc<dyn FrameEncoder>,
    pub recorder: Option<RequestRecorder>,
    /// Receives the outcome of the first iteration.
    pub first_result: Option<FirstResult>,
}

enum Step {
    Applied,
    Cancelled,
    /// The coordinator no longer tracks the bound session.
    Stale,
    Rejected,
}

impl LoopExit {
    /// What a caller waiting on the first round trip hears when the loop ends
    /// before that round trip was reported.
    fn unreported_outcome(self, max_frames: u32) -> Result<(), EngineError> {
        match self {
            LoopExit::Superseded | LoopExit::Cancelled | LoopExit::SingleShotDone => Ok(()),
            LoopExit::FrameCapReached => Err(EngineError::FrameCapReached { max: max_frames }),
            LoopExit::Rejected => Err(EngineError::EngineStopped),
            LoopExit::Failed => Err(EngineError::LoopVanished),
        }
    }
}

/// Drives round trips until the loop is superseded, cancelled, capped or fails.
pub(crate) async fn run(mut ctx: LoopContext) -> LoopExit {
    let exit = loop {
        let snapshot = ctx.state.borrow().clone();
        if !snapshot.is_current(&ctx.bound_session_id) {
            break LoopExit::Superseded;
        }
        if ctx.token.is_cancelled() {
            break LoopExit::Cancelled;
        }
        if !ctx.continuous && snapshot.tracking_count > ctx.baseline {
            break LoopExit::SingleShotDone;
        }
        if ctx.max_frames > 0 && snapshot.tracking_count >= ctx.max_frames {
            info!(
                session_id = %ctx.bound_session_id,
                tracking_count = snapshot.tracking_count,
                "frame cap reached"
            );
            break LoopExit::FrameCapReached;
        }

        let optimize_for_speed = ctx.continuous && snapshot.phase == SessionPhase::Tracking;
        match iterate(&ctx, optimize_for_speed).await {
            Ok(Step::Applied) => {
                if let Some(tx) = ctx.first_result.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Ok(Step::Cancelled) => break LoopExit::Cancelled,
            Ok(Step::Stale) => break LoopExit::Superseded,
            Ok(Step::Rejected) => break LoopExit::Rejected,
            Err(e) => {
                if ctx.token.is_cancelled() {
                    break LoopExit::Cancelled;
                }
                warn!(session_id = %ctx.bound_session_id, error = %e, "tracking request failed");
                report_failure(&ctx, e.to_user_error(TRACKING_FAILED)).await;
                if let Some(tx) = ctx.first_result.take() {
                    let _ = tx.send(Err(e));
                }
                break LoopExit::Failed;
            }
        }
    };
    if let Some(tx) = ctx.first_result.take() {
        let _ = tx.send(exit.unreported_outcome(ctx.max_frames));
    }
    debug!(session_id = %ctx.bound_session_id, ?exit, "tracking loop finished");
    exit
}

async fn iterate(ctx: &LoopContext, optimize_for_speed: bool) -> Result<Step, EngineError> {
    let scene = Arc::clone(&ctx.scene);
    let encoder = Arc::clone(&ctx.encoder);
    let recorder = ctx.recorder.clone();
    let session_id = ctx.bound_session_id.clone();

    // Frame copy and PNG encoding are CPU-bound.
    let (camera, request) = tokio::task::spawn_blocking(move || {
        let frame = scene.current_frame().ok_or(EngineError::NoFrame)?;
        debug!(%session_id, frame_ts = frame.timestamp, "frame captured");
        let request =
            build_tracking_request(&frame, &session_id, optimize_for_speed, encoder.as_ref())?;
        if let Some(recorder) = recorder {
            if let Err(e) = recorder.record(&request) {
                warn!(%session_id, error = %e, "could not save request snapshot");
            }
        }
        Ok::<_, EngineError>((frame.camera_transform, request))
    })
    .await??;

    let response = tokio::select! {
        biased;
        _ = ctx.token.cancelled() => return Ok(Step::Cancelled),
        r = ctx.service.track(&ctx.bound_session_id, &request) => r?,
    };
    if ctx.token.is_cancelled() {
        return Ok(Step::Cancelled);
    }

    let pose = parse_pose(&response)?;
    let o = ctx.state.borrow().offsets;
    let overlay = apply_offset(&camera.mul(&pose), &camera, o.camera_distance, o.x, o.y, o.z);
    let update = PoseUpdate { overlay, camera };

    let Some(commands) = ctx.commands.upgrade() else {
        return Ok(Step::Rejected);
    };
    let (ack_tx, ack_rx) = oneshot::channel();
    let cmd = Command::ApplyPose {
        session_id: ctx.bound_session_id.clone(),
        update,
        ack: ack_tx,
    };
    tokio::select! {
        biased;
        _ = ctx.token.cancelled() => return Ok(Step::Cancelled),
        sent = commands.send(cmd) => {
            if sent.is_err() {
                return Ok(Step::Rejected);
            }
        }
    }
    drop(commands);

    let ack = tokio::select! {
        biased;
        _ = ctx.token.cancelled() => return Ok(Step::Cancelled),
        ack = ack_rx => ack,
    };
    Ok(match ack {
        Ok(true) => Step::Applied,
        Ok(false) => Step::Stale,
        Err(_) => Step::Rejected,
    })
}

async fn report_failure(ctx: &LoopContext, error: boneguide_types::UserError) {
    let Some(commands) = ctx.commands.upgrade() else {
        return;
    };
    let (ack_tx, ack_rx) = oneshot::channel();
    let cmd = Command::LoopFailed {
        session_id: ctx.bound_session_id.clone(),
        error,
        ack: ack_tx,
    };
    tokio::select! {
        biased;
        _ = ctx.token.cancelled() => return,
        sent = commands.send(cmd) => {
            if sent.is_err() {
                return;
            }
        }
    }
    drop(commands);
    tokio::select! {
        _ = ctx.token.cancelled() => {}
        _ = ack_rx => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_not_reported_as_an_error() {
        for exit in [LoopExit::Superseded, LoopExit::Cancelled, LoopExit::SingleShotDone] {
            assert!(exit.unreported_outcome(0).is_ok(), "{exit:?}");
        }
    }

    #[test]
    fn capped_loop_reports_the_limit() {
        assert!(matches!(
            LoopExit::FrameCapReached.unreported_outcome(4),
            Err(EngineError::FrameCapReached { max: 4 })
        ));
        assert!(matches!(
            LoopExit::Rejected.unreported_outcome(0),
            Err(EngineError::EngineStopped)
        ));
    }
}
