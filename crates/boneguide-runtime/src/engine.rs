//! [`Engine`] – handle to the session coordinator.
//!
//! The coordinator is a single Tokio task that owns the [`TrackingSession`].
//! Every mutation arrives as a [`Command`] on its channel and is applied in
//! order; observers read published snapshots from a `watch` channel.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use boneguide_runtime::{EngineError, SceneHost};
//! # async fn demo(scene: Arc<dyn SceneHost>) -> Result<(), EngineError> {
//! use boneguide_runtime::{Engine, EngineConfig};
//!
//! let engine = Engine::connect(EngineConfig::with_server("http://10.0.0.5:8000"), scene)?;
//! engine.start_session().await?;
//! // ... the user lines the model up with the bone ...
//! engine.confirm_alignment().await?;
//! engine.stop_session().await?;
//! # Ok(()) }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use boneguide_geometry::{Mat4, position_in_front_of_camera};
use boneguide_overlay::load_and_validate;
use boneguide_protocol::{
    FrameEncoder, HttpPoseService, PngFrameEncoder, PoseService, RequestRecorder,
    build_tracking_request, timestamp_dir_name,
};
use boneguide_types::{Offsets, SessionPhase, UserError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::scene::SceneHost;
use crate::scheduler::{self, FirstResult, LoopContext, LoopExit, PoseUpdate};
use crate::session::{Trigger, TrackingSession, next_phase};

const COMMAND_QUEUE_DEPTH: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;
type FirstResultRx = oneshot::Receiver<Result<(), EngineError>>;

/// Messages understood by the coordinator.
pub(crate) enum Command {
    Start {
        reply: Reply<()>,
    },
    ConfirmAlignment {
        reply: Reply<FirstResultRx>,
    },
    TrackOnce {
        reply: Reply<Option<FirstResultRx>>,
    },
    Stop {
        reply: Reply<()>,
    },
    DismissError {
        reply: Reply<()>,
    },
    SetOffsets {
        offsets: Offsets,
        reply: oneshot::Sender<()>,
    },
    CameraMoved {
        camera: Mat4,
        reply: oneshot::Sender<()>,
    },
    ApplyPose {
        session_id: String,
        update: PoseUpdate,
        ack: oneshot::Sender<bool>,
    },
    LoopFailed {
        session_id: String,
        error: UserError,
        ack: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Handle
// ────────────────────────────────────────────────────────────────────────────

/// Cloneable handle to a running session coordinator.
#[derive(Clone)]
pub struct Engine {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<TrackingSession>,
    scene: Arc<dyn SceneHost>,
    encoder: Arc<dyn FrameEncoder>,
}

impl Engine {
    /// Builds an HTTP pose client from `config` and spawns the coordinator.
    pub fn connect(config: EngineConfig, scene: Arc<dyn SceneHost>) -> Result<Self, EngineError> {
        let service = HttpPoseService::new(&config.server_url, config.request_timeout)?;
        Ok(Self::spawn(config, Arc::new(service), scene))
    }

    /// Spawns the coordinator on the current Tokio runtime.
    pub fn spawn(
        config: EngineConfig,
        service: Arc<dyn PoseService>,
        scene: Arc<dyn SceneHost>,
    ) -> Self {
        Self::spawn_with_encoder(config, service, scene, Arc::new(PngFrameEncoder))
    }

    pub fn spawn_with_encoder(
        config: EngineConfig,
        service: Arc<dyn PoseService>,
        scene: Arc<dyn SceneHost>,
        encoder: Arc<dyn FrameEncoder>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let session = TrackingSession::new(config.offsets);
        let (state_tx, state_rx) = watch::channel(session.clone());
        let recorder = config.snapshot_dir.clone().map(RequestRecorder::new);

        let coordinator = Coordinator {
            config,
            service,
            scene: Arc::clone(&scene),
            encoder: Arc::clone(&encoder),
            recorder,
            session,
            state: state_tx,
            commands: tx.downgrade(),
            active: None,
        };
        tokio::spawn(coordinator.run(rx));

        Self {
            commands: tx,
            state: state_rx,
            scene,
            encoder,
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| EngineError::EngineStopped)?;
        rx.await.map_err(|_| EngineError::EngineStopped)
    }

    /// Creates a server session and attaches its model.  Any live session is
    /// superseded.
    pub async fn start_session(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Start { reply }).await?
    }

    /// Leaves alignment and waits for the initial pose lock.  In continuous
    /// mode tracking keeps running in the background afterwards.
    pub async fn confirm_alignment(&self) -> Result<(), EngineError> {
        let first = self
            .request(|reply| Command::ConfirmAlignment { reply })
            .await??;
        first.await.map_err(|_| EngineError::LoopVanished)?
    }

    /// Requests one pose refresh and waits for it.  With continuous tracking
    /// enabled this restarts a stopped loop and returns immediately.
    pub async fn track_once(&self) -> Result<(), EngineError> {
        match self.request(|reply| Command::TrackOnce { reply }).await?? {
            Some(first) => first.await.map_err(|_| EngineError::LoopVanished)?,
            None => Ok(()),
        }
    }

    /// Ends the session: stops tracking, removes the overlay and notifies the
    /// server.
    pub async fn stop_session(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Stop { reply }).await?
    }

    /// Clears the current error and returns to `NotStarted`.
    pub async fn dismiss_error(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::DismissError { reply }).await?
    }

    /// Replaces the offsets used for every subsequent pose.
    pub async fn set_offsets(&self, offsets: Offsets) -> Result<(), EngineError> {
        self.request(|reply| Command::SetOffsets { offsets, reply }).await
    }

    /// Feeds a new camera pose.  While aligning, the overlay is kept a fixed
    /// distance in front of the camera.
    pub async fn camera_moved(&self, camera: Mat4) -> Result<(), EngineError> {
        self.request(|reply| Command::CameraMoved { camera, reply }).await
    }

    /// Captures the current frame and writes it as a request snapshot under
    /// `root/<timestamp>/`.
    pub async fn save_snapshot(&self, root: &Path) -> Result<PathBuf, EngineError> {
        let scene = Arc::clone(&self.scene);
        let encoder = Arc::clone(&self.encoder);
        let session_id = self.snapshot().session_id.unwrap_or_default();
        let recorder = RequestRecorder::new(root);
        let dir = tokio::task::spawn_blocking(move || {
            let frame = scene.current_frame().ok_or(EngineError::NoFrame)?;
            let request = build_tracking_request(&frame, &session_id, false, encoder.as_ref())?;
            Ok::<_, EngineError>(recorder.record_as(&timestamp_dir_name(), &request)?)
        })
        .await??;
        info!(path = %dir.display(), "snapshot saved");
        Ok(dir)
    }

    /// Latest published session state.
    pub fn snapshot(&self) -> TrackingSession {
        self.state.borrow().clone()
    }

    /// A receiver that sees every published session state.
    pub fn subscribe(&self) -> watch::Receiver<TrackingSession> {
        self.state.clone()
    }

    /// Ends any live session and stops the coordinator.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Coordinator
// ────────────────────────────────────────────────────────────────────────────

struct ActiveLoop {
    session_id: String,
    continuous: bool,
    baseline: u32,
    token: CancellationToken,
    handle: JoinHandle<LoopExit>,
}

impl ActiveLoop {
    /// A single-shot loop whose pose has been applied, or any loop whose
    /// failure has been reported, is only winding down.
    fn is_busy(&self, session: &TrackingSession) -> bool {
        !self.handle.is_finished()
            && session.error.is_none()
            && (self.continuous || session.tracking_count <= self.baseline)
    }
}

struct Coordinator {
    config: EngineConfig,
    service: Arc<dyn PoseService>,
    scene: Arc<dyn SceneHost>,
    encoder: Arc<dyn FrameEncoder>,
    recorder: Option<RequestRecorder>,
    session: TrackingSession,
    state: watch::Sender<TrackingSession>,
    commands: mpsc::WeakSender<Command>,
    active: Option<ActiveLoop>,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Start { reply } => {
                    let _ = reply.send(self.start().await);
                }
                Command::ConfirmAlignment { reply } => {
                    let _ = reply.send(self.confirm_alignment());
                }
                Command::TrackOnce { reply } => {
                    let _ = reply.send(self.track_once());
                }
                Command::Stop { reply } => {
                    let _ = reply.send(self.stop().await);
                }
                Command::DismissError { reply } => {
                    let _ = reply.send(self.dismiss_error().await);
                }
                Command::SetOffsets { offsets, reply } => {
                    self.session.offsets = offsets;
                    self.publish();
                    let _ = reply.send(());
                }
                Command::CameraMoved { camera, reply } => {
                    self.camera_moved(camera);
                    let _ = reply.send(());
                }
                Command::ApplyPose {
                    session_id,
                    update,
                    ack,
                } => {
                    let _ = ack.send(self.apply_pose(&session_id, update));
                }
                Command::LoopFailed {
                    session_id,
                    error,
                    ack,
                } => {
                    self.loop_failed(&session_id, error);
                    let _ = ack.send(());
                }
                Command::Shutdown { reply } => {
                    self.close().await;
                    let _ = reply.send(());
                    debug!("session coordinator stopped");
                    return;
                }
            }
        }
        // Every handle is gone.
        self.close().await;
        debug!("session coordinator stopped");
    }

    fn publish(&self) {
        self.state.send_replace(self.session.clone());
    }

    fn check_transition(&self, trigger: Trigger) -> Result<(), EngineError> {
        match next_phase(self.session.phase, self.session.error.is_some(), trigger) {
            Some(_) => Ok(()),
            None => Err(EngineError::InvalidTransition {
                from: self.session.phase,
                trigger,
            }),
        }
    }

    async fn start(&mut self) -> Result<(), EngineError> {
        if !self.config.is_server_url_set() {
            let err = EngineError::Configuration(
                "set the pose server address before starting a session".into(),
            );
            self.session.error = Some(err.to_user_error("Server not configured"));
            self.publish();
            return Err(err);
        }
        self.check_transition(Trigger::Start)?;

        if let Some(previous) = self.session.session_id.clone() {
            info!(session_id = %previous, "superseding live session");
            if let Some(active) = self.active.take() {
                active.token.cancel();
            }
            self.scene.remove_overlay();
            let service = Arc::clone(&self.service);
            tokio::spawn(async move {
                if let Err(e) = service.end_session(&previous).await {
                    warn!(session_id = %previous, error = %e, "could not end superseded session");
                }
            });
        }

        self.session.begin()?;
        self.publish();

        let grant = match self.service.create_session().await {
            Ok(grant) => grant,
            Err(e) => {
                let err = EngineError::from(e);
                warn!(error = %err, "session start failed");
                self.session.start_failed(err.to_user_error("Could not start session"))?;
                self.publish();
                return Err(err);
            }
        };

        let model = match load_and_validate(&grant.model, &self.config.model_envelope) {
            Ok(model) => model,
            Err(e) => {
                let err = EngineError::from(e);
                warn!(session_id = %grant.session_id, error = %err, "model rejected");
                if let Err(e) = self.service.end_session(&grant.session_id).await {
                    warn!(
                        session_id = %grant.session_id,
                        error = %e,
                        "could not end rejected session"
                    );
                }
                self.session.start_failed(err.to_user_error("Invalid model"))?;
                self.publish();
                return Err(err);
            }
        };

        self.scene.attach_overlay(&model);
        info!(
            session_id = %grant.session_id,
            triangles = model.triangle_count(),
            "session created"
        );
        self.session.session_created(grant.session_id)?;
        self.publish();
        Ok(())
    }

    fn spawn_loop(
        &mut self,
        continuous: bool,
        first_result: Option<FirstResult>,
    ) -> Result<(), EngineError> {
        let session_id = self
            .session
            .session_id
            .clone()
            .ok_or(EngineError::InvalidTransition {
                from: self.session.phase,
                trigger: Trigger::PoseLocked,
            })?;
        if let Some(previous) = self.active.take() {
            previous.token.cancel();
        }
        let token = CancellationToken::new();
        let ctx = LoopContext {
            bound_session_id: session_id.clone(),
            continuous,
            baseline: self.session.tracking_count,
            max_frames: self.config.max_tracking_frames,
            token: token.clone(),
            state: self.state.subscribe(),
            commands: self.commands.clone(),
            service: Arc::clone(&self.service),
            scene: Arc::clone(&self.scene),
            encoder: Arc::clone(&self.encoder),
            recorder: self.recorder.clone(),
            first_result,
        };
        let baseline = ctx.baseline;
        debug!(%session_id, continuous, baseline, "spawning tracking loop");
        self.active = Some(ActiveLoop {
            session_id,
            continuous,
            baseline,
            token,
            handle: tokio::spawn(scheduler::run(ctx)),
        });
        Ok(())
    }

    fn confirm_alignment(&mut self) -> Result<FirstResultRx, EngineError> {
        self.session.confirm_alignment()?;
        self.publish();
        let (tx, rx) = oneshot::channel();
        self.spawn_loop(self.config.continuous_tracking, Some(tx))?;
        Ok(rx)
    }

    fn track_once(&mut self) -> Result<Option<FirstResultRx>, EngineError> {
        if self.session.phase != SessionPhase::Tracking {
            return Err(EngineError::InvalidTransition {
                from: self.session.phase,
                trigger: Trigger::PoseLocked,
            });
        }
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.is_busy(&self.session))
        {
            return Err(EngineError::TrackingActive);
        }
        if self.session.error.take().is_some() {
            self.publish();
        }
        if self.config.continuous_tracking {
            self.spawn_loop(true, None)?;
            Ok(None)
        } else {
            let (tx, rx) = oneshot::channel();
            self.spawn_loop(false, Some(tx))?;
            Ok(Some(rx))
        }
    }

    /// Cancels and awaits the active loop, removes the overlay and ends the
    /// server session.
    async fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
            match active.handle.await {
                Ok(exit) => debug!(session_id = %active.session_id, ?exit, "loop joined"),
                Err(e) => warn!(session_id = %active.session_id, error = %e, "loop task failed"),
            }
        }
        self.scene.remove_overlay();
        if let Some(id) = self.session.session_id.clone() {
            match self.service.end_session(&id).await {
                Ok(()) => info!(session_id = %id, "session ended"),
                Err(e) => warn!(session_id = %id, error = %e, "session end failed"),
            }
        }
    }

    async fn close(&mut self) {
        if self.active.is_some() || self.session.session_id.is_some() {
            self.teardown().await;
        }
        self.session = TrackingSession::new(self.session.offsets);
        self.publish();
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        self.check_transition(Trigger::Stop)?;
        self.teardown().await;
        self.session.stop()?;
        self.publish();
        Ok(())
    }

    async fn dismiss_error(&mut self) -> Result<(), EngineError> {
        self.check_transition(Trigger::DismissError)?;
        self.teardown().await;
        self.session.dismiss_error()?;
        self.publish();
        Ok(())
    }

    fn camera_moved(&mut self, camera: Mat4) {
        if self.session.phase != SessionPhase::Aligning {
            return;
        }
        let position = position_in_front_of_camera(&camera, self.config.alignment_distance);
        self.session.overlay_transform = Mat4::from_translation(position);
        self.session.camera_transform = camera;
        self.publish();
    }

    fn apply_pose(&mut self, session_id: &str, update: PoseUpdate) -> bool {
        if !self.session.is_current(session_id) {
            debug!(%session_id, "dropping pose for stale session");
            return false;
        }
        let locking = self.session.phase == SessionPhase::InitializingTracking;
        if self.session.record_pose(update.overlay, update.camera).is_err() {
            return false;
        }
        if locking {
            info!(%session_id, "initial pose locked");
        }
        debug!(
            %session_id,
            tracking_count = self.session.tracking_count,
            "pose applied"
        );
        self.publish();
        true
    }

    fn loop_failed(&mut self, session_id: &str, error: UserError) {
        if !self.session.is_current(session_id) {
            return;
        }
        if self.session.tracking_failed(error).is_ok() {
            self.publish();
        }
    }
}
