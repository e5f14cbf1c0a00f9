//! Session lifecycle: the data the coordinator owns and the transition table
//! that guards every change to it.

use std::fmt;

use boneguide_geometry::Mat4;
use boneguide_types::{Offsets, SessionPhase, UserError};

use crate::error::EngineError;

/// Events that move a session between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Start,
    SessionCreated,
    StartFailed,
    ConfirmAlignment,
    Stop,
    PoseLocked,
    TrackingFailed,
    DismissError,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trigger::Start => "start a session",
            Trigger::SessionCreated => "accept a new session",
            Trigger::StartFailed => "fail a session start",
            Trigger::ConfirmAlignment => "confirm alignment",
            Trigger::Stop => "stop the session",
            Trigger::PoseLocked => "lock a pose",
            Trigger::TrackingFailed => "fail tracking",
            Trigger::DismissError => "dismiss an error",
        })
    }
}

/// Where `trigger` leads from `from`, or `None` if it is not allowed there.
pub fn next_phase(from: SessionPhase, has_error: bool, trigger: Trigger) -> Option<SessionPhase> {
    use SessionPhase::*;
    match (trigger, from) {
        (Trigger::Start, NotStarted | Done | Aligning | InitializingTracking | Tracking) => {
            Some(Starting)
        }
        (Trigger::SessionCreated, Starting) => Some(Aligning),
        (Trigger::StartFailed, Starting) => Some(NotStarted),
        (Trigger::ConfirmAlignment, Aligning) => Some(InitializingTracking),
        (Trigger::ConfirmAlignment, InitializingTracking) if has_error => {
            Some(InitializingTracking)
        }
        (Trigger::Stop, Aligning | InitializingTracking | Tracking) => Some(Done),
        (Trigger::PoseLocked, InitializingTracking) => Some(Tracking),
        (Trigger::PoseLocked, Tracking) => Some(Tracking),
        (Trigger::TrackingFailed, InitializingTracking | Tracking) => Some(from),
        (Trigger::DismissError, _) if has_error => Some(NotStarted),
        _ => None,
    }
}

/// The single live tracking session.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSession {
    pub session_id: Option<String>,
    pub phase: SessionPhase,
    /// World-space overlay pose.
    pub overlay_transform: Mat4,
    /// Camera pose captured with the last successful request.
    pub camera_transform: Mat4,
    pub offsets: Offsets,
    /// Successful round trips since the session was created.
    pub tracking_count: u32,
    pub error: Option<UserError>,
}

impl TrackingSession {
    pub fn new(offsets: Offsets) -> Self {
        Self {
            session_id: None,
            phase: SessionPhase::NotStarted,
            overlay_transform: Mat4::identity(),
            camera_transform: Mat4::identity(),
            offsets,
            tracking_count: 0,
            error: None,
        }
    }

    fn fire(&mut self, trigger: Trigger) -> Result<SessionPhase, EngineError> {
        let to = next_phase(self.phase, self.error.is_some(), trigger).ok_or(
            EngineError::InvalidTransition {
                from: self.phase,
                trigger,
            },
        )?;
        self.phase = to;
        Ok(to)
    }

    /// Clears everything except the offsets.
    fn reset(&mut self) {
        *self = Self::new(self.offsets);
    }

    pub fn begin(&mut self) -> Result<(), EngineError> {
        self.fire(Trigger::Start)?;
        self.reset();
        self.phase = SessionPhase::Starting;
        Ok(())
    }

    pub fn session_created(&mut self, session_id: String) -> Result<(), EngineError> {
        self.fire(Trigger::SessionCreated)?;
        self.session_id = Some(session_id);
        Ok(())
    }

    pub fn start_failed(&mut self, error: UserError) -> Result<(), EngineError> {
        self.fire(Trigger::StartFailed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Also used to retry after a failed initial lock.
    pub fn confirm_alignment(&mut self) -> Result<(), EngineError> {
        self.fire(Trigger::ConfirmAlignment)?;
        self.error = None;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.fire(Trigger::Stop)?;
        self.reset();
        self.phase = SessionPhase::Done;
        Ok(())
    }

    /// Stores a freshly computed overlay pose and counts the round trip.
    pub fn record_pose(&mut self, overlay: Mat4, camera: Mat4) -> Result<(), EngineError> {
        self.fire(Trigger::PoseLocked)?;
        self.overlay_transform = overlay;
        self.camera_transform = camera;
        self.tracking_count += 1;
        Ok(())
    }

    pub fn tracking_failed(&mut self, error: UserError) -> Result<(), EngineError> {
        self.fire(Trigger::TrackingFailed)?;
        self.error = Some(error);
        Ok(())
    }

    pub fn dismiss_error(&mut self) -> Result<(), EngineError> {
        self.fire(Trigger::DismissError)?;
        self.reset();
        Ok(())
    }

    /// `true` if `id` names the current session.
    pub fn is_current(&self, id: &str) -> bool {
        self.session_id.as_deref() == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boneguide_geometry::Vec3;

    fn aligning() -> TrackingSession {
        let mut s = TrackingSession::new(Offsets::default());
        s.begin().unwrap();
        s.session_created("s1".into()).unwrap();
        s
    }

    #[test]
    fn happy_path_reaches_tracking() {
        let mut s = aligning();
        assert_eq!(s.phase, SessionPhase::Aligning);
        s.confirm_alignment().unwrap();
        assert_eq!(s.phase, SessionPhase::InitializingTracking);
        let pose = Mat4::from_translation(Vec3::new(0.0, 0.0, -0.3));
        s.record_pose(pose, Mat4::identity()).unwrap();
        assert_eq!(s.phase, SessionPhase::Tracking);
        assert_eq!(s.tracking_count, 1);
        assert_eq!(s.overlay_transform, pose);
    }

    #[test]
    fn cannot_confirm_before_session_exists() {
        let mut s = TrackingSession::new(Offsets::default());
        let err = s.confirm_alignment().unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                from: SessionPhase::NotStarted,
                trigger: Trigger::ConfirmAlignment
            }
        ));
    }

    #[test]
    fn failed_lock_can_be_retried() {
        let mut s = aligning();
        s.confirm_alignment().unwrap();
        // Without an error the lock is still pending; a second confirm is refused.
        assert!(s.confirm_alignment().is_err());
        s.tracking_failed(UserError::new("Tracking failed", "timeout")).unwrap();
        assert_eq!(s.phase, SessionPhase::InitializingTracking);
        s.confirm_alignment().unwrap();
        assert!(s.error.is_none());
    }

    #[test]
    fn start_failure_returns_to_not_started_with_error() {
        let mut s = TrackingSession::new(Offsets::default());
        s.begin().unwrap();
        s.start_failed(UserError::new("Start failed", "503")).unwrap();
        assert_eq!(s.phase, SessionPhase::NotStarted);
        assert!(s.error.is_some());
        // A new start clears the stale error.
        s.begin().unwrap();
        assert!(s.error.is_none());
    }

    #[test]
    fn restart_supersedes_live_session() {
        let mut s = aligning();
        s.confirm_alignment().unwrap();
        s.begin().unwrap();
        assert_eq!(s.phase, SessionPhase::Starting);
        assert_eq!(s.session_id, None);
        assert!(!s.is_current("s1"));
    }

    #[test]
    fn starting_twice_is_rejected() {
        let mut s = TrackingSession::new(Offsets::default());
        s.begin().unwrap();
        assert!(s.begin().is_err());
    }

    #[test]
    fn stop_resets_but_keeps_offsets() {
        let offsets = Offsets {
            camera_distance: 0.02,
            ..Default::default()
        };
        let mut s = TrackingSession::new(offsets);
        s.begin().unwrap();
        s.session_created("s1".into()).unwrap();
        s.stop().unwrap();
        assert_eq!(s.phase, SessionPhase::Done);
        assert_eq!(s.session_id, None);
        assert_eq!(s.offsets, offsets);
        assert!(TrackingSession::new(offsets).stop().is_err());
    }

    #[test]
    fn dismiss_requires_an_error() {
        let mut s = aligning();
        assert!(s.dismiss_error().is_err());
        s.confirm_alignment().unwrap();
        s.tracking_failed(UserError::new("t", "m")).unwrap();
        s.dismiss_error().unwrap();
        assert_eq!(s.phase, SessionPhase::NotStarted);
        assert!(s.error.is_none());
    }

    #[test]
    fn poses_are_refused_outside_tracking_phases() {
        let mut s = aligning();
        assert!(s.record_pose(Mat4::identity(), Mat4::identity()).is_err());
        assert_eq!(s.tracking_count, 0);
    }

    #[test]
    fn table_rejects_tracking_failure_while_aligning() {
        assert_eq!(
            next_phase(SessionPhase::Aligning, false, Trigger::TrackingFailed),
            None
        );
        assert_eq!(
            next_phase(SessionPhase::Tracking, true, Trigger::DismissError),
            Some(SessionPhase::NotStarted)
        );
    }
}
