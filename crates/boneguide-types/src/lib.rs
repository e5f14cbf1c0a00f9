//! Shared vocabulary for the BoneGuide workspace: session phases, user-facing
//! errors, tuning offsets and the camera frames handed to the engine.

use std::fmt;

use boneguide_geometry::Mat4;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No session has been requested yet (or the last error was dismissed).
    #[default]
    NotStarted,
    /// Waiting for the server to create the session and send the model.
    Starting,
    /// The overlay follows the camera; the user lines the bone up with it.
    Aligning,
    /// The first pose-lock request is in flight.
    InitializingTracking,
    /// Pose updates are being applied to the overlay.
    Tracking,
    /// The session was stopped and its resources released.
    Done,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionPhase::NotStarted => "not started",
            SessionPhase::Starting => "starting",
            SessionPhase::Aligning => "aligning",
            SessionPhase::InitializingTracking => "initializing tracking",
            SessionPhase::Tracking => "tracking",
            SessionPhase::Done => "done",
        };
        f.write_str(label)
    }
}

/// Manual corrections applied on top of every pose returned by the server.
///
/// `camera_distance` moves the overlay along the camera's forward vector;
/// `x`, `y` and `z` are world-space nudges.  All values are meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Offsets {
    #[serde(default)]
    pub camera_distance: f32,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

/// An error as shown to the user: a short title and a longer explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserError {
    pub title: String,
    pub message: String,
}

impl UserError {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

/// Single-channel depth plane, in meters, row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    pub width: u32,
    pub height: u32,
    pub meters: Vec<f32>,
}

/// Packed 8-bit RGB image, row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// One frame from the device camera.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Capture time in seconds, as reported by the camera.
    pub timestamp: f64,
    pub rgb: RgbImage,
    /// Absent on devices or frames without depth.
    pub depth: Option<DepthMap>,
    /// 3x3 pinhole intrinsics, row-major (`fx 0 cx / 0 fy cy / 0 0 1`).
    pub intrinsics: [f32; 9],
    /// Camera-to-world transform.
    pub camera_transform: Mat4,
}
