//! [`SnapshotScene`] – a [`SceneHost`] that replays a recorded request
//! snapshot as the camera feed and keeps the "rendered" overlay in memory.

use std::path::Path;
use std::sync::Mutex;

use boneguide_overlay::OverlayModel;
use boneguide_protocol::{ProtocolError, read_snapshot_frame};
use boneguide_runtime::SceneHost;
use boneguide_types::Frame;
use tracing::info;

/// Summary of the attached overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachedOverlay {
    pub triangles: usize,
    /// Bounding-box sides in meters.
    pub size: [f32; 3],
}

#[derive(Default)]
pub struct SnapshotScene {
    frame: Option<Frame>,
    overlay: Mutex<Option<AttachedOverlay>>,
}

impl SnapshotScene {
    /// A scene without a camera; tracking requests fail with "no frame".
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn open(dir: &Path) -> Result<Self, ProtocolError> {
        let frame = read_snapshot_frame(dir)?;
        info!(
            path = %dir.display(),
            width = frame.rgb.width,
            height = frame.rgb.height,
            "replaying snapshot as camera feed"
        );
        Ok(Self {
            frame: Some(frame),
            overlay: Mutex::new(None),
        })
    }

    pub fn has_camera(&self) -> bool {
        self.frame.is_some()
    }

    pub fn overlay(&self) -> Option<AttachedOverlay> {
        self.overlay.lock().ok().and_then(|o| *o)
    }
}

impl SceneHost for SnapshotScene {
    fn attach_overlay(&self, model: &OverlayModel) {
        let s = model.size();
        if let Ok(mut slot) = self.overlay.lock() {
            *slot = Some(AttachedOverlay {
                triangles: model.triangle_count(),
                size: [s.x, s.y, s.z],
            });
        }
    }

    fn remove_overlay(&self) {
        if let Ok(mut slot) = self.overlay.lock() {
            *slot = None;
        }
    }

    fn current_frame(&self) -> Option<Frame> {
        self.frame.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boneguide_geometry::{Mat4, Vec3};
    use boneguide_protocol::{PngFrameEncoder, RequestRecorder, build_tracking_request};
    use boneguide_types::{DepthMap, RgbImage};

    #[test]
    fn replays_recorded_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let frame = Frame {
            timestamp: 0.0,
            rgb: RgbImage {
                width: 1,
                height: 1,
                pixels: vec![9, 8, 7],
            },
            depth: Some(DepthMap {
                width: 1,
                height: 1,
                meters: vec![0.35],
            }),
            intrinsics: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            camera_transform: Mat4::from_translation(Vec3::new(0.0, 1.5, 0.0)),
        };
        let request = build_tracking_request(&frame, "s1", false, &PngFrameEncoder).unwrap();
        let dir = RequestRecorder::new(tmp.path()).record(&request).unwrap();

        let scene = SnapshotScene::open(&dir).unwrap();
        assert!(scene.has_camera());
        let replayed = scene.current_frame().unwrap();
        assert_eq!(replayed.rgb, frame.rgb);
        assert!((replayed.camera_transform.translation().y - 1.5).abs() < 1e-6);
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(SnapshotScene::open(&tmp.path().join("nope")).is_err());
    }

    #[test]
    fn empty_scene_has_no_frame_or_overlay() {
        let scene = SnapshotScene::empty();
        assert!(scene.current_frame().is_none());
        assert!(scene.overlay().is_none());
        scene.remove_overlay();
    }
}
