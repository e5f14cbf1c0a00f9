//! On-disk request snapshots for offline replay against the pose server.
//!
//! Layout of one snapshot directory:
//!
//! ```text
//! latest_track_request.bin   raw protobuf body
//! rgb/0.png                  colour frame
//! depth/0.png                16-bit depth, millimeters
//! cam_K.txt                  3x3 intrinsics, one row per line
//! camera_pose.txt            4x4 camera-to-world, one row per line
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use boneguide_geometry::Mat4;
use boneguide_types::Frame;
use chrono::Local;
use prost::Message;
use tracing::debug;

use crate::client::validate_session_id;
use crate::codec::{decode_depth, decode_rgb};
use crate::error::ProtocolError;
use crate::messages::TrackingRequest;

const REQUEST_FILE: &str = "latest_track_request.bin";
const RGB_FILE: &str = "rgb/0.png";
const DEPTH_FILE: &str = "depth/0.png";
const INTRINSICS_FILE: &str = "cam_K.txt";
const POSE_FILE: &str = "camera_pose.txt";

/// Directory name for an on-demand snapshot, e.g. `2026-03-01_14-05-09`.
pub fn timestamp_dir_name() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Writes tracking requests below a root directory.
#[derive(Debug, Clone)]
pub struct RequestRecorder {
    root: PathBuf,
}

impl RequestRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Records under `<root>/<session_id>/`, overwriting the previous frame.
    pub fn record(&self, request: &TrackingRequest) -> Result<PathBuf, ProtocolError> {
        self.record_as(&request.session_id, request)
    }

    /// Records under `<root>/<dir_name>/`.  `dir_name` must be a single
    /// path component.
    pub fn record_as(
        &self,
        dir_name: &str,
        request: &TrackingRequest,
    ) -> Result<PathBuf, ProtocolError> {
        validate_session_id(dir_name)?;
        let dir = self.root.join(dir_name);
        fs::create_dir_all(dir.join("rgb"))?;
        fs::create_dir_all(dir.join("depth"))?;

        fs::write(dir.join(REQUEST_FILE), request.encode_to_vec())?;
        fs::write(dir.join(RGB_FILE), &request.rgb_image)?;
        fs::write(dir.join(DEPTH_FILE), &request.depth_map)?;
        fs::write(dir.join(INTRINSICS_FILE), format_rows(&request.intrinsics, 3))?;
        fs::write(dir.join(POSE_FILE), format_rows(&request.transform, 4))?;

        debug!(path = %dir.display(), "request snapshot written");
        Ok(dir)
    }
}

fn format_rows(values: &[f32], width: usize) -> String {
    values
        .chunks(width)
        .map(|row| {
            row.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

fn parse_floats(path: &Path, expected: usize) -> Result<Vec<f32>, ProtocolError> {
    let text = fs::read_to_string(path)?;
    let values = text
        .split_whitespace()
        .map(|tok| {
            tok.parse::<f32>().map_err(|e| {
                ProtocolError::Snapshot(format!("{}: bad value {tok:?}: {e}", path.display()))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != expected {
        return Err(ProtocolError::Snapshot(format!(
            "{}: expected {expected} values, found {}",
            path.display(),
            values.len()
        )));
    }
    Ok(values)
}

/// Loads a snapshot directory back into a [`Frame`].
pub fn read_snapshot_frame(dir: &Path) -> Result<Frame, ProtocolError> {
    let k = parse_floats(&dir.join(INTRINSICS_FILE), 9)?;
    let pose = parse_floats(&dir.join(POSE_FILE), 16)?;
    let rgb = decode_rgb(&fs::read(dir.join(RGB_FILE))?)?;
    let depth = decode_depth(&fs::read(dir.join(DEPTH_FILE))?)?;

    let mut intrinsics = [0.0f32; 9];
    intrinsics.copy_from_slice(&k);
    Ok(Frame {
        timestamp: 0.0,
        rgb,
        depth: Some(depth),
        intrinsics,
        camera_transform: Mat4::from_row_major(&pose),
    })
}
