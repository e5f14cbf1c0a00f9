//! Pose-server wire protocol: protobuf bodies, frame encoding, the HTTP
//! transport and request snapshots.

pub mod client;
pub mod codec;
pub mod error;
pub mod messages;
pub mod snapshot;

pub use client::{
    HttpPoseService, PoseService, SessionGrant, normalize_base_url, validate_session_id,
};
pub use codec::{FrameEncoder, PngFrameEncoder, build_tracking_request, parse_pose};
pub use error::ProtocolError;
pub use messages::{CreateSessionResponse, TrackingRequest, TrackingResponse};
pub use snapshot::{RequestRecorder, read_snapshot_frame, timestamp_dir_name};
