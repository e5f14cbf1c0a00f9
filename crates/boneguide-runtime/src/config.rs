use std::path::PathBuf;
use std::time::Duration;

use boneguide_overlay::SizeEnvelope;
use boneguide_protocol::normalize_base_url;
use boneguide_types::Offsets;

/// Placeholder address shipped in fresh installs.  Treated as "not set".
pub const DEFAULT_SERVER_URL: &str = "http://1.1.1.1";

/// Tuning for one [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the pose server.
    pub server_url: String,
    /// Keep polling after the initial lock instead of waiting for
    /// [`Engine::track_once`](crate::Engine::track_once).
    pub continuous_tracking: bool,
    pub offsets: Offsets,
    /// Upper bound on every HTTP round trip.
    pub request_timeout: Duration,
    /// Stop the loop after this many round trips per session; `0` = no cap.
    pub max_tracking_frames: u32,
    /// Meters in front of the camera the overlay floats at while aligning.
    pub alignment_distance: f32,
    pub model_envelope: SizeEnvelope,
    /// When set, every tracking request is also written below this directory.
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            continuous_tracking: true,
            offsets: Offsets::default(),
            request_timeout: Duration::from_secs(30),
            max_tracking_frames: 0,
            alignment_distance: 0.3,
            model_envelope: SizeEnvelope::default(),
            snapshot_dir: None,
        }
    }
}

impl EngineConfig {
    /// Convenience constructor for a known server.
    pub fn with_server(url: impl Into<String>) -> Self {
        Self {
            server_url: url.into(),
            ..Self::default()
        }
    }

    /// `false` for an empty URL or the shipped placeholder.
    pub fn is_server_url_set(&self) -> bool {
        let url = normalize_base_url(&self.server_url);
        !url.is_empty() && url != DEFAULT_SERVER_URL
    }
}
