//! Configuration Vault – reads/writes `~/.boneguide/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use boneguide_runtime::{DEFAULT_SERVER_URL, EngineConfig};
use boneguide_types::Offsets;
use serde::{Deserialize, Serialize};

/// Persisted user configuration stored in `~/.boneguide/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the pose server.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Keep polling after the initial pose lock.
    #[serde(default = "default_continuous")]
    pub continuous_tracking: bool,

    /// Write every tracking request to the snapshot directory.
    #[serde(default)]
    pub save_requests: bool,

    /// Where snapshots go.  Defaults to `~/.boneguide/snapshots`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<PathBuf>,

    /// Recorded snapshot replayed as the camera feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_dir: Option<PathBuf>,

    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// `0` = unlimited.
    #[serde(default)]
    pub max_tracking_frames: u32,

    #[serde(default)]
    pub offsets: Offsets,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}
fn default_continuous() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            continuous_tracking: default_continuous(),
            save_requests: false,
            snapshot_dir: None,
            replay_dir: None,
            request_timeout_secs: default_timeout_secs(),
            max_tracking_frames: 0,
            offsets: Offsets::default(),
        }
    }
}

impl Config {
    /// Snapshot root, falling back to `<home>/.boneguide/snapshots`.
    pub fn snapshot_root(&self, home: &Path) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(|| home.join(".boneguide").join("snapshots"))
    }

    pub fn engine_config(&self, home: &Path) -> EngineConfig {
        EngineConfig {
            server_url: self.server_url.clone(),
            continuous_tracking: self.continuous_tracking,
            offsets: self.offsets,
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            max_tracking_frames: self.max_tracking_frames,
            snapshot_dir: self.save_requests.then(|| self.snapshot_root(home)),
            ..EngineConfig::default()
        }
    }
}

pub fn home_dir() -> PathBuf {
    PathBuf::from(
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Return the path to `~/.boneguide/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &Path) -> PathBuf {
    home.join(".boneguide").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply `BONEGUIDE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `BONEGUIDE_SERVER_URL` | `server_url` |
/// | `BONEGUIDE_CONTINUOUS` | `continuous_tracking` |
/// | `BONEGUIDE_SNAPSHOT_DIR` | `snapshot_dir` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("BONEGUIDE_SERVER_URL") {
        cfg.server_url = v;
    }
    if let Ok(v) = std::env::var("BONEGUIDE_CONTINUOUS")
        && let Some(flag) = parse_flag(&v)
    {
        cfg.continuous_tracking = flag;
    }
    if let Ok(v) = std::env::var("BONEGUIDE_SNAPSHOT_DIR")
        && !v.trim().is_empty()
    {
        cfg.snapshot_dir = Some(PathBuf::from(v));
    }
}

/// Save the config to disk, creating `~/.boneguide/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
