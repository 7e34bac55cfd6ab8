use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{PreviewTarget, Resolution};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/uvcd/config.toml";
pub const CONFIG_ENV: &str = "UVCD_CONFIG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityKind {
    /// No app-level permission model.
    #[default]
    None,
    Polkit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionConfig {
    #[serde(default)]
    pub authority: AuthorityKind,
    /// Upper bound on waiting for a permission request to resolve.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_app_permission")]
    pub app_permission: String,
    /// Below this version there is no runtime permission check at all.
    #[serde(default = "default_runtime_permissions_since")]
    pub runtime_permissions_since: u32,
    /// From this version on, camera access needs the app permission.
    #[serde(default = "default_camera_permission_since")]
    pub camera_permission_since: u32,
}

impl PermissionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn requires_app_permission(&self, platform_version: u32) -> bool {
        platform_version >= self.camera_permission_since
    }

    pub fn has_runtime_permissions(&self, platform_version: u32) -> bool {
        platform_version >= self.runtime_permissions_since
    }
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            authority: AuthorityKind::None,
            timeout_ms: default_timeout_ms(),
            app_permission: default_app_permission(),
            runtime_permissions_since: default_runtime_permissions_since(),
            camera_permission_since: default_camera_permission_since(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default)]
    pub preview_target: u64,
}

impl StreamConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn preview_target(&self) -> PreviewTarget {
        PreviewTarget(self.preview_target)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            frame_interval_ms: default_frame_interval_ms(),
            preview_target: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_helper")]
    pub helper: PathBuf,
    /// Name the backend addresses its callbacks to.
    #[serde(default = "default_callback_target")]
    pub callback_target: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            helper: default_helper(),
            callback_target: default_callback_target(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub permission: PermissionConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

impl SessionConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}

pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Loads the config file, falling back to defaults when it is missing or
/// unreadable.
pub fn load_config(path: &Path) -> SessionConfig {
    match SessionConfig::load_from(path) {
        Ok(cfg) => cfg,
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            SessionConfig::default()
        }
        Err(e) => {
            tracing::warn!(target: "uvcd", path = %path.display(), error = %e, "using default config");
            SessionConfig::default()
        }
    }
}

fn default_timeout_ms() -> u64 {
    500
}
fn default_app_permission() -> String {
    "org.uvcd.camera".to_string()
}
fn default_runtime_permissions_since() -> u32 {
    23
}
fn default_camera_permission_since() -> u32 {
    28
}
fn default_width() -> u32 {
    Resolution::DEFAULT.width
}
fn default_height() -> u32 {
    Resolution::DEFAULT.height
}
fn default_frame_interval_ms() -> u64 {
    16
}
fn default_helper() -> PathBuf {
    PathBuf::from("uvc-helper")
}
fn default_callback_target() -> String {
    crate::APP_ID.to_string()
}
