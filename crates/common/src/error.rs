use thiserror::Error;

use crate::types::DeviceId;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend command failed: {0}")]
    Command(String),
    #[error("backend protocol error: {0}")]
    Protocol(String),
    #[error("backend not initialized")]
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope {
    App,
    Device,
}

impl std::fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionScope::App => f.write_str("app"),
            PermissionScope::Device => f.write_str("device"),
        }
    }
}

/// Failures the session manager absorbs. None of them abort the manager;
/// they are logged and the session falls back to a defined state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{scope} permission denied{}", device_suffix(.device))]
    PermissionDenied {
        scope: PermissionScope,
        device: Option<DeviceId>,
        show_rationale: bool,
    },
    #[error("{scope} permission request timed out{}", device_suffix(.device))]
    PermissionTimeout {
        scope: PermissionScope,
        device: Option<DeviceId>,
    },
    #[error("failed to open device {device}: {reason}")]
    OpenFailure { device: DeviceId, reason: String },
    #[error("ignored stale {event} for '{device}'")]
    StaleEventIgnored { event: &'static str, device: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

fn device_suffix(device: &Option<DeviceId>) -> String {
    match device {
        Some(d) => format!(" for {d}"),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
