use std::fmt;
use std::num::NonZeroI32;

use serde::{Deserialize, Serialize};
use zvariant::Type;

/// Identity of a physical UVC device as reported by the backend.
///
/// Never empty: the wire uses the empty string to mean "no device".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend-assigned token addressing an open capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamHandle(NonZeroI32);

impl StreamHandle {
    /// Zero and negative values are what backends return when an open fails.
    pub fn from_raw(raw: i32) -> Option<Self> {
        if raw > 0 {
            NonZeroI32::new(raw).map(Self)
        } else {
            None
        }
    }

    pub fn get(self) -> i32 {
        self.0.get()
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const DEFAULT: Resolution = Resolution {
        width: 1280,
        height: 720,
    };
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Opaque reference to the surface frames are rendered into. Zero lets the
/// backend pick its own surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewTarget(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Attached,
    PermissionPending,
    Opening,
    Streaming,
    Shutdown,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Attached => "attached",
            SessionState::PermissionPending => "permission_pending",
            SessionState::Opening => "opening",
            SessionState::Streaming => "streaming",
            SessionState::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable copy of the session, published after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub armed: bool,
    pub attached_device: Option<DeviceId>,
    pub active_device: Option<DeviceId>,
    pub active_stream_handle: Option<StreamHandle>,
    pub permission_pending: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            armed: false,
            attached_device: None,
            active_device: None,
            active_stream_handle: None,
            permission_pending: false,
        }
    }
}

/// D-Bus projection of a snapshot. Empty strings and a zero handle stand
/// for "none".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Type)]
pub struct StatusReply {
    pub state: String,
    pub armed: bool,
    pub attached_device: String,
    pub active_device: String,
    pub stream_handle: i32,
    pub permission_pending: bool,
    pub device_permitted: bool,
}

impl StatusReply {
    pub fn from_snapshot(snapshot: &SessionSnapshot, device_permitted: bool) -> Self {
        Self {
            state: snapshot.state.as_str().to_string(),
            armed: snapshot.armed,
            attached_device: snapshot
                .attached_device
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_default(),
            active_device: snapshot
                .active_device
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_default(),
            stream_handle: snapshot.active_stream_handle.map(|h| h.get()).unwrap_or(0),
            permission_pending: snapshot.permission_pending,
            device_permitted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Status,
    Button,
    /// App permission was refused and the platform asks for an explanation.
    Rationale,
}

impl NoticeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NoticeKind::Status => "status",
            NoticeKind::Button => "button",
            NoticeKind::Rationale => "rationale",
        }
    }
}

/// Out-of-band notification for observers: camera status and button
/// payloads, or a permission rationale request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNotice {
    pub kind: NoticeKind,
    pub payload: String,
}
