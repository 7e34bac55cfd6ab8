use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::types::DeviceId;

/// Lifecycle events emitted by a device backend.
///
/// Arguments are carried as received; an empty string is meaningful for
/// several events (open failure, denial) and is interpreted by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Attached(String),
    PermissionResult(String),
    Opened(String),
    Closed(String),
    Detached(String),
    Ready(String),
    PreviewStarted(String),
    PreviewStopped(String),
    StatusReceived(String),
    ButtonEvent(String),
}

impl BackendEvent {
    pub const WIRE_NAMES: [&'static str; 10] = [
        "device_attached",
        "device_permission_result",
        "device_opened",
        "device_closed",
        "device_detached",
        "device_ready",
        "preview_started",
        "preview_stopped",
        "status_received",
        "button_event",
    ];

    pub fn from_wire(name: &str, args: &str) -> Result<Self, BackendError> {
        let args = args.to_string();
        let event = match name {
            "device_attached" => BackendEvent::Attached(args),
            "device_permission_result" => BackendEvent::PermissionResult(args),
            "device_opened" => BackendEvent::Opened(args),
            "device_closed" => BackendEvent::Closed(args),
            "device_detached" => BackendEvent::Detached(args),
            "device_ready" => BackendEvent::Ready(args),
            "preview_started" => BackendEvent::PreviewStarted(args),
            "preview_stopped" => BackendEvent::PreviewStopped(args),
            "status_received" => BackendEvent::StatusReceived(args),
            "button_event" => BackendEvent::ButtonEvent(args),
            other => return Err(BackendError::Protocol(format!("unknown event '{other}'"))),
        };
        Ok(event)
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            BackendEvent::Attached(_) => "device_attached",
            BackendEvent::PermissionResult(_) => "device_permission_result",
            BackendEvent::Opened(_) => "device_opened",
            BackendEvent::Closed(_) => "device_closed",
            BackendEvent::Detached(_) => "device_detached",
            BackendEvent::Ready(_) => "device_ready",
            BackendEvent::PreviewStarted(_) => "preview_started",
            BackendEvent::PreviewStopped(_) => "preview_stopped",
            BackendEvent::StatusReceived(_) => "status_received",
            BackendEvent::ButtonEvent(_) => "button_event",
        }
    }

    pub fn args(&self) -> &str {
        match self {
            BackendEvent::Attached(a)
            | BackendEvent::PermissionResult(a)
            | BackendEvent::Opened(a)
            | BackendEvent::Closed(a)
            | BackendEvent::Detached(a)
            | BackendEvent::Ready(a)
            | BackendEvent::PreviewStarted(a)
            | BackendEvent::PreviewStopped(a)
            | BackendEvent::StatusReceived(a)
            | BackendEvent::ButtonEvent(a) => a,
        }
    }

    /// Device named by the event, if the argument is non-empty.
    pub fn device(&self) -> Option<DeviceId> {
        DeviceId::parse(self.args())
    }
}

/// One line of backend output: `{"event": "device_attached", "args": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    pub event: String,
    #[serde(default)]
    pub args: String,
}

impl WireEvent {
    pub fn parse_line(line: &str) -> Result<BackendEvent, BackendError> {
        let wire: WireEvent = serde_json::from_str(line.trim())
            .map_err(|e| BackendError::Protocol(format!("bad event line: {e}")))?;
        BackendEvent::from_wire(&wire.event, &wire.args)
    }
}

impl From<&BackendEvent> for WireEvent {
    fn from(event: &BackendEvent) -> Self {
        Self {
            event: event.wire_name().to_string(),
            args: event.args().to_string(),
        }
    }
}
