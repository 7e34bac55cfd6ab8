use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::event::BackendEvent;
use crate::types::{DeviceId, PreviewTarget, StreamHandle};

/// Delivers backend events to whoever armed the backend.
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<dyn Fn(BackendEvent) -> bool + Send + Sync>,
}

impl EventSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(BackendEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Returns false once the receiving side has gone away.
    pub fn emit(&self, event: BackendEvent) -> bool {
        (self.deliver)(event)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// Per-frame render signal into the native capture engine.
pub trait FrameSignal: Send + Sync {
    fn issue(&self, handle: StreamHandle);
}

/// The native capture engine: enumeration, permission brokering, capture.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Arms the backend; lifecycle events are delivered to `sink` afterwards.
    async fn initialize(&self, sink: EventSink) -> Result<(), BackendError>;
    async fn has_device_permission(&self, device: &DeviceId) -> Result<bool, BackendError>;
    /// Resolution arrives later as `BackendEvent::PermissionResult`.
    async fn request_device_permission(&self, device: &DeviceId) -> Result<(), BackendError>;
    /// Returns the raw stream handle; zero or negative means the open failed.
    async fn open_device(
        &self,
        device: &DeviceId,
        width: u32,
        height: u32,
    ) -> Result<i32, BackendError>;
    async fn close_device(&self, device: &DeviceId) -> Result<(), BackendError>;
    async fn set_preview_target(
        &self,
        device: &DeviceId,
        target: PreviewTarget,
        width: u32,
        height: u32,
    ) -> Result<(), BackendError>;
    async fn get_supported_resolutions(&self, device: &DeviceId) -> Result<String, BackendError>;
    fn frame_signal_entrypoint(&self) -> Arc<dyn FrameSignal>;
}
