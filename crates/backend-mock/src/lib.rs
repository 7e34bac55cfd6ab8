use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uvcd_common::authority::PermissionAuthority;
use uvcd_common::backend::{DeviceBackend, EventSink, FrameSignal};
use uvcd_common::error::BackendError;
use uvcd_common::event::BackendEvent;
use uvcd_common::types::{DeviceId, PreviewTarget, StreamHandle};

pub const SAMPLE_RESOLUTIONS: &str =
    r#"{"formats":[{"type":6,"default":1,"size":["1280x720","640x480"]}]}"#;

/// Every call the manager made, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Initialize,
    HasPermission(String),
    RequestPermission(String),
    Open {
        device: String,
        width: u32,
        height: u32,
    },
    Close(String),
    SetPreview {
        device: String,
        target: u64,
        width: u32,
        height: u32,
    },
    SupportedResolutions(String),
}

struct MockState {
    calls: Vec<BackendCall>,
    sink: Option<EventSink>,
    permitted: HashSet<String>,
    next_handle: i32,
    open_override: Option<i32>,
    auto_grant: bool,
    auto_ready: bool,
    fail_initialize: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            sink: None,
            permitted: HashSet::new(),
            next_handle: 1,
            open_override: None,
            auto_grant: false,
            auto_ready: false,
            fail_initialize: false,
        }
    }
}

#[derive(Default)]
pub struct MockFrames {
    count: AtomicU64,
    last_handle: AtomicI32,
}

impl FrameSignal for MockFrames {
    fn issue(&self, handle: StreamHandle) {
        self.last_handle.store(handle.get(), Ordering::SeqCst);
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    frames: Arc<MockFrames>,
}

impl MockBackend {
    /// Grants every permission request and reports readiness right after
    /// each open, the way a cooperative capture engine would.
    pub fn new_cooperative() -> Self {
        let backend = Self::default();
        {
            let mut s = backend.state.lock().unwrap();
            s.auto_grant = true;
            s.auto_ready = true;
        }
        backend
    }

    /// Forces every subsequent open to return `raw` (0 simulates a failure).
    pub fn set_open_result(&self, raw: i32) {
        self.state.lock().unwrap().open_override = Some(raw);
    }

    pub fn fail_initialize(&self) {
        self.state.lock().unwrap().fail_initialize = true;
    }

    /// Lets `initialize` succeed again after `fail_initialize`.
    pub fn restore_initialize(&self) {
        self.state.lock().unwrap().fail_initialize = false;
    }

    pub fn grant(&self, device: &str) {
        self.state.lock().unwrap().permitted.insert(device.to_string());
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().unwrap().sink.is_some()
    }

    /// Delivers an event through the sink handed over in `initialize`.
    pub fn emit(&self, event: BackendEvent) -> bool {
        let sink = self.state.lock().unwrap().sink.clone();
        match sink {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.count.load(Ordering::SeqCst)
    }

    pub fn last_frame_handle(&self) -> i32 {
        self.frames.last_handle.load(Ordering::SeqCst)
    }

    fn record(&self, call: BackendCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl DeviceBackend for MockBackend {
    async fn initialize(&self, sink: EventSink) -> Result<(), BackendError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(BackendCall::Initialize);
        if s.fail_initialize {
            return Err(BackendError::Command("initialize refused".into()));
        }
        s.sink = Some(sink);
        Ok(())
    }

    async fn has_device_permission(&self, device: &DeviceId) -> Result<bool, BackendError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(BackendCall::HasPermission(device.to_string()));
        Ok(s.permitted.contains(device.as_str()))
    }

    async fn request_device_permission(&self, device: &DeviceId) -> Result<(), BackendError> {
        let grant = {
            let mut s = self.state.lock().unwrap();
            s.calls.push(BackendCall::RequestPermission(device.to_string()));
            if s.auto_grant {
                s.permitted.insert(device.to_string());
            }
            s.auto_grant
        };
        if grant {
            self.emit(BackendEvent::PermissionResult(device.to_string()));
        }
        Ok(())
    }

    async fn open_device(
        &self,
        device: &DeviceId,
        width: u32,
        height: u32,
    ) -> Result<i32, BackendError> {
        let (raw, auto_ready) = {
            let mut s = self.state.lock().unwrap();
            s.calls.push(BackendCall::Open {
                device: device.to_string(),
                width,
                height,
            });
            let raw = match s.open_override {
                Some(raw) => raw,
                None => {
                    let raw = s.next_handle;
                    s.next_handle += 1;
                    raw
                }
            };
            (raw, s.auto_ready)
        };
        if auto_ready {
            let ready = if raw > 0 { device.to_string() } else { String::new() };
            self.emit(BackendEvent::Ready(ready));
        }
        Ok(raw)
    }

    async fn close_device(&self, device: &DeviceId) -> Result<(), BackendError> {
        self.record(BackendCall::Close(device.to_string()));
        Ok(())
    }

    async fn set_preview_target(
        &self,
        device: &DeviceId,
        target: PreviewTarget,
        width: u32,
        height: u32,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::SetPreview {
            device: device.to_string(),
            target: target.0,
            width,
            height,
        });
        Ok(())
    }

    async fn get_supported_resolutions(&self, device: &DeviceId) -> Result<String, BackendError> {
        self.record(BackendCall::SupportedResolutions(device.to_string()));
        Ok(SAMPLE_RESOLUTIONS.to_string())
    }

    fn frame_signal_entrypoint(&self) -> Arc<dyn FrameSignal> {
        self.frames.clone()
    }
}

/// App-level permission authority with a configurable platform version.
#[derive(Clone)]
pub struct MockAuthority {
    version: u32,
    granted: Arc<AtomicBool>,
    grant_on_request: Arc<AtomicBool>,
    rationale: Arc<AtomicBool>,
    requests: Arc<AtomicU32>,
}

impl MockAuthority {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            granted: Arc::new(AtomicBool::new(false)),
            grant_on_request: Arc::new(AtomicBool::new(false)),
            rationale: Arc::new(AtomicBool::new(false)),
            requests: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn granted(version: u32) -> Self {
        let authority = Self::new(version);
        authority.set_granted(true);
        authority
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    pub fn grant_on_request(&self, grant: bool) {
        self.grant_on_request.store(grant, Ordering::SeqCst);
    }

    pub fn set_rationale(&self, show: bool) {
        self.rationale.store(show, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionAuthority for MockAuthority {
    fn platform_version(&self) -> u32 {
        self.version
    }

    async fn has_app_permission(&self, _name: &str) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    async fn request_app_permission(&self, _name: &str) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.grant_on_request.load(Ordering::SeqCst) {
            self.granted.store(true, Ordering::SeqCst);
        }
    }

    async fn should_show_rationale(&self, _name: &str) -> bool {
        self.rationale.load(Ordering::SeqCst)
    }
}
