//! The device session state machine.
//!
//! One camera at a time moves through attach, device permission, open and
//! streaming. Every failure along the way is absorbed here: it is logged as a
//! [`SessionError`] and the session falls back to a state from which the next
//! attach or resume can retry.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uvcd_common::authority::PermissionAuthority;
use uvcd_common::backend::{DeviceBackend, EventSink};
use uvcd_common::config::SessionConfig;
use uvcd_common::error::{PermissionScope, SessionError};
use uvcd_common::event::BackendEvent;
use uvcd_common::types::{
    DeviceId, DeviceNotice, NoticeKind, SessionSnapshot, SessionState, StreamHandle,
};

use crate::gate::{PendingKind, PermissionGate};
use crate::handle::{Inbox, ManagerCommand, ManagerInput, StatusReport};
use crate::pump::FramePump;

const NOTICE_CAPACITY: usize = 64;

/// Called each time a device permission request expires without an answer.
/// `consecutive` resets once a device opens.
pub trait PermissionTimeoutHook: Send + Sync {
    fn on_timeout(&self, device: &DeviceId, consecutive: u32);
}

/// Default hook: the timeout is logged and nothing else happens.
pub struct IgnoreTimeouts;

impl PermissionTimeoutHook for IgnoreTimeouts {
    fn on_timeout(&self, _device: &DeviceId, _consecutive: u32) {}
}

#[derive(Debug, Clone)]
struct StreamSlot {
    device: DeviceId,
    handle: StreamHandle,
}

pub struct SessionManager {
    backend: Arc<dyn DeviceBackend>,
    authority: Arc<dyn PermissionAuthority>,
    config: SessionConfig,
    sink: EventSink,
    armed: bool,
    terminated: bool,
    attached: Option<DeviceId>,
    /// Open issued, `device_ready` not yet received.
    opening: Option<StreamSlot>,
    active: Option<StreamSlot>,
    gate: PermissionGate,
    pump: Option<FramePump>,
    consecutive_timeouts: u32,
    timeout_hook: Box<dyn PermissionTimeoutHook>,
    snapshots: watch::Sender<SessionSnapshot>,
    notices: broadcast::Sender<DeviceNotice>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        authority: Arc<dyn PermissionAuthority>,
        config: SessionConfig,
        sink: EventSink,
    ) -> Self {
        let gate = PermissionGate::new(config.permission.timeout());
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            backend,
            authority,
            config,
            sink,
            armed: false,
            terminated: false,
            attached: None,
            opening: None,
            active: None,
            gate,
            pump: None,
            consecutive_timeouts: 0,
            timeout_hook: Box::new(IgnoreTimeouts),
            snapshots,
            notices,
        }
    }

    pub fn with_timeout_hook(mut self, hook: impl PermissionTimeoutHook + 'static) -> Self {
        self.timeout_hook = Box::new(hook);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<DeviceNotice> {
        self.notices.subscribe()
    }

    pub fn state(&self) -> SessionState {
        if self.terminated {
            SessionState::Shutdown
        } else if self.active.is_some() {
            SessionState::Streaming
        } else if self.opening.is_some() {
            SessionState::Opening
        } else if matches!(self.gate.kind(), Some(PendingKind::Device(_))) {
            SessionState::PermissionPending
        } else if self.attached.is_some() {
            SessionState::Attached
        } else {
            SessionState::Idle
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            armed: self.armed,
            attached_device: self.attached.clone(),
            active_device: self.active.as_ref().map(|s| s.device.clone()),
            active_stream_handle: self.active.as_ref().map(|s| s.handle),
            permission_pending: self.gate.is_pending(),
        }
    }

    pub fn permission_deadline(&self) -> Option<Instant> {
        self.gate.deadline()
    }

    pub fn is_pumping(&self) -> bool {
        self.pump.is_some()
    }

    /// Checks the app-level permission and arms the backend, or requests the
    /// permission and waits for focus to return.
    pub async fn start(&mut self) {
        if self.terminated || self.armed {
            return;
        }
        let version = self.authority.platform_version();
        if !self.config.permission.requires_app_permission(version) {
            self.arm_backend().await;
        } else if self.app_permission_granted().await {
            self.arm_backend().await;
        } else {
            let name = self.config.permission.app_permission.clone();
            match self.gate.arm(PendingKind::App, Instant::now()) {
                Ok(_) => {
                    info!(target: "uvcd", event = "app_permission_requested", permission = %name);
                    self.authority.request_app_permission(&name).await;
                }
                Err(existing) => {
                    debug!(target: "uvcd", ?existing, "permission request already outstanding");
                }
            }
        }
        self.publish();
    }

    pub async fn handle_event(&mut self, event: BackendEvent) {
        if self.terminated {
            debug!(target: "uvcd", event = event.wire_name(), "ignoring event after shutdown");
            return;
        }
        debug!(target: "uvcd", event = event.wire_name(), args = event.args(), "backend event");
        match event {
            BackendEvent::Attached(args) => self.on_attached(&args).await,
            BackendEvent::PermissionResult(args) => self.on_permission_result(&args).await,
            BackendEvent::Opened(args) => {
                info!(target: "uvcd", event = "device_opened", device = %args);
            }
            BackendEvent::Closed(args) => self.release_device("device_closed", &args).await,
            BackendEvent::Detached(args) => self.release_device("device_detached", &args).await,
            BackendEvent::Ready(args) => self.on_ready(&args).await,
            BackendEvent::PreviewStarted(args) => {
                info!(target: "uvcd", event = "preview_started", device = %args);
            }
            BackendEvent::PreviewStopped(args) => {
                info!(target: "uvcd", event = "preview_stopped", device = %args);
            }
            BackendEvent::StatusReceived(args) => self.notify(NoticeKind::Status, args),
            BackendEvent::ButtonEvent(args) => self.notify(NoticeKind::Button, args),
        }
        self.publish();
    }

    pub async fn focus_changed(&mut self, focused: bool) {
        if self.terminated {
            return;
        }
        if !focused {
            debug!(target: "uvcd", event = "focus_lost", "host lost focus");
            return;
        }
        info!(target: "uvcd", event = "focus_regained", "host regained focus");
        if matches!(self.gate.kind(), Some(PendingKind::App)) {
            self.gate.resolve();
            self.finish_app_permission().await;
        } else if !self.armed {
            // Either the app permission arrived after the wait expired or an
            // earlier initialize failed.
            let version = self.authority.platform_version();
            if !self.config.permission.requires_app_permission(version)
                || self.app_permission_granted().await
            {
                self.arm_backend().await;
            }
        } else {
            self.retry_permission().await;
        }
        self.publish();
    }

    /// Re-requests the device permission when a device is attached but not
    /// open. Returns whether a request was issued.
    pub async fn retry(&mut self) -> bool {
        let issued = self.retry_permission().await;
        self.publish();
        issued
    }

    /// Expires the outstanding permission request if its deadline passed.
    pub async fn on_permission_deadline(&mut self, now: Instant) {
        let Some(kind) = self.gate.expire(now) else {
            return;
        };
        match kind {
            PendingKind::App => {
                let err = SessionError::PermissionTimeout {
                    scope: PermissionScope::App,
                    device: None,
                };
                warn!(target: "uvcd", event = "permission_timeout", error = %err);
                self.finish_app_permission().await;
            }
            PendingKind::Device(device) => {
                self.consecutive_timeouts += 1;
                let err = SessionError::PermissionTimeout {
                    scope: PermissionScope::Device,
                    device: Some(device.clone()),
                };
                warn!(
                    target: "uvcd",
                    event = "permission_timeout",
                    error = %err,
                    consecutive = self.consecutive_timeouts,
                );
                self.timeout_hook.on_timeout(&device, self.consecutive_timeouts);
            }
        }
        self.publish();
    }

    /// Closes the open or opening session. Safe to call with nothing open.
    pub async fn close(&mut self) -> bool {
        let closed = self.close_session().await;
        self.publish();
        closed
    }

    pub async fn shutdown(&mut self) {
        if self.terminated {
            return;
        }
        self.close_session().await;
        self.gate.resolve();
        self.terminated = true;
        info!(target: "uvcd", event = "session_shutdown", "session manager stopped");
        self.publish();
    }

    pub async fn status_report(&self) -> StatusReport {
        let device_permitted = match &self.attached {
            Some(device) => self
                .backend
                .has_device_permission(device)
                .await
                .unwrap_or_else(|e| {
                    debug!(target: "uvcd", error = %e, "permission query failed");
                    false
                }),
            None => false,
        };
        StatusReport {
            snapshot: self.snapshot(),
            device_permitted,
        }
    }

    /// Drives the manager until shutdown: inbound inputs and the permission
    /// deadline, one at a time.
    pub async fn run(mut self, mut inbox: Inbox) {
        self.start().await;
        loop {
            let deadline = self.gate.deadline();
            tokio::select! {
                input = inbox.recv() => match input {
                    Some(input) => {
                        if !self.dispatch(input).await {
                            break;
                        }
                    }
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                _ = wait_for(deadline) => {
                    self.on_permission_deadline(Instant::now()).await;
                }
            }
        }
    }

    async fn dispatch(&mut self, input: ManagerInput) -> bool {
        match input {
            ManagerInput::Backend(event) => self.handle_event(event).await,
            ManagerInput::Focus(focused) => self.focus_changed(focused).await,
            ManagerInput::Command(ManagerCommand::Status { respond_to }) => {
                let _ = respond_to.send(self.status_report().await);
            }
            ManagerInput::Command(ManagerCommand::Close { respond_to }) => {
                self.close().await;
                let _ = respond_to.send(self.snapshot());
            }
            ManagerInput::Command(ManagerCommand::Retry { respond_to }) => {
                let issued = self.retry().await;
                let _ = respond_to.send(issued);
            }
            ManagerInput::Command(ManagerCommand::Shutdown { respond_to }) => {
                self.shutdown().await;
                let _ = respond_to.send(());
                return false;
            }
        }
        true
    }

    async fn app_permission_granted(&self) -> bool {
        let version = self.authority.platform_version();
        if !self.config.permission.has_runtime_permissions(version) {
            return true;
        }
        self.authority
            .has_app_permission(&self.config.permission.app_permission)
            .await
    }

    async fn finish_app_permission(&mut self) {
        if self.app_permission_granted().await {
            self.arm_backend().await;
            return;
        }
        let name = self.config.permission.app_permission.clone();
        let show_rationale = self.authority.should_show_rationale(&name).await;
        let err = SessionError::PermissionDenied {
            scope: PermissionScope::App,
            device: None,
            show_rationale,
        };
        warn!(target: "uvcd", event = "permission_denied", error = %err, show_rationale);
        if show_rationale {
            self.notify(NoticeKind::Rationale, name);
        }
    }

    async fn arm_backend(&mut self) {
        match self.backend.initialize(self.sink.clone()).await {
            Ok(()) => {
                self.armed = true;
                info!(target: "uvcd", event = "backend_armed", "device backend initialized");
            }
            Err(e) => {
                warn!(target: "uvcd", error = %SessionError::from(e), "backend initialization failed");
            }
        }
    }

    async fn retry_permission(&mut self) -> bool {
        if !self.armed || self.active.is_some() || self.opening.is_some() {
            return false;
        }
        let Some(device) = self.attached.clone() else {
            return false;
        };
        if self.gate.is_pending() {
            debug!(target: "uvcd", device = %device, "permission request already outstanding");
            return false;
        }
        self.request_device_permission(device).await
    }

    async fn request_device_permission(&mut self, device: DeviceId) -> bool {
        if let Err(existing) = self.gate.arm(PendingKind::Device(device.clone()), Instant::now()) {
            debug!(target: "uvcd", ?existing, "permission request already outstanding");
            return false;
        }
        match self.backend.request_device_permission(&device).await {
            Ok(()) => {
                info!(target: "uvcd", event = "device_permission_requested", device = %device);
                true
            }
            Err(e) => {
                self.gate.resolve();
                warn!(target: "uvcd", device = %device, error = %SessionError::from(e), "permission request failed");
                false
            }
        }
    }

    fn busy_device(&self) -> Option<&DeviceId> {
        self.active
            .as_ref()
            .or(self.opening.as_ref())
            .map(|s| &s.device)
    }

    async fn on_attached(&mut self, args: &str) {
        let Some(device) = DeviceId::parse(args) else {
            debug!(target: "uvcd", "attach event without a device");
            return;
        };
        if !self.armed {
            self.stale("device_attached", args);
            return;
        }
        if let Some(busy) = self.busy_device() {
            if *busy != device {
                self.stale("device_attached", args);
            }
            return;
        }
        if let Some(previous) = self.gate.resolve() {
            debug!(target: "uvcd", ?previous, "abandoning outstanding permission request");
        }
        info!(target: "uvcd", event = "device_attached", device = %device);
        self.attached = Some(device.clone());
        self.request_device_permission(device).await;
    }

    async fn on_permission_result(&mut self, args: &str) {
        let Some(device) = DeviceId::parse(args) else {
            if let Some(PendingKind::Device(device)) = self.gate.kind().cloned() {
                self.gate.resolve();
                let err = SessionError::PermissionDenied {
                    scope: PermissionScope::Device,
                    device: Some(device),
                    show_rationale: false,
                };
                warn!(target: "uvcd", event = "permission_denied", error = %err);
            } else {
                debug!(target: "uvcd", "denial with no request outstanding");
            }
            return;
        };
        if self.attached.as_ref() != Some(&device) {
            self.stale("device_permission_result", args);
            return;
        }
        if self.busy_device().is_some() {
            debug!(target: "uvcd", device = %device, "duplicate permission grant");
            return;
        }
        if self.gate.is_pending_for(&device) {
            self.gate.resolve();
        } else {
            info!(target: "uvcd", device = %device, "permission granted after the wait expired");
        }
        self.open(device).await;
    }

    async fn open(&mut self, device: DeviceId) {
        let res = self.config.stream.resolution();
        let failure = match self.backend.open_device(&device, res.width, res.height).await {
            Ok(raw) => match StreamHandle::from_raw(raw) {
                Some(handle) => {
                    info!(target: "uvcd", event = "device_open_requested", device = %device, handle = handle.get(), resolution = %res);
                    self.opening = Some(StreamSlot { device, handle });
                    return;
                }
                None => format!("backend returned invalid handle {raw}"),
            },
            Err(e) => e.to_string(),
        };
        let err = SessionError::OpenFailure {
            device,
            reason: failure,
        };
        warn!(target: "uvcd", event = "open_failed", error = %err);
    }

    async fn on_ready(&mut self, args: &str) {
        let Some(device) = DeviceId::parse(args) else {
            match self.opening.take() {
                Some(slot) => {
                    let err = SessionError::OpenFailure {
                        device: slot.device,
                        reason: "backend reported an empty ready event".into(),
                    };
                    warn!(target: "uvcd", event = "open_failed", error = %err);
                }
                None => debug!(target: "uvcd", "empty ready with no open in flight"),
            }
            return;
        };
        let slot = match self.opening.take() {
            Some(slot) if slot.device == device => slot,
            other => {
                self.opening = other;
                self.stale("device_ready", args);
                return;
            }
        };
        self.start_stream(slot).await;
    }

    async fn start_stream(&mut self, slot: StreamSlot) {
        // Advisory only: the stream always opens at the configured resolution.
        match self.backend.get_supported_resolutions(&slot.device).await {
            Ok(supported) => {
                info!(target: "uvcd", event = "supported_resolutions", device = %slot.device, supported = %supported);
            }
            Err(e) => debug!(target: "uvcd", error = %e, "supported resolutions unavailable"),
        }

        self.stop_pump().await;
        let res = self.config.stream.resolution();
        if let Err(e) = self
            .backend
            .set_preview_target(
                &slot.device,
                self.config.stream.preview_target(),
                res.width,
                res.height,
            )
            .await
        {
            warn!(target: "uvcd", device = %slot.device, error = %SessionError::from(e), "preview target rejected");
        }

        self.pump = Some(FramePump::start(
            self.backend.frame_signal_entrypoint(),
            slot.handle,
            self.config.stream.frame_interval(),
        ));
        self.consecutive_timeouts = 0;
        info!(target: "uvcd", event = "streaming", device = %slot.device, handle = slot.handle.get());
        self.active = Some(slot);
    }

    /// Device closed by the backend or physically removed: close whatever is
    /// open and forget the attachment.
    async fn release_device(&mut self, event: &'static str, args: &str) {
        if let Some(device) = DeviceId::parse(args) {
            let known = self.attached.as_ref() == Some(&device)
                || self.busy_device() == Some(&device);
            if !known {
                self.stale(event, args);
                return;
            }
        }
        self.close_session().await;
        if matches!(self.gate.kind(), Some(PendingKind::Device(_))) {
            self.gate.resolve();
        }
        if let Some(device) = self.attached.take() {
            info!(target: "uvcd", event, device = %device, "device released");
        }
    }

    async fn close_session(&mut self) -> bool {
        self.stop_pump().await;
        let slot = self.active.take().or_else(|| self.opening.take());
        let Some(slot) = slot else {
            return false;
        };
        match self.backend.close_device(&slot.device).await {
            Ok(()) => {
                info!(target: "uvcd", event = "device_closed", device = %slot.device, handle = slot.handle.get());
            }
            Err(e) => {
                warn!(target: "uvcd", device = %slot.device, error = %SessionError::from(e), "close failed");
            }
        }
        true
    }

    async fn stop_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.stop().await;
        }
    }

    fn stale(&self, event: &'static str, device: &str) {
        let err = SessionError::StaleEventIgnored {
            event,
            device: device.to_string(),
        };
        debug!(target: "uvcd", error = %err, state = %self.state());
    }

    fn notify(&self, kind: NoticeKind, payload: String) {
        info!(target: "uvcd", event = "device_notice", kind = kind.as_str(), payload = %payload);
        // No subscribers is fine.
        let _ = self.notices.send(DeviceNotice { kind, payload });
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
