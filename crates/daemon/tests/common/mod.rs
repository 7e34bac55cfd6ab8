#![allow(dead_code)]

use std::sync::Arc;

use uvcd_backend_mock::{MockAuthority, MockBackend};
use uvcd_common::config::SessionConfig;
use uvcd_common::event::BackendEvent;
use uvcd_common::types::{DeviceId, SessionSnapshot, SessionState, StreamHandle};
use uvcd_daemon::handle::{Inbox, ManagerInput};
use uvcd_daemon::{session_channel, SessionHandle, SessionManager};

/// Version at which the default thresholds no longer require app permission.
pub const LEGACY_PLATFORM: u32 = 22;
pub const MODERN_PLATFORM: u32 = 30;

pub struct Harness {
    pub manager: SessionManager,
    pub backend: MockBackend,
    pub authority: MockAuthority,
    pub handle: SessionHandle,
    pub inbox: Inbox,
}

impl Harness {
    pub fn new(backend: MockBackend, authority: MockAuthority) -> Self {
        Self::with_config(backend, authority, SessionConfig::default())
    }

    pub fn with_config(backend: MockBackend, authority: MockAuthority, config: SessionConfig) -> Self {
        let (handle, inbox) = session_channel();
        let manager = SessionManager::new(
            Arc::new(backend.clone()),
            Arc::new(authority.clone()),
            config,
            handle.event_sink(),
        );
        Self {
            manager,
            backend,
            authority,
            handle,
            inbox,
        }
    }

    /// Armed manager over a backend that only answers when told to.
    pub async fn armed() -> Self {
        let mut h = Self::new(MockBackend::default(), MockAuthority::new(LEGACY_PLATFORM));
        h.manager.start().await;
        assert!(h.manager.snapshot().armed);
        h
    }

    /// Feeds `event` and everything the backend emits in response.
    pub async fn deliver(&mut self, event: BackendEvent) {
        self.manager.handle_event(event).await;
        self.drain().await;
    }

    pub async fn drain(&mut self) {
        while let Ok(input) = self.inbox.try_recv() {
            match input {
                ManagerInput::Backend(event) => self.manager.handle_event(event).await,
                ManagerInput::Focus(focused) => self.manager.focus_changed(focused).await,
                ManagerInput::Command(_) => panic!("unexpected command in harness inbox"),
            }
        }
    }

    /// Expires the outstanding request as if its deadline had passed.
    pub async fn expire(&mut self) {
        let deadline = self
            .manager
            .permission_deadline()
            .expect("no permission request outstanding");
        self.manager.on_permission_deadline(deadline).await;
        self.drain().await;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.manager.snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.manager.state()
    }
}

pub fn attached(id: &str) -> BackendEvent {
    BackendEvent::Attached(id.into())
}

pub fn granted(id: &str) -> BackendEvent {
    BackendEvent::PermissionResult(id.into())
}

pub fn ready(id: &str) -> BackendEvent {
    BackendEvent::Ready(id.into())
}

pub fn detached(id: &str) -> BackendEvent {
    BackendEvent::Detached(id.into())
}

pub fn closed(id: &str) -> BackendEvent {
    BackendEvent::Closed(id.into())
}

pub fn cam(id: &str) -> DeviceId {
    DeviceId::parse(id).unwrap()
}

pub fn handle(raw: i32) -> StreamHandle {
    StreamHandle::from_raw(raw).unwrap()
}

pub fn assert_stream_invariant(s: &SessionSnapshot) {
    assert_eq!(
        s.active_device.is_some(),
        s.active_stream_handle.is_some(),
        "active device and stream handle diverged: {s:?}"
    );
}
