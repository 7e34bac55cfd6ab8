mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use uvcd_backend_mock::{BackendCall, MockAuthority, MockBackend};
use uvcd_common::config::SessionConfig;
use uvcd_common::types::{SessionSnapshot, SessionState};
use uvcd_daemon::{session_channel, HandleError, SessionHandle, SessionManager};

const WAIT: Duration = Duration::from_secs(2);

struct Running {
    handle: SessionHandle,
    backend: MockBackend,
    snapshots: tokio::sync::watch::Receiver<SessionSnapshot>,
    task: tokio::task::JoinHandle<()>,
}

fn spawn(backend: MockBackend, config: SessionConfig) -> Running {
    let (handle, inbox) = session_channel();
    let manager = SessionManager::new(
        Arc::new(backend.clone()),
        Arc::new(MockAuthority::new(LEGACY_PLATFORM)),
        config,
        handle.event_sink(),
    );
    let snapshots = manager.subscribe();
    let task = tokio::spawn(manager.run(inbox));
    Running {
        handle,
        backend,
        snapshots,
        task,
    }
}

impl Running {
    async fn wait_for(&mut self, pred: impl FnMut(&SessionSnapshot) -> bool) -> SessionSnapshot {
        tokio::time::timeout(WAIT, self.snapshots.wait_for(pred))
            .await
            .expect("timed out waiting for session state")
            .expect("session manager dropped")
            .clone()
    }
}

#[tokio::test]
async fn cooperative_backend_reaches_streaming() {
    let mut r = spawn(MockBackend::new_cooperative(), SessionConfig::default());
    r.wait_for(|s| s.armed).await;

    r.handle.send_event(attached("camA")).unwrap();
    let s = r.wait_for(|s| s.state == SessionState::Streaming).await;
    assert_eq!(s.active_device, Some(cam("camA")));

    let report = r.handle.status().await.unwrap();
    assert_eq!(report.snapshot.state, SessionState::Streaming);
    assert!(report.device_permitted);

    r.handle.shutdown().await.unwrap();
    r.task.await.unwrap();
}

#[tokio::test]
async fn close_and_retry_commands() {
    let mut r = spawn(MockBackend::new_cooperative(), SessionConfig::default());
    r.wait_for(|s| s.armed).await;
    r.handle.send_event(attached("camA")).unwrap();
    r.wait_for(|s| s.state == SessionState::Streaming).await;

    let after_close = r.handle.close().await.unwrap();
    assert_eq!(after_close.state, SessionState::Attached);
    assert_eq!(after_close.active_stream_handle, None);

    assert!(r.handle.retry().await.unwrap());
    let s = r.wait_for(|s| s.state == SessionState::Streaming).await;
    assert_eq!(s.active_stream_handle, Some(handle(2)));

    r.handle.shutdown().await.unwrap();
    r.task.await.unwrap();
}

#[tokio::test]
async fn permission_wait_is_bounded() {
    let mut config = SessionConfig::default();
    config.permission.timeout_ms = 40;
    let mut r = spawn(MockBackend::default(), config);
    r.wait_for(|s| s.armed).await;

    let started = Instant::now();
    r.handle.send_event(attached("camA")).unwrap();
    let s = r
        .wait_for(|s| !s.permission_pending && s.state == SessionState::Attached)
        .await;
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(s.attached_device, Some(cam("camA")));

    r.handle.shutdown().await.unwrap();
    r.task.await.unwrap();
}

#[tokio::test]
async fn resume_through_the_handle_rerequests() {
    let mut config = SessionConfig::default();
    config.permission.timeout_ms = 20;
    let backend = MockBackend::default();
    let mut r = spawn(backend, config);
    r.wait_for(|s| s.armed).await;

    r.handle.send_event(attached("camA")).unwrap();
    r.wait_for(|s| s.state == SessionState::Attached && !s.permission_pending)
        .await;

    r.handle.focus(true).unwrap();
    // The user answers the dialog this time.
    r.backend.emit(granted("camA"));
    r.wait_for(|s| s.state == SessionState::Opening).await;
    r.backend.emit(ready("camA"));
    r.wait_for(|s| s.state == SessionState::Streaming).await;
    assert_eq!(
        r.backend
            .count(|c| matches!(c, BackendCall::RequestPermission(d) if d == "camA")),
        2
    );

    r.handle.shutdown().await.unwrap();
    r.task.await.unwrap();
}

#[tokio::test]
async fn frames_stop_after_close_command() {
    let mut r = spawn(MockBackend::new_cooperative(), SessionConfig::default());
    r.wait_for(|s| s.armed).await;
    r.handle.send_event(attached("camA")).unwrap();
    r.wait_for(|s| s.state == SessionState::Streaming).await;

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(r.backend.frame_count() > 0);

    r.handle.close().await.unwrap();
    let stopped_at = r.backend.frame_count();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(r.backend.frame_count(), stopped_at);

    r.handle.shutdown().await.unwrap();
    r.task.await.unwrap();
}

#[tokio::test]
async fn handle_reports_stopped_after_shutdown() {
    let mut r = spawn(MockBackend::new_cooperative(), SessionConfig::default());
    r.wait_for(|s| s.armed).await;
    r.handle.shutdown().await.unwrap();
    r.task.await.unwrap();

    assert!(matches!(r.handle.status().await, Err(HandleError::Stopped)));
    assert!(matches!(r.handle.focus(true), Err(HandleError::Stopped)));
}
