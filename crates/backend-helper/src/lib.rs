use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uvcd_common::backend::{DeviceBackend, EventSink, FrameSignal};
use uvcd_common::config::BackendConfig;
use uvcd_common::error::BackendError;
use uvcd_common::event::WireEvent;
use uvcd_common::types::{DeviceId, PreviewTarget, StreamHandle};


/// Frame ticks waiting for the `watch` writer. Ticks beyond this are
/// dropped while the helper is not draining its stdin.
const FRAME_QUEUE: usize = 8;

/// Forwards frame signals to the `watch` process's stdin.
#[derive(Default)]
struct HelperFrames {
    tx: Mutex<Option<mpsc::Sender<StreamHandle>>>,
    dropped: AtomicU64,
}

impl FrameSignal for HelperFrames {
    fn issue(&self, handle: StreamHandle) {
        if let Ok(guard) = self.tx.lock() {
            if let Some(tx) = guard.as_ref() {
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(handle) {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Device backend fronting an external helper executable.
///
/// One-shot operations run `<helper> <verb> <args..>` and read stdout.
/// `initialize` starts `<helper> watch <callback_target>`, which streams
/// JSON event lines on stdout and takes `frame <handle>` lines on stdin.
#[derive(Clone)]
pub struct HelperBackend {
    helper: PathBuf,
    callback_target: String,
    watch: Arc<Mutex<Option<tokio::process::Child>>>,
    frames: Arc<HelperFrames>,
}

impl HelperBackend {
    pub fn new(helper: impl Into<PathBuf>, callback_target: impl Into<String>) -> Self {
        Self {
            helper: helper.into(),
            callback_target: callback_target.into(),
            watch: Arc::new(Mutex::new(None)),
            frames: Arc::new(HelperFrames::default()),
        }
    }

    pub fn from_config(cfg: &BackendConfig) -> Self {
        Self::new(cfg.helper.clone(), cfg.callback_target.clone())
    }

    /// Frame ticks discarded because the helper fell behind.
    pub fn dropped_frames(&self) -> u64 {
        self.frames.dropped.load(Ordering::Relaxed)
    }

    fn run_helper(helper: &Path, args: &[String]) -> Result<String, BackendError> {
        let out = Command::new(helper)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| BackendError::Command(format!("{}: {e}", helper.display())))?;
        if out.status.success() {
            Ok(String::from_utf8_lossy(&out.stdout).to_string())
        } else {
            Err(BackendError::Command(
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            ))
        }
    }

    async fn call(&self, args: Vec<String>) -> Result<String, BackendError> {
        let helper = self.helper.clone();
        tokio::task::spawn_blocking(move || Self::run_helper(&helper, &args))
            .await
            .map_err(|e| BackendError::Command(e.to_string()))?
    }

    fn parse_bool(output: &str) -> Result<bool, BackendError> {
        match output.trim() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(BackendError::Protocol(format!(
                "expected boolean, got '{other}'"
            ))),
        }
    }

    fn parse_handle(output: &str) -> Result<i32, BackendError> {
        let trimmed = output.trim();
        trimmed
            .parse::<i32>()
            .map_err(|_| BackendError::Protocol(format!("expected stream handle, got '{trimmed}'")))
    }

    fn spawn_watch(&self, sink: EventSink) -> Result<tokio::process::Child, BackendError> {
        let mut child = tokio::process::Command::new(&self.helper)
            .arg("watch")
            .arg(&self.callback_target)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::Command(format!("{}: {e}", self.helper.display())))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Protocol("watch stdout unavailable".into()))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Protocol("watch stdin unavailable".into()))?;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match WireEvent::parse_line(&line) {
                            Ok(event) => {
                                if !sink.emit(event) {
                                    break;
                                }
                            }
                            Err(e) => warn!(target: "uvcd", error = %e, "dropping helper output"),
                        }
                    }
                    Ok(None) => {
                        info!(target: "uvcd", event = "helper_watch_exit", "helper watch stream closed");
                        break;
                    }
                    Err(e) => {
                        warn!(target: "uvcd", error = %e, "helper watch read failed");
                        break;
                    }
                }
            }
        });

        let (tx, mut rx) = mpsc::channel::<StreamHandle>(FRAME_QUEUE);
        tokio::spawn(async move {
            while let Some(handle) = rx.recv().await {
                let line = format!("frame {handle}\n");
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    debug!(target: "uvcd", error = %e, "helper stdin closed");
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    debug!(target: "uvcd", error = %e, "helper stdin flush failed");
                    break;
                }
            }
        });
        if let Ok(mut guard) = self.frames.tx.lock() {
            *guard = Some(tx);
        }
        Ok(child)
    }
}

#[async_trait]
impl DeviceBackend for HelperBackend {
    async fn initialize(&self, sink: EventSink) -> Result<(), BackendError> {
        let child = self.spawn_watch(sink)?;
        let mut guard = self
            .watch
            .lock()
            .map_err(|_| BackendError::Protocol("watch state poisoned".into()))?;
        // Replacing an earlier watch drops (and kills) it.
        *guard = Some(child);
        Ok(())
    }

    async fn has_device_permission(&self, device: &DeviceId) -> Result<bool, BackendError> {
        let out = self
            .call(vec!["has-permission".into(), device.to_string()])
            .await?;
        Self::parse_bool(&out)
    }

    async fn request_device_permission(&self, device: &DeviceId) -> Result<(), BackendError> {
        self.call(vec!["request-permission".into(), device.to_string()])
            .await
            .map(|_| ())
    }

    async fn open_device(
        &self,
        device: &DeviceId,
        width: u32,
        height: u32,
    ) -> Result<i32, BackendError> {
        let out = self
            .call(vec![
                "open".into(),
                device.to_string(),
                width.to_string(),
                height.to_string(),
            ])
            .await?;
        Self::parse_handle(&out)
    }

    async fn close_device(&self, device: &DeviceId) -> Result<(), BackendError> {
        self.call(vec!["close".into(), device.to_string()])
            .await
            .map(|_| ())
    }

    async fn set_preview_target(
        &self,
        device: &DeviceId,
        target: PreviewTarget,
        width: u32,
        height: u32,
    ) -> Result<(), BackendError> {
        self.call(vec![
            "preview".into(),
            device.to_string(),
            target.0.to_string(),
            width.to_string(),
            height.to_string(),
        ])
        .await
        .map(|_| ())
    }

    async fn get_supported_resolutions(&self, device: &DeviceId) -> Result<String, BackendError> {
        let out = self
            .call(vec!["supported-sizes".into(), device.to_string()])
            .await?;
        Ok(out.trim().to_string())
    }

    fn frame_signal_entrypoint(&self) -> Arc<dyn FrameSignal> {
        self.frames.clone()
    }
}
