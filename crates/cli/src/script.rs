//! Offline scenarios: a TOML script of backend events, focus changes and
//! pauses replayed against the mock backend.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uvcd_backend_mock::{MockAuthority, MockBackend};
use uvcd_common::config::SessionConfig;
use uvcd_common::event::BackendEvent;
use uvcd_common::types::SessionSnapshot;
use uvcd_daemon::handle::{Inbox, ManagerInput};
use uvcd_daemon::{session_channel, SessionManager};

/// Below every app-permission threshold, so the mock arms immediately.
const SIMULATED_PLATFORM: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Event {
        event: String,
        #[serde(default)]
        args: String,
    },
    Focus {
        focus: bool,
    },
    Wait {
        wait_ms: u64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Every open returns an invalid handle.
    #[serde(default)]
    pub open_fails: bool,
    /// The backend grants requests and reports readiness on its own.
    #[serde(default)]
    pub cooperative: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub snapshot: SessionSnapshot,
}

impl Script {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing script {}", path.display()))
    }

    /// Replays every step and returns the snapshot after each. Step zero is
    /// the state right after start.
    pub async fn run(&self) -> Vec<StepOutcome> {
        let backend = if self.cooperative {
            MockBackend::new_cooperative()
        } else {
            MockBackend::default()
        };
        if self.open_fails {
            backend.set_open_result(0);
        }
        let mut config = SessionConfig::default();
        if let Some(ms) = self.timeout_ms {
            config.permission.timeout_ms = ms;
        }
        let (handle, mut inbox) = session_channel();
        let mut manager = SessionManager::new(
            Arc::new(backend),
            Arc::new(MockAuthority::granted(SIMULATED_PLATFORM)),
            config,
            handle.event_sink(),
        );

        manager.start().await;
        let mut outcomes = vec![StepOutcome {
            step: 0,
            input: "start".into(),
            error: None,
            snapshot: manager.snapshot(),
        }];

        for (i, step) in self.steps.iter().enumerate() {
            let mut error = None;
            let input = match step {
                Step::Event { event, args } => {
                    match BackendEvent::from_wire(event, args) {
                        Ok(ev) => manager.handle_event(ev).await,
                        Err(e) => error = Some(e.to_string()),
                    }
                    format!("{event}({args})")
                }
                Step::Focus { focus } => {
                    manager.focus_changed(*focus).await;
                    format!("focus({focus})")
                }
                Step::Wait { wait_ms } => {
                    tokio::time::sleep(Duration::from_millis(*wait_ms)).await;
                    manager
                        .on_permission_deadline(tokio::time::Instant::now())
                        .await;
                    format!("wait({wait_ms}ms)")
                }
            };
            drain(&mut manager, &mut inbox).await;
            outcomes.push(StepOutcome {
                step: i + 1,
                input,
                error,
                snapshot: manager.snapshot(),
            });
        }
        manager.shutdown().await;
        outcomes
    }
}

/// Applies whatever the backend emitted in response to the last step.
async fn drain(manager: &mut SessionManager, inbox: &mut Inbox) {
    while let Ok(input) = inbox.try_recv() {
        match input {
            ManagerInput::Backend(event) => manager.handle_event(event).await,
            ManagerInput::Focus(focused) => manager.focus_changed(focused).await,
            ManagerInput::Command(_) => {}
        }
    }
}
