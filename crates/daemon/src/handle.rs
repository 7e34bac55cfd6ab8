use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uvcd_common::backend::EventSink;
use uvcd_common::event::BackendEvent;
use uvcd_common::types::SessionSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub snapshot: SessionSnapshot,
    pub device_permitted: bool,
}

#[derive(Debug)]
pub enum ManagerCommand {
    Status {
        respond_to: oneshot::Sender<StatusReport>,
    },
    Close {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
    /// Re-request the device permission for an attached, unopened device.
    Retry {
        respond_to: oneshot::Sender<bool>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Everything the run loop consumes, in delivery order.
#[derive(Debug)]
pub enum ManagerInput {
    Backend(BackendEvent),
    /// `true` when the host regains focus (resume), `false` when it loses it.
    Focus(bool),
    Command(ManagerCommand),
}

#[derive(Debug, Error)]
pub enum HandleError {
    #[error("session manager is not running")]
    Stopped,
}

pub type Inbox = mpsc::UnboundedReceiver<ManagerInput>;

pub fn session_channel() -> (SessionHandle, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SessionHandle { tx }, rx)
}

/// Cloneable front door to a running `SessionManager`.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<ManagerInput>,
}

impl SessionHandle {
    pub fn event_sink(&self) -> EventSink {
        let tx = self.tx.clone();
        EventSink::new(move |event| tx.send(ManagerInput::Backend(event)).is_ok())
    }

    pub fn send_event(&self, event: BackendEvent) -> Result<(), HandleError> {
        self.send(ManagerInput::Backend(event))
    }

    pub fn focus(&self, focused: bool) -> Result<(), HandleError> {
        self.send(ManagerInput::Focus(focused))
    }

    pub async fn status(&self) -> Result<StatusReport, HandleError> {
        self.request(|respond_to| ManagerCommand::Status { respond_to })
            .await
    }

    pub async fn close(&self) -> Result<SessionSnapshot, HandleError> {
        self.request(|respond_to| ManagerCommand::Close { respond_to })
            .await
    }

    pub async fn retry(&self) -> Result<bool, HandleError> {
        self.request(|respond_to| ManagerCommand::Retry { respond_to })
            .await
    }

    pub async fn shutdown(&self) -> Result<(), HandleError> {
        self.request(|respond_to| ManagerCommand::Shutdown { respond_to })
            .await
    }

    fn send(&self, input: ManagerInput) -> Result<(), HandleError> {
        self.tx.send(input).map_err(|_| HandleError::Stopped)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ManagerCommand,
    ) -> Result<T, HandleError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(ManagerInput::Command(build(respond_to)))?;
        rx.await.map_err(|_| HandleError::Stopped)
    }
}
