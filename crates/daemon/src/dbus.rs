use anyhow::Result;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};
use uvcd_common::types::{DeviceNotice, SessionSnapshot, StatusReply};
use zbus::message::Header;
use zbus::{fdo, interface, Connection, SignalContext};

use crate::handle::SessionHandle;
use crate::polkit::check_manage_authorization;

pub const DBUS_NAME: &str = "org.uvcd.Daemon";
pub const DBUS_PATH: &str = "/org/uvcd/Daemon";

pub struct DaemonService {
    handle: SessionHandle,
}

impl DaemonService {
    pub fn new(handle: SessionHandle) -> Self {
        Self { handle }
    }
}

fn failed(e: impl std::fmt::Display) -> fdo::Error {
    fdo::Error::Failed(e.to_string())
}

#[interface(name = "org.uvcd.Daemon")]
impl DaemonService {
    async fn get_status(&self) -> fdo::Result<StatusReply> {
        let report = self.handle.status().await.map_err(failed)?;
        Ok(StatusReply::from_snapshot(
            &report.snapshot,
            report.device_permitted,
        ))
    }

    /// Closes the open device. Requires `org.uvcd.manage`.
    async fn close_device(
        &self,
        #[zbus(connection)] conn: &Connection,
        #[zbus(header)] header: Header<'_>,
    ) -> fdo::Result<StatusReply> {
        if !check_manage_authorization(conn, &header)
            .await
            .unwrap_or(false)
        {
            return Err(fdo::Error::AccessDenied("org.uvcd.manage required".into()));
        }
        let snapshot = self.handle.close().await.map_err(failed)?;
        Ok(StatusReply::from_snapshot(&snapshot, false))
    }

    async fn retry_permission(&self) -> fdo::Result<bool> {
        self.handle.retry().await.map_err(failed)
    }

    #[zbus(signal)]
    async fn state_changed(ctxt: &SignalContext<'_>, status: &StatusReply) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn device_notice(ctxt: &SignalContext<'_>, kind: &str, payload: &str)
        -> zbus::Result<()>;
}

/// Re-emits snapshot changes and device notices as D-Bus signals until the
/// session manager goes away.
pub async fn forward_signals(
    connection: Connection,
    mut snapshots: watch::Receiver<SessionSnapshot>,
    mut notices: broadcast::Receiver<DeviceNotice>,
) -> Result<()> {
    let ctxt = SignalContext::new(&connection, DBUS_PATH)?;
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let reply = StatusReply::from_snapshot(&snapshots.borrow_and_update(), false);
                if let Err(e) = DaemonService::state_changed(&ctxt, &reply).await {
                    warn!(target: "uvcd", error = %e, "failed to emit StateChanged");
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    if let Err(e) =
                        DaemonService::device_notice(&ctxt, notice.kind.as_str(), &notice.payload).await
                    {
                        warn!(target: "uvcd", error = %e, "failed to emit DeviceNotice");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(target: "uvcd", skipped, "notice forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
