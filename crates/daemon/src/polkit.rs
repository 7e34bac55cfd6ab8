use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, warn};
use uvcd_common::authority::PermissionAuthority;
use zbus::message::Header;
use zbus::zvariant::Value;
use zbus::Connection;

use crate::handle::SessionHandle;

pub const MANAGE_ACTION: &str = "org.uvcd.manage";

const ALLOW_USER_INTERACTION: u32 = 1;

/// Asks polkit whether `subject` may perform `action`.
/// Returns (IsAuthorized, IsChallenge).
pub async fn check_authorization(
    conn: &Connection,
    subject_kind: &str,
    subject_details: HashMap<&str, Value<'_>>,
    action: &str,
    interactive: bool,
) -> zbus::Result<(bool, bool)> {
    let polkit = zbus::Proxy::new(
        conn,
        "org.freedesktop.PolicyKit1",
        "/org/freedesktop/PolicyKit1/Authority",
        "org.freedesktop.PolicyKit1.Authority",
    )
    .await?;
    let details: HashMap<&str, &str> = HashMap::new();
    let flags = if interactive { ALLOW_USER_INTERACTION } else { 0 };
    let (is_auth, is_challenge, _details): (bool, bool, HashMap<String, String>) = polkit
        .call(
            "CheckAuthorization",
            &((subject_kind, subject_details), action, details, flags, ""),
        )
        .await?;
    Ok((is_auth, is_challenge))
}

/// True if the caller named in `header` holds `org.uvcd.manage`.
pub async fn check_manage_authorization(
    conn: &Connection,
    header: &Header<'_>,
) -> zbus::Result<bool> {
    let Some(sender) = header.sender() else {
        return Ok(false);
    };
    let mut subject = HashMap::new();
    subject.insert("name", Value::from(sender.as_str()));
    let (is_auth, _) =
        check_authorization(conn, "system-bus-name", subject, MANAGE_ACTION, true).await?;
    Ok(is_auth)
}

/// App-level camera permission backed by polkit, checked for this process.
///
/// Polkit has no platform versions; it reports the highest so every
/// threshold in the permission config applies.
pub struct PolkitAuthority {
    conn: Connection,
    pid: u32,
    handle: SessionHandle,
}

impl PolkitAuthority {
    pub fn new(conn: Connection, handle: SessionHandle) -> Self {
        Self {
            conn,
            pid: std::process::id(),
            handle,
        }
    }

    fn subject(&self) -> HashMap<&'static str, Value<'static>> {
        let mut subject = HashMap::new();
        subject.insert("pid", Value::from(self.pid));
        subject.insert("start-time", Value::from(0u64));
        subject
    }

    async fn check(&self, action: &str, interactive: bool) -> (bool, bool) {
        match check_authorization(&self.conn, "unix-process", self.subject(), action, interactive)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!(target: "uvcd", action, error = %e, "polkit check failed");
                (false, false)
            }
        }
    }
}

#[async_trait]
impl PermissionAuthority for PolkitAuthority {
    fn platform_version(&self) -> u32 {
        u32::MAX
    }

    async fn has_app_permission(&self, name: &str) -> bool {
        self.check(name, false).await.0
    }

    async fn request_app_permission(&self, name: &str) {
        let conn = self.conn.clone();
        let subject = self.subject();
        let handle = self.handle.clone();
        let action = name.to_string();
        // The prompt can outlive the permission wait; its answer is picked
        // up on the focus return that follows.
        tokio::spawn(async move {
            match check_authorization(&conn, "unix-process", subject, &action, true).await {
                Ok((granted, _)) => debug!(target: "uvcd", action = %action, granted, "polkit prompt answered"),
                Err(e) => warn!(target: "uvcd", action = %action, error = %e, "polkit prompt failed"),
            }
            let _ = handle.focus(true);
        });
    }

    async fn should_show_rationale(&self, name: &str) -> bool {
        self.check(name, false).await.1
    }
}
