use anyhow::Result;
use futures_util::StreamExt;
use tracing::{debug, info};
use zbus::{Connection, MatchRule, MessageStream};

use crate::handle::SessionHandle;

/// Maps logind's PrepareForSleep onto host focus: sleeping loses focus,
/// resuming regains it.
pub async fn run_logind_listener(connection: Connection, handle: SessionHandle) -> Result<()> {
    let rule = MatchRule::builder()
        .msg_type(zbus::message::Type::Signal)
        .interface("org.freedesktop.login1.Manager")?
        .member("PrepareForSleep")?
        .build();
    let mut stream = MessageStream::for_match_rule(rule, &connection, None).await?;
    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                debug!(target: "uvcd", error = %e, "skipping unreadable logind message");
                continue;
            }
        };
        // true when about to sleep, false when resumed
        if let Ok((going_to_sleep,)) = msg.body().deserialize::<(bool,)>() {
            info!(target: "uvcd", event = "prepare_for_sleep", going_to_sleep);
            if handle.focus(!going_to_sleep).is_err() {
                break;
            }
        }
    }
    Ok(())
}
