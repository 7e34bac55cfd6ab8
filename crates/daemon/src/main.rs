use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use uvcd_backend_helper::HelperBackend;
use uvcd_common::authority::{PermissionAuthority, UnrestrictedAuthority};
use uvcd_common::config::{config_path, load_config, AuthorityKind};
use uvcd_daemon::dbus::{forward_signals, DaemonService, DBUS_NAME, DBUS_PATH};
use uvcd_daemon::polkit::PolkitAuthority;
use uvcd_daemon::{logind, session_channel, SessionManager};

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    info!(target: "uvcd", event = "daemon_start", "uvcd starting");

    let path = config_path();
    let config = load_config(&path);
    info!(target: "uvcd", path = %path.display(), authority = ?config.permission.authority, "config loaded");

    let (handle, inbox) = session_channel();
    let connection = zbus::ConnectionBuilder::system()?
        .name(DBUS_NAME)?
        .serve_at(DBUS_PATH, DaemonService::new(handle.clone()))?
        .build()
        .await?;

    let authority: Arc<dyn PermissionAuthority> = match config.permission.authority {
        AuthorityKind::None => Arc::new(UnrestrictedAuthority),
        AuthorityKind::Polkit => Arc::new(PolkitAuthority::new(connection.clone(), handle.clone())),
    };
    let backend = Arc::new(HelperBackend::from_config(&config.backend));
    let manager = SessionManager::new(backend, authority, config, handle.event_sink());

    let conn_signals = connection.clone();
    let snapshots = manager.subscribe();
    let notices = manager.notices();
    tokio::spawn(async move {
        if let Err(e) = forward_signals(conn_signals, snapshots, notices).await {
            error!(error = ?e, "signal forwarder exited with error");
        }
    });

    // Suspend and resume stand in for losing and regaining focus
    let conn_logind = connection.clone();
    let handle_logind = handle.clone();
    tokio::spawn(async move {
        if let Err(e) = logind::run_logind_listener(conn_logind, handle_logind).await {
            error!(error = ?e, "logind listener exited with error");
        }
    });

    let session = tokio::spawn(manager.run(inbox));

    // Run until SIGINT/SIGTERM
    tokio::signal::ctrl_c().await?;
    info!(target: "uvcd", "received ctrl_c, shutting down");
    if let Err(e) = handle.shutdown().await {
        error!(error = %e, "session manager already gone");
    }
    session.await?;
    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
