use anyhow::Result;
use clap::Parser;
use serde::de::DeserializeOwned;
use uvcctl::script::Script;
use uvcctl::{Cli, Commands};
use uvcd_common::config::{config_path, load_config};
use uvcd_common::types::StatusReply;
use uvcd_daemon::dbus::{DBUS_NAME, DBUS_PATH};
use zbus::zvariant::Type;
use zbus::Connection;

async fn call_daemon<R>(method: &str) -> Result<R>
where
    R: DeserializeOwned + Type,
{
    let conn = Connection::system().await?;
    let proxy = zbus::Proxy::new(&conn, DBUS_NAME, DBUS_PATH, DBUS_NAME).await?;
    Ok(proxy.call(method, &()).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Status => {
            let status: StatusReply = call_daemon("GetStatus").await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Close => {
            let status: StatusReply = call_daemon("CloseDevice").await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Retry => {
            let issued: bool = call_daemon("RetryPermission").await?;
            if issued {
                println!("permission request issued");
            } else {
                println!("nothing to retry");
            }
        }
        Commands::Simulate { script } => {
            let script = Script::load(&script)?;
            for outcome in script.run().await {
                println!("{}", serde_json::to_string(&outcome)?);
            }
        }
        Commands::Config { path } => {
            let path = path.unwrap_or_else(config_path);
            let config = load_config(&path);
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
