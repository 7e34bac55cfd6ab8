use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod script;

#[derive(Parser)]
#[command(name = "uvcctl", version, about = "uvcd camera session CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Show the session state
    Status,
    /// Close the open camera (polkit-gated)
    Close,
    /// Re-request permission for the attached camera
    Retry,
    /// Run a scripted scenario against the mock backend, offline
    Simulate { script: PathBuf },
    /// Print the effective configuration
    Config {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}
