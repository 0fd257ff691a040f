// src/cli/mod.rs
// Headless commands: batch extraction without a window, token storage.

pub mod process;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

use crate::review::error::ReviewError;
use crate::settings::{credentials, SettingsError};

#[derive(Parser)]
#[command(name = "labelgrid")]
#[command(about = "LabelGrid - container label extraction and verification console", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract container grids from label photos without opening the console
    Process(ProcessArgs),

    /// Store the backend bearer token in the OS keyring (empty string removes it)
    SetToken {
        token: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Shipment project the photos belong to
    #[arg(long)]
    pub project: String,

    /// Mark every successfully extracted image as verified, without edits
    #[arg(long)]
    pub verify: bool,

    /// Override the backend base URL from settings
    #[arg(long)]
    pub api_url: Option<String>,

    /// Print results as JSON instead of text grids
    #[arg(long)]
    pub json: bool,

    /// Image files or folders (png, jpg, jpeg, webp)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("No supported images found (png, jpg, jpeg, webp).")]
    NoImages,
    #[error("Could not start the async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("Could not encode JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Runs a headless command. `Ok(false)` means it ran but something failed.
pub fn run(command: Commands) -> Result<bool, CliError> {
    match command {
        Commands::Process(args) => process::run(args),
        Commands::SetToken { token } => {
            credentials::store_token(&token)?;
            if token.trim().is_empty() {
                println!("API token removed.");
            } else {
                println!("API token stored.");
            }
            Ok(true)
        }
    }
}
