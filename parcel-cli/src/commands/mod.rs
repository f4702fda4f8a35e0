//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Upload a file for processing
    Submit {
        /// File to upload
        file: PathBuf,

        /// Wait for the job to finish and download the result
        #[arg(short, long)]
        wait: bool,

        /// Directory to save the result into (with --wait)
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Show the state of a job
    Status {
        /// Job ID
        id: String,
    },
    /// Download the result of a finished job
    Fetch {
        /// Job ID
        id: String,

        /// Directory to save the result into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Block until a job finishes
    Wait {
        /// Job ID
        id: String,

        /// Seconds between status checks
        #[arg(long, default_value_t = 1)]
        interval: u64,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
}

/// Handle a CLI command
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    job::handle_job_command(command, config).await
}
