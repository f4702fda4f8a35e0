//! Job command handlers
//!
//! Submitting files, checking on jobs and downloading their results.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use colored::*;
use parcel_client::{ParcelClient, ResultFetch};
use parcel_core::domain::artifact::base_name;
use parcel_core::domain::job::{JobFailure, JobId, JobState};
use parcel_core::dto::job::JobStatusView;

use crate::commands::Commands;
use crate::config::Config;

const SUBMIT_WAIT_INTERVAL: Duration = Duration::from_secs(1);
const SUBMIT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Route a command to its handler
pub async fn handle_job_command(command: Commands, config: &Config) -> Result<()> {
    let client = ParcelClient::new(&config.server_url);

    match command {
        Commands::Submit { file, wait, output } => submit(&client, &file, wait, &output).await,
        Commands::Status { id } => status(&client, &id).await,
        Commands::Fetch { id, output } => fetch(&client, &id, &output).await,
        Commands::Wait {
            id,
            interval,
            timeout,
        } => {
            wait_for(
                &client,
                &id,
                Duration::from_secs(interval),
                Duration::from_secs(timeout),
            )
            .await
        }
    }
}

/// Upload a file, optionally waiting for its result
async fn submit(client: &ParcelClient, file: &Path, wait: bool, output: &Path) -> Result<()> {
    let submitted = client
        .submit_file(file)
        .await
        .with_context(|| format!("Failed to submit {}", file.display()))?;

    println!("{}", "✓ File submitted".green());
    println!("  Job ID: {}", submitted.job_id.to_string().cyan());
    println!("  State:  {}", colorize_state(submitted.state));

    if !wait {
        println!();
        println!(
            "{}",
            format!("Check progress with: parcel status {}", submitted.job_id).dimmed()
        );
        return Ok(());
    }

    let finished = client
        .wait_for_completion(submitted.job_id, SUBMIT_WAIT_INTERVAL, SUBMIT_WAIT_TIMEOUT)
        .await?;

    if finished.state == JobState::Success {
        fetch_job(client, submitted.job_id, output).await
    } else {
        print_status(&finished);
        bail!("Job {} did not succeed", submitted.job_id)
    }
}

/// Show the state of a job
async fn status(client: &ParcelClient, id: &str) -> Result<()> {
    let job_id = parse_job_id(id)?;
    let view = match client.status(job_id).await {
        Ok(view) => view,
        Err(e) if e.is_not_found() => bail!("No job with ID {}", job_id),
        Err(e) => return Err(e.into()),
    };
    print_status(&view);
    Ok(())
}

/// Download the result of a job
async fn fetch(client: &ParcelClient, id: &str, output: &Path) -> Result<()> {
    let job_id = parse_job_id(id)?;
    fetch_job(client, job_id, output).await
}

async fn fetch_job(client: &ParcelClient, job_id: JobId, output: &Path) -> Result<()> {
    match client.fetch_result(job_id).await? {
        ResultFetch::Ready { filename, bytes } => {
            let path = save_result(output, &filename, &bytes).await?;
            println!("{}", "✓ Result downloaded".green());
            println!("  Saved to: {}", path.display().to_string().cyan());
            println!("  Size:     {} bytes", bytes.len());
            Ok(())
        }
        ResultFetch::NotReady(state) => {
            println!(
                "{} Job {} is still {}",
                "⧗".yellow(),
                job_id,
                colorize_state(state)
            );
            println!("{}", "  Try again later.".dimmed());
            Ok(())
        }
        ResultFetch::Failed(failure) => {
            print_failure(&failure);
            bail!("Job {} failed", job_id)
        }
    }
}

/// Block until the job finishes
async fn wait_for(
    client: &ParcelClient,
    id: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let job_id = parse_job_id(id)?;
    println!("{}", format!("Waiting for job {}...", job_id).dimmed());

    let view = client.wait_for_completion(job_id, interval, timeout).await?;
    print_status(&view);
    Ok(())
}

fn parse_job_id(id: &str) -> Result<JobId> {
    id.trim()
        .parse()
        .with_context(|| format!("'{}' is not a valid job ID", id))
}

/// Write a downloaded result into `dir`, never outside of it
async fn save_result(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    let name = match base_name(filename).trim() {
        "" | "." | ".." => "result",
        name => name,
    };

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(path)
}

/// Print job state with its result or error
fn print_status(view: &JobStatusView) {
    println!("{}", "Job Details:".bold());
    println!("  ID:     {}", view.job_id.to_string().cyan());
    println!("  State:  {}", colorize_state(view.state));

    if let Some(result) = &view.result {
        println!("\n{}", "Result:".bold());
        println!("  Name:   {}", result.result_name);
        println!("  Path:   {}", result.result_path.dimmed());
    }

    if let Some(failure) = &view.error {
        println!();
        print_failure(failure);
    }
}

fn print_failure(failure: &JobFailure) {
    println!("{}", "Error:".bold());
    println!("  Kind:    {}", failure.kind.to_string().red());
    println!("  Message: {}", failure.message.red());
}

/// Colorize job state for display
fn colorize_state(state: JobState) -> ColoredString {
    match state {
        JobState::Pending => state.as_str().yellow(),
        JobState::Started => state.as_str().blue(),
        JobState::Success => state.as_str().green(),
        JobState::Failure => state.as_str().red(),
    }
}
