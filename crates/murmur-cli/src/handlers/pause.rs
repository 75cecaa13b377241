//! `toggle-pause` handler.

use anyhow::{Context, Result};
use murmur_core::ControlPort;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Flip the server's pause flag and report the new state.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let status = ctx
        .control
        .toggle_pause()
        .await
        .map_err(CliError::from)
        .context("Failed to toggle pause")?;
    println!(
        "Server is {}",
        if status.is_paused { "paused" } else { "running" }
    );
    Ok(())
}
