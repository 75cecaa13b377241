//! `params` handler.

use anyhow::{Context, Result};

use crate::bootstrap::{CliContext, parse_assignments};
use crate::error::CliError;

/// Validate the `--set` assignments and send them as one patch.
pub async fn execute(ctx: &CliContext, assignments: &[String]) -> Result<()> {
    let patch = parse_assignments(assignments)?;
    ctx.params
        .push(&patch)
        .await
        .map_err(CliError::from)
        .context("Failed to update parameters")?;

    let sent = serde_json::to_string(&patch).context("Failed to encode patch")?;
    println!("Sent {sent}");
    Ok(())
}
