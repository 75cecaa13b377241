//! `contexts` and `use-context` handlers, shared with the `run` prompt.

use anyhow::{Context, Result};
use murmur_core::{ContextList, ControlError, ControlPort, CurrentContext};

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::truncate_string;

const CONTEXT_WIDTH: usize = 72;

/// The server's named contexts as table lines, marking the current one.
pub fn context_lines(list: &ContextList) -> Vec<String> {
    if list.contexts.is_empty() {
        return vec!["The server has no named contexts.".to_string()];
    }

    let current = list.current_index();
    let mut lines = vec![
        format!("{:<3} {:<3} Context", "", "#"),
        "-".repeat(80),
    ];
    for (index, context) in list.contexts.iter().enumerate() {
        let marker = if current == Some(index) { "*" } else { "" };
        lines.push(format!(
            "{marker:<3} {index:<3} {}",
            truncate_string(&context.replace('\n', " "), CONTEXT_WIDTH)
        ));
    }
    if current.is_none() {
        lines.push(String::new());
        lines.push(format!(
            "Current: {}",
            truncate_string(&list.current, CONTEXT_WIDTH)
        ));
    }
    lines
}

/// Select the context at `index` on the server.
///
/// The index is checked against `GET /contexts` first so an out-of-range
/// choice never reaches the server.
pub async fn select_context(
    control: &dyn ControlPort,
    index: usize,
) -> Result<CurrentContext, ControlError> {
    let list = control.contexts().await?;
    if index >= list.contexts.len() {
        return Err(ControlError::ContextIndex {
            index,
            available: list.contexts.len(),
        });
    }
    let current = control.set_context(index).await?;
    tracing::info!(index, "Server context selected");
    Ok(current)
}

/// The server's current context, if it can be fetched and is not blank.
pub async fn server_context(control: &dyn ControlPort) -> Option<String> {
    match control.contexts().await {
        Ok(list) if !list.current.trim().is_empty() => Some(list.current),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Could not fetch server context; using the configured one");
            None
        }
    }
}

/// List the server's named contexts.
pub async fn list(ctx: &CliContext) -> Result<()> {
    let list = ctx
        .control
        .contexts()
        .await
        .map_err(CliError::from)
        .context("Failed to fetch contexts")?;
    for line in context_lines(&list) {
        println!("{line}");
    }
    Ok(())
}

/// Switch the server to the context at `index`.
pub async fn use_context(ctx: &CliContext, index: usize) -> Result<()> {
    let current = select_context(ctx.control.as_ref(), index)
        .await
        .map_err(CliError::from)
        .with_context(|| format!("Failed to select context {index}"))?;
    println!(
        "Context set: {}",
        truncate_string(&current.current, CONTEXT_WIDTH)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(current: &str) -> ContextList {
        ContextList {
            contexts: vec!["Explain recursion.".into(), "Write a\nhaiku.".into()],
            current: current.into(),
        }
    }

    #[test]
    fn test_current_context_is_marked() {
        let lines = context_lines(&list("Write a\nhaiku."));
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("    0"));
        assert!(lines[3].starts_with("*   1"));
        assert!(lines[3].ends_with("Write a haiku."));
    }

    #[test]
    fn test_unlisted_current_context_is_shown_below() {
        let lines = context_lines(&list("Tell me a story."));
        assert_eq!(lines.last().map(String::as_str), Some("Current: Tell me a story."));
    }
}
