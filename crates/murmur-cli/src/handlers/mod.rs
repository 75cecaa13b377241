//! Command handlers.
//!
//! Handlers follow one pattern:
//! - Signature: `pub async fn execute(ctx: &CliContext, ...) -> Result<()>`
//! - Thin wrappers that parse CLI input, call the core/stream/voice crates,
//!   and format output for the terminal.

pub mod contexts;
pub mod params;
pub mod pause;
pub mod run;
