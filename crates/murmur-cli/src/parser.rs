//! Root CLI structure with global options.

use clap::Parser;

use crate::commands::Commands;

/// Stream a live generation from an inference server, narrate it, and steer
/// its sampling parameters while it runs.
#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Stream, narrate and steer a live LLM generation")]
#[command(version)]
pub struct Cli {
    /// Base URL of the inference server
    #[arg(long = "server-url", env = "MURMUR_SERVER_URL", global = true)]
    pub server_url: Option<String>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
