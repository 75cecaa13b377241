//! Subcommands of the `murmur` binary.

use clap::{Args, Subcommand};
use murmur_core::SpeechGranularity;

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Stream generations, printing text as it arrives
    ///
    /// While running, type `help` for the line commands that edit parameters,
    /// voice settings, and the pause gate.
    Run(RunArgs),

    /// List the server's named contexts
    Contexts,

    /// Switch the server to the context at INDEX (see `contexts`)
    UseContext {
        /// Zero-based index into the context list
        index: usize,
    },

    /// Toggle the server-side pause flag
    TogglePause,

    /// Send a parameter patch to the server
    Params {
        /// Parameter assignment such as `temperature=0.7` (repeatable)
        #[arg(long = "set", value_name = "PARAM=VALUE", required = true)]
        set: Vec<String>,
    },
}

/// Options of the `run` command.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Stop after the first generation instead of restarting
    #[arg(long)]
    pub once: bool,

    /// Print controller events as JSON lines instead of text
    #[arg(long)]
    pub json: bool,

    /// Disable narration
    #[arg(long = "no-voice")]
    pub no_voice: bool,

    /// Narrate each delta as it arrives, or whole phrases
    #[arg(long, value_name = "delta|phrase")]
    pub granularity: Option<SpeechGranularity>,

    /// Delay in milliseconds before the next generation starts
    #[arg(long = "settle-ms")]
    pub settle_ms: Option<u64>,

    /// Initial context for the first generation
    #[arg(long)]
    pub context: Option<String>,

    /// Characters of output carried into the next context (0 keeps the
    /// initial context for every generation)
    #[arg(long = "tail-chars")]
    pub tail_chars: Option<usize>,

    /// Number of generations kept in history
    #[arg(long)]
    pub history: Option<usize>,

    /// Initial parameter assignment such as `top_k=40` (repeatable)
    #[arg(long = "set", value_name = "PARAM=VALUE")]
    pub set: Vec<String>,
}
