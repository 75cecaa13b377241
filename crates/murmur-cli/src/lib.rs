#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;
pub mod repl;

// Re-export primary types for convenient access
pub use bootstrap::{CliContext, SettingsOverrides, bootstrap, resolve_settings};
pub use commands::{Commands, RunArgs};
pub use error::CliError;
pub use parser::Cli;
pub use repl::ReplCommand;
