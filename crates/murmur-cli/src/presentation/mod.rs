//! Terminal rendering of controller events, history and status.

pub mod events;
pub mod tables;

pub use events::{EventFormat, Output, render_event};
pub use tables::{
    format_params, format_voice, history_table, status_lines, truncate_string,
};
