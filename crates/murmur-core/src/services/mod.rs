//! Application services.
//!
//! Thin orchestrators over the ports.

pub mod params;

pub use params::{ParamsService, PushError};
