//! Shared types, config, and error definitions for rain-watch.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::{Location, WatchConfig};
pub use error::Error;
pub use time::ClockZone;
pub use types::*;
