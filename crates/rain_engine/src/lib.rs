//! Rain consensus engine.
//!
//! Merges the Buienradar and Buienalarm forecasts into one rain state
//! with a prediction of the next confirmed change, and publishes it only
//! when it differs from the last one.

pub mod classify;
pub mod engine;
pub mod monitor;
pub mod publisher;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{classify, evaluate_slot, RAIN_HEAVY, RAIN_LIGHT, RAIN_MODERATE};
pub use engine::{describe, RainEngine, ScanPlan};
pub use monitor::{FollowUps, RainMonitor, Trigger, TriggerHandle};
pub use publisher::{is_duplicate, Publisher};
