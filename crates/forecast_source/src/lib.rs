//! Per-provider forecast sources.
//!
//! A [`ForecastSource`] owns one upstream endpoint, a boundary-aligned
//! cache of parsed samples, and answers "what rate covers time T".
//! Provider-specific URL building and parsing live behind
//! [`ForecastProvider`]; HTTP and retries live behind [`Fetcher`].

pub mod cache;
pub mod fetch;
pub mod source;

pub use cache::SourceCache;
pub use fetch::{FetchResponse, Fetcher, RetryPolicy, RetryingFetcher};
pub use source::{ForecastProvider, ForecastSource, ParsedForecast, RainSource};

/// Convert a Buienradar-style intensity code (0–255) to mm/h.
///
/// `10^((code - 109) / 32)` for positive codes, `0` otherwise.
pub fn intensity_to_rate(code: i64) -> f64 {
    if code > 0 {
        10f64.powf((code as f64 - 109.0) / 32.0)
    } else {
        0.0
    }
}
