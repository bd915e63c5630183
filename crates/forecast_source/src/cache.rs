//! Boundary-aligned cache of one provider's parsed samples.
//!
//! Providers publish on a fixed cadence, so staleness is decided by
//! whether `now` has reached the next cadence boundary after the last
//! refresh, not by the cache's age. Boundaries sit on the 5-minute wall
//! clock grid unless the upstream said when its data was published; then
//! they sit on that publication grid instead.

use chrono::{DateTime, Duration, Utc};
use common::time::next_boundary_after;
use common::ForecastSample;

#[derive(Debug, Clone, Default)]
pub struct SourceCache {
    last_refreshed: Option<DateTime<Utc>>,
    published_at: Option<DateTime<Utc>>,
    samples: Vec<ForecastSample>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed
    }

    pub fn samples(&self) -> &[ForecastSample] {
        &self.samples
    }

    /// Upstream publication instant of the cached data, when known.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    /// Instant from which the cache counts as stale; `None` if never refreshed.
    pub fn next_refresh(&self, interval: Duration) -> Option<DateTime<Utc>> {
        let refreshed = self.last_refreshed?;
        match self.published_at {
            Some(published) if published <= refreshed => {
                // First publication-grid point strictly after the fetch.
                let step = interval.num_seconds().max(1);
                let elapsed = (refreshed - published).num_seconds();
                let cycles = elapsed / step + 1;
                Some(published + Duration::seconds(cycles * step))
            }
            _ => Some(next_boundary_after(refreshed, interval)),
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.next_refresh(interval) {
            Some(boundary) => now >= boundary,
            None => true,
        }
    }

    /// Swap in a freshly parsed sequence. Never merges with the old one.
    pub fn replace(
        &mut self,
        refreshed_at: DateTime<Utc>,
        published_at: Option<DateTime<Utc>>,
        samples: Vec<ForecastSample>,
    ) {
        self.last_refreshed = Some(refreshed_at);
        self.published_at = published_at;
        self.samples = samples;
    }

    /// First sample starting at or after `at`. Samples are ascending.
    pub fn first_at_or_after(&self, at: DateTime<Utc>) -> Option<&ForecastSample> {
        self.samples.iter().find(|s| s.time >= at)
    }
}
