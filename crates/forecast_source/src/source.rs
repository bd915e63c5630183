//! A provider endpoint plus its lazily refreshed cache.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use common::time::next_boundary_after;
use common::{Error, ForecastSample, Location};
use tracing::{debug, info, warn};

use crate::cache::SourceCache;
use crate::fetch::{FetchResponse, Fetcher};

/// Output of parsing one upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedForecast {
    /// Ascending, one per upstream interval.
    pub samples: Vec<ForecastSample>,
    /// When the upstream produced this data, if it says so.
    pub published_at: Option<DateTime<Utc>>,
}

/// Provider-specific knowledge: where to fetch and how to read the answer.
pub trait ForecastProvider: Send + Sync {
    /// Short name used in logs and snapshots.
    fn name(&self) -> &'static str;

    /// Cadence at which the upstream publishes new data.
    fn refresh_interval(&self) -> Duration {
        Duration::minutes(5)
    }

    /// Request URL, including the anti-cache token derived from `now`.
    fn url(&self, location: &Location, now: DateTime<Utc>) -> String;

    /// Parse a successful response. Samples before `now`'s slot are dropped.
    fn parse(&self, response: &FetchResponse, now: DateTime<Utc>)
        -> Result<ParsedForecast, Error>;
}

/// What the consensus engine needs from a source.
pub trait RainSource: Send {
    fn name(&self) -> &'static str;

    /// Forecast covering `at`, refreshing first if the cache is stale at `now`.
    fn forecast_at(
        &mut self,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<ForecastSample, Error>> + Send;

    /// Copy of the currently cached samples.
    fn snapshot(&self) -> Vec<ForecastSample>;
}

/// One upstream endpoint with its exclusively owned cache.
#[derive(Debug)]
pub struct ForecastSource<P, F> {
    provider: P,
    fetcher: F,
    location: Location,
    cache: SourceCache,
    /// After a failed refresh, no new attempt before this boundary.
    retry_not_before: Option<DateTime<Utc>>,
    last_error: Option<String>,
    fetch_count: u64,
}

impl<P: ForecastProvider, F: Fetcher> ForecastSource<P, F> {
    pub fn new(provider: P, fetcher: F, location: Location) -> Self {
        Self {
            provider,
            fetcher,
            location,
            cache: SourceCache::new(),
            retry_not_before: None,
            last_error: None,
            fetch_count: 0,
        }
    }

    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }

    /// Number of upstream fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count
    }

    pub async fn refresh(&mut self) -> Result<bool, Error> {
        self.refresh_at(Utc::now()).await
    }

    /// Refresh the cache if stale at `now`. Returns whether a fetch happened.
    ///
    /// On failure the previous samples stay in place and the error is
    /// returned. A failed source is not retried before the next boundary.
    pub async fn refresh_at(&mut self, now: DateTime<Utc>) -> Result<bool, Error> {
        let name = self.provider.name();
        let interval = self.provider.refresh_interval();

        if !self.cache.is_stale(now, interval) {
            debug!("{}: using cached forecast ({} samples)", name, self.cache.samples().len());
            return Ok(false);
        }

        if let Some(not_before) = self.retry_not_before {
            if now < not_before {
                return Err(Error::UpstreamUnavailable(format!(
                    "{} unavailable until {} ({})",
                    name,
                    not_before.format("%H:%M:%S"),
                    self.last_error.as_deref().unwrap_or("unknown error")
                )));
            }
        }

        let url = self.provider.url(&self.location, now);
        self.fetch_count += 1;
        let parsed = match self.fetcher.get(&url).await {
            Ok(resp) => self.provider.parse(&resp, now),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(parsed) => {
                // A publication time from the future is clock skew; treat it as now.
                let published_at = parsed.published_at.map(|published| published.min(now));
                self.cache.replace(now, published_at, parsed.samples);
                info!(
                    "{}: refreshed {} samples, next refresh at {}",
                    name,
                    self.cache.samples().len(),
                    self.cache
                        .next_refresh(interval)
                        .map(|t| t.format("%H:%M:%S").to_string())
                        .unwrap_or_default()
                );
                self.retry_not_before = None;
                self.last_error = None;
                Ok(true)
            }
            Err(e) => {
                warn!("{}: refresh failed, keeping previous cache: {}", name, e);
                self.retry_not_before = Some(next_boundary_after(now, interval));
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// First cached sample at or after `at`, refreshing first when stale.
    ///
    /// A failed refresh makes the source absent for this lookup even if the
    /// old cache would cover `at`. The old samples stay in place for
    /// snapshots.
    pub async fn get_forecast(
        &mut self,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ForecastSample, Error> {
        self.refresh_at(now).await?;
        self.cache.first_at_or_after(at).cloned().ok_or_else(|| {
            Error::NoDataAvailable(format!(
                "{} has no sample at or after {} ({} cached)",
                self.provider.name(),
                at.format("%H:%M"),
                self.cache.samples().len()
            ))
        })
    }
}

impl<P: ForecastProvider, F: Fetcher> RainSource for ForecastSource<P, F> {
    fn name(&self) -> &'static str {
        self.provider.name()
    }

    async fn forecast_at(
        &mut self,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ForecastSample, Error> {
        self.get_forecast(at, now).await
    }

    fn snapshot(&self) -> Vec<ForecastSample> {
        self.cache.samples().to_vec()
    }
}
