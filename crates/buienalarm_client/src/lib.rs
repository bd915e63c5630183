//! Buienalarm forecast client.
//!
//! Fetches the 3.4 `forecast.php` JSON, whose `precip` array holds one
//! mm/h value per `delta` seconds starting at `start` (epoch seconds, with
//! `start_human` as a Dutch wall-clock fallback). The CDN's `Age` header
//! tells how long ago the payload was produced.

use chrono::{DateTime, Duration, Utc};
use common::time::{
    clock_label, floor_to_interval, resolve_clock_time, ClockZone, SAMPLE_INTERVAL_MINUTES,
};
use common::{Error, ForecastSample, Location};
use forecast_source::{FetchResponse, ForecastProvider, ParsedForecast};
use serde::Deserialize;
use tracing::debug;

const FORECAST_URL: &str = "https://cdn-secure.buienalarm.nl/api/3.4/forecast.php";

/// Ages beyond this are treated as a misbehaving cache.
const MAX_AGE_SECS: u64 = 3600;

/// Raw `forecast.php` payload.
#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    /// Start of the first slot, epoch seconds.
    #[serde(default)]
    pub start: Option<i64>,
    /// Start of the first slot, "HH:mm" Dutch local time.
    #[serde(default)]
    pub start_human: Option<String>,
    /// Seconds between slots.
    #[serde(default)]
    pub delta: Option<i64>,
    /// Rate per slot in mm/h.
    pub precip: Vec<f64>,
}

/// Buienalarm provider. `start_human` and labels are read in `zone`.
#[derive(Debug, Clone, Default)]
pub struct Buienalarm {
    zone: ClockZone,
}

impl Buienalarm {
    pub fn new(zone: ClockZone) -> Self {
        Self { zone }
    }
}

impl ForecastProvider for Buienalarm {
    fn name(&self) -> &'static str {
        "buienalarm"
    }

    fn url(&self, location: &Location, now: DateTime<Utc>) -> String {
        format!(
            "{}?lat={}&lon={}&region=nl&unit=mm/u&rnd={}",
            FORECAST_URL,
            location.lat_param(),
            location.lon_param(),
            now.timestamp_millis()
        )
    }

    fn parse(
        &self,
        response: &FetchResponse,
        now: DateTime<Utc>,
    ) -> Result<ParsedForecast, Error> {
        let samples = parse_forecast(&response.body, now, self.zone)?;
        let published_at = response
            .age_secs
            .map(|age| now - Duration::seconds(age.min(MAX_AGE_SECS) as i64));
        Ok(ParsedForecast {
            samples,
            published_at,
        })
    }
}

/// Parse a `forecast.php` body into ascending samples, dropping slots
/// before `now`'s 5-minute slot.
pub fn parse_forecast(
    body: &str,
    now: DateTime<Utc>,
    zone: ClockZone,
) -> Result<Vec<ForecastSample>, Error> {
    let payload: ForecastResponse = serde_json::from_str(body)
        .map_err(|e| Error::MalformedUpstreamResponse(format!("buienalarm JSON: {}", e)))?;

    let start = match (payload.start, payload.start_human.as_deref()) {
        (Some(epoch), _) => DateTime::from_timestamp(epoch, 0).ok_or_else(|| {
            Error::MalformedUpstreamResponse(format!("start out of range: {}", epoch))
        })?,
        (None, Some(label)) => resolve_clock_time(label, now, zone)?,
        (None, None) => {
            return Err(Error::MalformedUpstreamResponse(
                "buienalarm payload has neither start nor start_human".into(),
            ))
        }
    };

    let delta = payload.delta.unwrap_or(SAMPLE_INTERVAL_MINUTES * 60);
    if delta <= 0 {
        return Err(Error::MalformedUpstreamResponse(format!(
            "invalid delta: {}",
            delta
        )));
    }

    let current_slot = floor_to_interval(now, Duration::minutes(SAMPLE_INTERVAL_MINUTES));
    let total = payload.precip.len();
    let mut samples = Vec::with_capacity(total);
    for (i, rate) in payload.precip.into_iter().enumerate() {
        let time = slot_time(start, delta, i)?;
        if time < current_slot {
            continue;
        }
        samples.push(ForecastSample {
            time,
            label: clock_label(time, zone),
            rate: clamp_rate(rate),
            code: None,
        });
    }

    debug!(
        "buienalarm: parsed {} slots, {} current or future",
        total,
        samples.len()
    );

    Ok(samples)
}

/// Negative and non-finite rates read as dry.
fn clamp_rate(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.max(0.0)
    } else {
        0.0
    }
}

/// `start + delta * index`, or a malformed-response error on overflow.
fn slot_time(start: DateTime<Utc>, delta: i64, index: usize) -> Result<DateTime<Utc>, Error> {
    i64::try_from(index)
        .ok()
        .and_then(|i| delta.checked_mul(i))
        .and_then(Duration::try_seconds)
        .and_then(|offset| start.checked_add_signed(offset))
        .ok_or_else(|| {
            Error::MalformedUpstreamResponse(format!(
                "slot {} at delta {}s is out of range",
                index, delta
            ))
        })
}
