//! Watcher configuration types.

use chrono::FixedOffset;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::time::ClockZone;
use crate::Error;

/// Top-level watcher configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Latitude of the watched location, degrees in [-90, 90].
    #[serde(default)]
    pub latitude: Option<f64>,

    /// Longitude of the watched location, degrees in [-180, 180].
    #[serde(default)]
    pub longitude: Option<f64>,

    /// Timing parameters (seconds).
    #[serde(default)]
    pub timing: TimingConfig,

    /// Upstream fetch and retry settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Scan horizon settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Provider clock settings.
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl WatchConfig {
    /// Validated location, or a config error naming every invalid coordinate.
    pub fn location(&self) -> Result<Location, Error> {
        Location::new(
            self.latitude.unwrap_or(f64::NAN),
            self.longitude.unwrap_or(f64::NAN),
        )
    }
}

/// Scheduling intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Seconds between periodic rain checks. `0` disables periodic checks.
    #[serde(default = "default_rain_check_interval")]
    pub rain_check_interval_secs: u64,

    /// Delay before the first (forced) scan after startup.
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,
}

/// Retrying fetcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Retries after the first failed attempt (at least one is always made).
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Double the delay after each failed attempt.
    #[serde(default = "default_true")]
    pub exponential: bool,

    /// Per-request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Consensus scan shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Spacing of scanned slots; matches the providers' sampling grid.
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,

    /// Offset of the last scanned slot.
    #[serde(default = "default_horizon_minutes")]
    pub horizon_minutes: u32,
}

/// Provider clock settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// IANA zone of the providers' "HH:mm" labels. `Europe/Amsterdam` when unset.
    #[serde(default)]
    pub timezone: Option<String>,

    /// Fixed UTC offset for the labels. Takes precedence over `timezone`.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

impl ProvidersConfig {
    pub fn clock_zone(&self) -> Result<ClockZone, Error> {
        if let Some(minutes) = self.utc_offset_minutes {
            return minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .map(ClockZone::Fixed)
                .ok_or_else(|| {
                    Error::Config(format!("utc_offset_minutes out of range: {}", minutes))
                });
        }
        match self.timezone.as_deref() {
            None => Ok(ClockZone::default()),
            Some(name) => name
                .trim()
                .parse::<Tz>()
                .map(ClockZone::Named)
                .map_err(|e| Error::Config(format!("unknown timezone {:?}: {}", name, e))),
        }
    }
}

// ── Location ──────────────────────────────────────────────────────────

/// A validated coordinate pair. Only constructible through [`Location::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    latitude: f64,
    longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, Error> {
        let mut issues: Vec<&str> = Vec::new();
        if !(latitude.is_finite() && latitude.abs() <= 90.0) {
            issues.push("Invalid latitude.");
        }
        if !(longitude.is_finite() && longitude.abs() <= 180.0) {
            issues.push("Invalid longitude.");
        }

        if issues.is_empty() {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(Error::Config(format!(
                "Invalid configuration detected:\n - {}",
                issues.join("\n - ")
            )))
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Latitude quantized to 2 decimals, as sent upstream.
    pub fn lat_param(&self) -> String {
        format!("{:.2}", self.latitude)
    }

    /// Longitude quantized to 2 decimals, as sent upstream.
    pub fn lon_param(&self) -> String {
        format!("{:.2}", self.longitude)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_rain_check_interval() -> u64 {
    300
}
fn default_startup_delay() -> u64 {
    1
}
fn default_retry_count() -> u32 {
    5
}
fn default_retry_delay_ms() -> u64 {
    2000
}
fn default_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    "rain-watch/0.1".into()
}
fn default_slot_minutes() -> u32 {
    5
}
fn default_horizon_minutes() -> u32 {
    110
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            rain_check_interval_secs: default_rain_check_interval(),
            startup_delay_secs: default_startup_delay(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            exponential: default_true(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_minutes: default_slot_minutes(),
            horizon_minutes: default_horizon_minutes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_bounds() {
        assert!(Location::new(51.42, 5.44).is_ok());
        assert!(Location::new(-90.0, 180.0).is_ok());
        assert!(Location::new(90.5, 5.0).is_err());
        assert!(Location::new(51.0, -180.01).is_err());
        assert!(Location::new(f64::NAN, 5.0).is_err());
    }

    #[test]
    fn test_location_reports_both_issues() {
        let err = Location::new(100.0, 200.0).expect_err("both invalid");
        let msg = err.to_string();
        assert!(msg.contains("Invalid latitude."));
        assert!(msg.contains("Invalid longitude."));
    }

    #[test]
    fn test_missing_coordinates_are_invalid() {
        let cfg = WatchConfig::default();
        assert!(cfg.location().is_err());
    }

    #[test]
    fn test_quantized_params() {
        let loc = Location::new(51.42408, 5.442794).expect("valid");
        assert_eq!(loc.lat_param(), "51.42");
        assert_eq!(loc.lon_param(), "5.44");
    }

    #[test]
    fn test_defaults_match_provider_cadence() {
        let cfg = WatchConfig::default();
        assert_eq!(cfg.timing.rain_check_interval_secs, 300);
        assert_eq!(cfg.engine.slot_minutes, 5);
        assert_eq!(cfg.engine.horizon_minutes, 110);
        assert_eq!(cfg.fetch.retry_count, 5);
        assert_eq!(
            cfg.providers.clock_zone().expect("default zone"),
            ClockZone::Named(chrono_tz::Europe::Amsterdam)
        );
    }

    #[test]
    fn test_clock_zone_selection() {
        let fixed = ProvidersConfig {
            timezone: Some("Europe/London".into()),
            utc_offset_minutes: Some(120),
        };
        assert_eq!(
            fixed.clock_zone().expect("valid offset"),
            ClockZone::Fixed(FixedOffset::east_opt(7200).expect("valid offset"))
        );

        let named = ProvidersConfig {
            timezone: Some("Europe/London".into()),
            utc_offset_minutes: None,
        };
        assert_eq!(
            named.clock_zone().expect("known zone"),
            ClockZone::Named(chrono_tz::Europe::London)
        );

        let bogus = ProvidersConfig {
            timezone: Some("Mars/Olympus".into()),
            utc_offset_minutes: None,
        };
        assert!(matches!(bogus.clock_zone(), Err(Error::Config(_))));

        let out_of_range = ProvidersConfig {
            timezone: None,
            utc_offset_minutes: Some(24 * 60),
        };
        assert!(out_of_range.clock_zone().is_err());
    }
}
