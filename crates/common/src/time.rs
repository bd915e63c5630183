//! Time-grid helpers shared by the forecast sources and the engine.

use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::Error;

/// Native sampling interval of both rain providers.
pub const SAMPLE_INTERVAL_MINUTES: i64 = 5;

/// Round `t` down to the nearest multiple of `interval` since the epoch.
pub fn floor_to_interval(t: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let secs = interval.num_seconds().max(1);
    let rem = t.timestamp().rem_euclid(secs);
    t - Duration::seconds(rem) - Duration::nanoseconds(i64::from(t.timestamp_subsec_nanos()))
}

/// First interval boundary strictly after `t`.
pub fn next_boundary_after(t: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    floor_to_interval(t, interval) + Duration::seconds(interval.num_seconds().max(1))
}

/// Time zone in which the providers print their "HH:mm" labels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockZone {
    /// A fixed UTC offset, ignoring daylight saving.
    Fixed(FixedOffset),
    /// An IANA zone with its daylight-saving rules.
    Named(Tz),
}

impl Default for ClockZone {
    /// Both providers publish Dutch wall-clock time.
    fn default() -> Self {
        ClockZone::Named(chrono_tz::Europe::Amsterdam)
    }
}

/// Resolve a provider wall-clock label ("HH:mm" in `zone`) to the UTC
/// instant closest to `now`.
///
/// Upstreams only send the clock time, so around midnight the label may
/// belong to yesterday or tomorrow; the candidate nearest to `now` wins.
/// The same applies to the repeated hour when daylight saving ends.
pub fn resolve_clock_time(
    label: &str,
    now: DateTime<Utc>,
    zone: ClockZone,
) -> Result<DateTime<Utc>, Error> {
    let clock = NaiveTime::parse_from_str(label.trim(), "%H:%M").map_err(|e| {
        Error::MalformedUpstreamResponse(format!("invalid clock time {:?}: {}", label, e))
    })?;

    let nearest = match zone {
        ClockZone::Fixed(offset) => nearest_local(clock, now, &offset),
        ClockZone::Named(tz) => nearest_local(clock, now, &tz),
    };
    nearest.ok_or_else(|| {
        Error::MalformedUpstreamResponse(format!("unresolvable clock time {:?}", label))
    })
}

fn nearest_local<Z: TimeZone>(
    clock: NaiveTime,
    now: DateTime<Utc>,
    zone: &Z,
) -> Option<DateTime<Utc>> {
    let local_today = now.with_timezone(zone).date_naive();
    [-1i64, 0, 1]
        .iter()
        .flat_map(|days| {
            let date = local_today + Duration::days(*days);
            match zone.from_local_datetime(&date.and_time(clock)) {
                LocalResult::Single(t) => vec![t],
                LocalResult::Ambiguous(earlier, later) => vec![earlier, later],
                LocalResult::None => Vec::new(),
            }
        })
        .map(|t| t.with_timezone(&Utc))
        .min_by_key(|candidate| (*candidate - now).num_seconds().abs())
}

/// Format a UTC instant as "HH:mm" in `zone`.
pub fn clock_label(t: DateTime<Utc>, zone: ClockZone) -> String {
    match zone {
        ClockZone::Fixed(offset) => t.with_timezone(&offset).format("%H:%M").to_string(),
        ClockZone::Named(tz) => t.with_timezone(&tz).format("%H:%M").to_string(),
    }
}
