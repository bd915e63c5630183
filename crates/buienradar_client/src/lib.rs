//! Buienradar rain-text client.
//!
//! `gpsgadget.buienradar.nl/data/raintext` answers with one
//! `code|HH:mm` row per 5-minute slot for the next two hours. Codes are
//! Buienradar's logarithmic intensity scale; clock labels are Dutch local
//! time.

use chrono::{DateTime, Duration, Utc};
use common::time::{floor_to_interval, resolve_clock_time, ClockZone, SAMPLE_INTERVAL_MINUTES};
use common::{Error, ForecastSample, Location};
use forecast_source::{intensity_to_rate, FetchResponse, ForecastProvider, ParsedForecast};
use tracing::debug;

const RAINTEXT_URL: &str = "https://gpsgadget.buienradar.nl/data/raintext";

/// Buienradar provider. Labels are read in `zone` (Dutch time by default).
#[derive(Debug, Clone, Default)]
pub struct Buienradar {
    zone: ClockZone,
}

impl Buienradar {
    pub fn new(zone: ClockZone) -> Self {
        Self { zone }
    }
}

impl ForecastProvider for Buienradar {
    fn name(&self) -> &'static str {
        "buienradar"
    }

    fn url(&self, location: &Location, now: DateTime<Utc>) -> String {
        format!(
            "{}?lat={}&lon={}&rnd={}",
            RAINTEXT_URL,
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
        let samples = parse_raintext(&response.body, now, self.zone)?;
        Ok(ParsedForecast {
            samples,
            published_at: None,
        })
    }
}

/// One `code|HH:mm` row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RainRow<'a> {
    code: i64,
    label: &'a str,
}

fn parse_row(line: &str) -> Result<RainRow<'_>, Error> {
    let (code, label) = line
        .split_once('|')
        .ok_or_else(|| Error::MalformedUpstreamResponse(format!("row without '|': {:?}", line)))?;
    let code = code.trim().parse::<i64>().map_err(|e| {
        Error::MalformedUpstreamResponse(format!("invalid intensity code {:?}: {}", code, e))
    })?;
    Ok(RainRow {
        code,
        label: label.trim(),
    })
}

/// Parse a raintext body into ascending samples.
///
/// Sample `i` starts at `first row's clock time + i * 5 minutes`; rows
/// before `now`'s 5-minute slot are dropped.
pub fn parse_raintext(
    body: &str,
    now: DateTime<Utc>,
    zone: ClockZone,
) -> Result<Vec<ForecastSample>, Error> {
    let rows = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_row)
        .collect::<Result<Vec<_>, Error>>()?;

    let first = rows
        .first()
        .ok_or_else(|| Error::MalformedUpstreamResponse("empty raintext body".into()))?;
    let start = resolve_clock_time(first.label, now, zone)?;
    let interval = Duration::minutes(SAMPLE_INTERVAL_MINUTES);
    let current_slot = floor_to_interval(now, interval);

    let samples: Vec<ForecastSample> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| ForecastSample {
            time: start + interval * i as i32,
            label: row.label.to_string(),
            rate: intensity_to_rate(row.code),
            code: Some(row.code),
        })
        .filter(|sample| sample.time >= current_slot)
        .collect();

    debug!(
        "buienradar: parsed {} rows, {} current or future",
        rows.len(),
        samples.len()
    );

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    fn cest() -> ClockZone {
        ClockZone::Fixed(FixedOffset::east_opt(2 * 3600).expect("valid offset"))
    }

    fn sample_body() -> &'static str {
        "000|11:55\r\n000|12:00\r\n077|12:05\r\n109|12:10\r\n\n"
    }

    #[test]
    fn test_parse_raintext_maps_rows_to_grid() {
        let now = utc("2026-06-01T10:01:30Z");
        let samples = parse_raintext(sample_body(), now, cest()).expect("parses");

        // 11:55 local is before the current slot and is dropped.
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].time, utc("2026-06-01T10:00:00Z"));
        assert_eq!(samples[0].label, "12:00");
        assert_eq!(samples[0].rate, 0.0);
        assert_eq!(samples[1].time, utc("2026-06-01T10:05:00Z"));
        assert!((samples[1].rate - 0.1).abs() < 1e-12);
        assert_eq!(samples[2].code, Some(109));
        assert!((samples[2].rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_raintext_across_midnight() {
        let cet = ClockZone::Fixed(FixedOffset::east_opt(3600).expect("valid offset"));
        // 23:57 local.
        let now = utc("2026-06-01T22:57:00Z");
        let body = "000|23:55\n100|00:00\n100|00:05\n";
        let samples = parse_raintext(body, now, cet).expect("parses");

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1].time, utc("2026-06-01T23:00:00Z"));
        assert_eq!(samples[1].label, "00:00");
    }

    #[test]
    fn test_parse_raintext_rejects_malformed_rows() {
        let now = utc("2026-06-01T10:00:00Z");
        assert!(matches!(
            parse_raintext("abc|12:00\n", now, cest()),
            Err(Error::MalformedUpstreamResponse(_))
        ));
        assert!(matches!(
            parse_raintext("000 12:00\n", now, cest()),
            Err(Error::MalformedUpstreamResponse(_))
        ));
        assert!(matches!(
            parse_raintext("\n\n", now, cest()),
            Err(Error::MalformedUpstreamResponse(_))
        ));
    }

    #[test]
    fn test_url_quantizes_coordinates() {
        let location = Location::new(51.42408, 5.442794).expect("valid location");
        let now = utc("2026-06-01T10:00:00Z");
        let url = Buienradar::default().url(&location, now);

        assert_eq!(
            url,
            format!(
                "https://gpsgadget.buienradar.nl/data/raintext?lat=51.42&lon=5.44&rnd={}",
                now.timestamp_millis()
            )
        );
    }

    #[test]
    fn test_provider_parse_has_no_publication_time() {
        let now = utc("2026-06-01T10:01:30Z");
        let response = FetchResponse {
            status: 200,
            body: sample_body().into(),
            age_secs: Some(120),
        };
        let parsed = Buienradar::new(cest())
            .parse(&response, now)
            .expect("parses");

        assert_eq!(parsed.published_at, None);
        assert_eq!(parsed.samples.len(), 3);
    }

    #[test]
    fn test_default_zone_reads_dutch_time() {
        // 11:00 UTC in June is 13:00 in Amsterdam.
        let now = utc("2026-06-01T11:01:00Z");
        let response = FetchResponse {
            status: 200,
            body: "000|13:00\n100|13:05\n".into(),
            age_secs: None,
        };
        let parsed = Buienradar::default().parse(&response, now).expect("parses");

        assert_eq!(parsed.samples[0].time, utc("2026-06-01T11:00:00Z"));
        assert_eq!(parsed.samples[1].time, utc("2026-06-01T11:05:00Z"));
    }
}
