//! Scripted sources for engine and monitor tests.

use chrono::{DateTime, Duration, Utc};
use common::{Error, ForecastSample};
use forecast_source::RainSource;

pub(crate) fn utc(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

/// Answers from a fixed list of rates, one per 5-minute slot after `base`.
/// `None` entries (and anything past the list) fail like an outage.
pub(crate) struct ScriptedSource {
    name: &'static str,
    base: DateTime<Utc>,
    rates: Vec<Option<f64>>,
    /// Offsets (minutes after `base`) in the order they were asked for.
    pub queried: Vec<u32>,
}

impl ScriptedSource {
    pub(crate) fn new(name: &'static str, base: DateTime<Utc>, rates: Vec<Option<f64>>) -> Self {
        Self {
            name,
            base,
            rates,
            queried: Vec::new(),
        }
    }

    fn sample(&self, index: usize, rate: f64) -> ForecastSample {
        ForecastSample {
            time: self.base + Duration::minutes(5 * index as i64),
            label: String::new(),
            rate,
            code: None,
        }
    }
}

impl RainSource for ScriptedSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn forecast_at(
        &mut self,
        at: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<ForecastSample, Error> {
        let offset = (at - self.base).num_minutes();
        self.queried.push(offset as u32);

        let index = (offset / 5) as usize;
        match self.rates.get(index).copied().flatten() {
            Some(rate) => Ok(self.sample(index, rate)),
            None => Err(Error::UpstreamUnavailable(format!(
                "{} scripted outage at +{}m",
                self.name, offset
            ))),
        }
    }

    fn snapshot(&self) -> Vec<ForecastSample> {
        self.rates
            .iter()
            .enumerate()
            .filter_map(|(i, rate)| rate.map(|r| self.sample(i, r)))
            .collect()
    }
}
