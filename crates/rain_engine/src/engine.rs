//! Consensus scan over the forecast horizon.
//!
//! Each scan walks the slots `0, 5, …, horizon` minutes ahead of the
//! 5-minute-aligned current time, strictly in order. The first slot with a
//! verdict is "now"; the first later slot with a different classification
//! at full confidence is the predicted change and ends the scan. Slots
//! where the sources disagree never count as a change.

use chrono::{DateTime, Duration, Utc};
use common::config::EngineConfig;
use common::time::floor_to_interval;
use common::{Classification, Confidence, RainState, SlotVerdict, SourceSnapshot};
use forecast_source::RainSource;
use tracing::{debug, error, warn};

use crate::classify::evaluate_slot;
use crate::publisher::Publisher;

/// Which offsets a scan visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPlan {
    pub slot_minutes: u32,
    pub horizon_minutes: u32,
}

impl ScanPlan {
    /// Offsets in ascending order, `0` through `horizon_minutes` inclusive.
    pub fn offsets(&self) -> impl Iterator<Item = u32> {
        (0..=self.horizon_minutes).step_by(self.slot_minutes.max(1) as usize)
    }

    fn slot_interval(&self) -> Duration {
        Duration::minutes(i64::from(self.slot_minutes.max(1)))
    }
}

impl Default for ScanPlan {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ScanPlan {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            slot_minutes: cfg.slot_minutes,
            horizon_minutes: cfg.horizon_minutes,
        }
    }
}

/// The consensus engine for one location.
pub struct RainEngine<R, A> {
    radar: R,
    alarm: A,
    plan: ScanPlan,
    publisher: Publisher,
}

impl<R: RainSource, A: RainSource> RainEngine<R, A> {
    pub fn new(radar: R, alarm: A, plan: ScanPlan, publisher: Publisher) -> Self {
        Self {
            radar,
            alarm,
            plan,
            publisher,
        }
    }

    pub fn radar(&self) -> &R {
        &self.radar
    }

    pub fn alarm(&self) -> &A {
        &self.alarm
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Scan now and publish on change. Returns the state if it was published.
    pub async fn check_rain(&mut self, force: bool) -> Option<RainState> {
        self.check_rain_at(Utc::now(), force).await
    }

    pub async fn check_rain_at(&mut self, now: DateTime<Utc>, force: bool) -> Option<RainState> {
        let Some(state) = self.scan(now).await else {
            debug!("no source produced a verdict, nothing to publish");
            return None;
        };

        if self.publisher.publish_state(state.clone(), force) {
            Some(state)
        } else {
            None
        }
    }

    /// Build a rain state without publishing it.
    ///
    /// Source failures are published as `rain-error` events and the source
    /// is treated as absent for that slot; they never abort the scan.
    pub async fn scan(&mut self, now: DateTime<Utc>) -> Option<RainState> {
        let after = floor_to_interval(now, self.plan.slot_interval());
        let mut current: Option<SlotVerdict> = None;
        let mut predicted: Option<SlotVerdict> = None;

        for offset in self.plan.offsets() {
            let at = after + Duration::minutes(i64::from(offset));

            let radar_rate = lookup(&mut self.radar, at, now, &self.publisher).await;
            let alarm_rate = lookup(&mut self.alarm, at, now, &self.publisher).await;

            let Some(verdict) = evaluate_slot(at, offset, radar_rate, alarm_rate) else {
                debug!("+{}m: both sources absent, skipping slot", offset);
                continue;
            };
            debug!(
                "+{}m: radar={:?} alarm={:?} avg={:.2} -> {} ({}%)",
                offset,
                radar_rate,
                alarm_rate,
                verdict.average_rate,
                verdict.classification,
                verdict.confidence.percent()
            );

            match current {
                None => current = Some(verdict),
                Some(ref first)
                    if verdict.classification != first.classification
                        && verdict.confidence == Confidence::Full =>
                {
                    predicted = Some(verdict);
                    break;
                }
                Some(_) => {}
            }
        }

        let current = current?;
        let predicted = predicted.unwrap_or_else(|| current.clone());
        let message = describe(&current, &predicted, self.plan.horizon_minutes);

        Some(RainState {
            observed_at: after,
            current,
            predicted,
            message,
            sources: SourceSnapshot {
                buienradar: self.radar.snapshot(),
                buienalarm: self.alarm.snapshot(),
            },
        })
    }
}

async fn lookup<S: RainSource>(
    source: &mut S,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
    publisher: &Publisher,
) -> Option<f64> {
    match source.forecast_at(at, now).await {
        Ok(sample) => Some(sample.rate),
        Err(e) => {
            let message = format!("{} lookup for {} failed: {}", source.name(), at.format("%H:%M"), e);
            if e.is_recoverable() {
                warn!("{}", message);
            } else {
                error!("{}", message);
            }
            publisher.publish_error(message);
            None
        }
    }
}

fn phrase(classification: Classification) -> &'static str {
    match classification {
        Classification::Dry => "dry",
        Classification::Light => "light rain",
        Classification::Moderate => "moderate rain",
        Classification::Heavy => "heavy rain",
    }
}

fn capitalized(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Human-readable summary of a scan.
pub fn describe(current: &SlotVerdict, predicted: &SlotVerdict, horizon_minutes: u32) -> String {
    let mut message = capitalized(phrase(current.classification));
    if current.confidence == Confidence::Partial {
        message.push_str(" (sources disagree)");
    }

    if predicted.classification == current.classification {
        message.push_str(&format!(
            ", no change expected in the next {} minutes",
            horizon_minutes
        ));
    } else if predicted.classification == Classification::Dry {
        message.push_str(&format!(
            ", stopping in {} minutes",
            predicted.offset_minutes
        ));
    } else {
        message.push_str(&format!(
            ", {} expected in {} minutes",
            phrase(predicted.classification),
            predicted.offset_minutes
        ));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{utc, ScriptedSource};
    use common::RainEvent;

    fn engine(
        radar: Vec<Option<f64>>,
        alarm: Vec<Option<f64>>,
    ) -> (
        RainEngine<ScriptedSource, ScriptedSource>,
        tokio::sync::mpsc::UnboundedReceiver<RainEvent>,
    ) {
        let base = utc("2026-06-01T12:00:00Z");
        let (publisher, rx) = Publisher::channel();
        let engine = RainEngine::new(
            ScriptedSource::new("buienradar", base, radar),
            ScriptedSource::new("buienalarm", base, alarm),
            ScanPlan::default(),
            publisher,
        );
        (engine, rx)
    }

    fn now() -> DateTime<Utc> {
        utc("2026-06-01T12:02:40Z")
    }

    fn count_states(rx: &mut tokio::sync::mpsc::UnboundedReceiver<RainEvent>) -> usize {
        let mut states = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, RainEvent::State(_)) {
                states += 1;
            }
        }
        states
    }

    #[test]
    fn test_default_plan_has_23_slots() {
        let offsets: Vec<u32> = ScanPlan::default().offsets().collect();
        assert_eq!(offsets.len(), 23);
        assert_eq!(offsets.first(), Some(&0));
        assert_eq!(offsets.last(), Some(&110));
    }

    #[tokio::test]
    async fn test_early_exit_on_first_confirmed_change() {
        let rates = vec![Some(0.0), Some(0.0), Some(0.5), Some(0.5), Some(0.5)];
        let (mut engine, _rx) = engine(rates.clone(), rates);

        let state = engine.scan(now()).await.expect("verdict");
        assert_eq!(state.observed_at, utc("2026-06-01T12:00:00Z"));
        assert_eq!(state.current.classification, Classification::Dry);
        assert_eq!(state.predicted.classification, Classification::Light);
        assert_eq!(state.predicted.offset_minutes, 10);
        assert_eq!(state.predicted.time, utc("2026-06-01T12:10:00Z"));
        assert_eq!(engine.radar().queried, vec![0, 5, 10]);
        assert_eq!(engine.alarm().queried, vec![0, 5, 10]);
    }

    #[tokio::test]
    async fn test_horizon_exhaustion_carries_current_forward() {
        let dry = vec![Some(0.0); 23];
        let (mut engine, _rx) = engine(dry.clone(), dry);

        let state = engine.scan(now()).await.expect("verdict");
        assert_eq!(state.predicted, state.current);
        assert!(!state.expects_change());
        assert_eq!(engine.radar().queried.len(), 23);
        assert_eq!(
            state.message,
            "Dry, no change expected in the next 110 minutes"
        );
    }

    #[tokio::test]
    async fn test_disagreement_is_not_a_transition() {
        let radar = vec![Some(0.0), Some(0.0), Some(0.5), Some(0.5)];
        let alarm = vec![Some(0.0), Some(0.0), Some(0.0), Some(0.0)];
        let (mut engine, _rx) = engine(radar, alarm);

        let state = engine.scan(now()).await.expect("verdict");
        assert_eq!(state.current.classification, Classification::Dry);
        assert_eq!(state.predicted, state.current);
    }

    #[tokio::test]
    async fn test_one_source_absent_still_yields_verdict() {
        let (mut engine, mut rx) = engine(vec![None; 23], vec![Some(0.3); 23]);

        let state = engine.scan(now()).await.expect("verdict");
        assert_eq!(state.current.classification, Classification::Light);
        assert_eq!(state.current.confidence, Confidence::Partial);
        assert_eq!(state.current.radar_rate, None);
        assert_eq!(state.current.alarm_rate, Some(0.3));

        let errors = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, RainEvent::Error(_)))
            .count();
        assert_eq!(errors, 23);
    }

    #[tokio::test]
    async fn test_double_absent_slot_is_skipped() {
        let radar = vec![None, Some(0.0), Some(0.0)];
        let alarm = vec![None, Some(0.0), Some(0.0)];
        let (mut engine, _rx) = engine(radar, alarm);

        let state = engine.scan(now()).await.expect("verdict");
        assert_eq!(state.current.offset_minutes, 5);
        assert!(state.predicted.offset_minutes >= state.current.offset_minutes);
    }

    #[tokio::test]
    async fn test_total_outage_publishes_no_state() {
        let (mut engine, mut rx) = engine(Vec::new(), Vec::new());

        assert!(engine.check_rain_at(now(), true).await.is_none());
        assert_eq!(count_states(&mut rx), 0);
        assert!(engine.publisher().last_published().is_none());
    }

    #[tokio::test]
    async fn test_repeated_check_publishes_once() {
        let rates = vec![Some(0.0), Some(0.0), Some(0.5), Some(0.5)];
        let (mut engine, mut rx) = engine(rates.clone(), rates);

        assert!(engine.check_rain_at(now(), false).await.is_some());
        assert!(engine
            .check_rain_at(now() + Duration::seconds(5), false)
            .await
            .is_none());
        assert_eq!(count_states(&mut rx), 1);
    }

    #[tokio::test]
    async fn test_forced_check_republishes() {
        let rates = vec![Some(0.0); 23];
        let (mut engine, mut rx) = engine(rates.clone(), rates);

        assert!(engine.check_rain_at(now(), true).await.is_some());
        assert!(engine.check_rain_at(now(), true).await.is_some());
        assert_eq!(count_states(&mut rx), 2);
    }

    #[tokio::test]
    async fn test_snapshot_attached_to_state() {
        let (mut engine, _rx) = engine(vec![Some(0.0), Some(0.1)], vec![Some(0.2)]);

        let state = engine.scan(now()).await.expect("verdict");
        assert_eq!(state.sources.buienradar.len(), 2);
        assert_eq!(state.sources.buienalarm.len(), 1);
    }

    #[test]
    fn test_describe_messages() {
        let at = utc("2026-06-01T12:00:00Z");
        let dry = evaluate_slot(at, 0, Some(0.0), Some(0.0)).expect("verdict");
        let light = evaluate_slot(at, 10, Some(0.4), Some(0.4)).expect("verdict");
        let stop = evaluate_slot(at, 25, Some(0.0), Some(0.0)).expect("verdict");
        let wet_now = evaluate_slot(at, 0, Some(3.0), Some(3.0)).expect("verdict");
        let unsure = evaluate_slot(at, 0, Some(0.0), Some(0.6)).expect("verdict");

        assert_eq!(describe(&dry, &light, 110), "Dry, light rain expected in 10 minutes");
        assert_eq!(describe(&wet_now, &stop, 110), "Heavy rain, stopping in 25 minutes");
        assert_eq!(
            describe(&unsure, &unsure, 110),
            "Light rain (sources disagree), no change expected in the next 110 minutes"
        );
    }
}
