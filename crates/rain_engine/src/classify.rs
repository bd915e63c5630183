//! Per-slot classification.

use chrono::{DateTime, Utc};
use common::{Classification, Confidence, SlotVerdict};

/// Lower bound of light rain (mm/h).
pub const RAIN_LIGHT: f64 = 0.2;
/// Lower bound of moderate rain (mm/h).
pub const RAIN_MODERATE: f64 = 1.0;
/// Lower bound of heavy rain (mm/h).
pub const RAIN_HEAVY: f64 = 2.5;

/// Label a rate, checking thresholds from the top.
pub fn classify(rate: f64) -> Classification {
    if rate >= RAIN_HEAVY {
        Classification::Heavy
    } else if rate >= RAIN_MODERATE {
        Classification::Moderate
    } else if rate >= RAIN_LIGHT {
        Classification::Light
    } else {
        Classification::Dry
    }
}

fn is_raining(rate: f64) -> bool {
    classify(rate).is_raining()
}

/// Verdict for one slot, or `None` when both sources are absent.
///
/// The rate is the mean of the present sources. Confidence is full when
/// both sources agree on dry-vs-raining. A missing source votes dry, so a
/// lone source reporting rain only reaches half confidence.
pub fn evaluate_slot(
    time: DateTime<Utc>,
    offset_minutes: u32,
    radar_rate: Option<f64>,
    alarm_rate: Option<f64>,
) -> Option<SlotVerdict> {
    let present: Vec<f64> = [radar_rate, alarm_rate].into_iter().flatten().collect();
    if present.is_empty() {
        return None;
    }

    let average_rate = present.iter().sum::<f64>() / present.len() as f64;
    let radar_raining = radar_rate.is_some_and(is_raining);
    let alarm_raining = alarm_rate.is_some_and(is_raining);
    let confidence = if radar_raining == alarm_raining {
        Confidence::Full
    } else {
        Confidence::Partial
    };

    Some(SlotVerdict {
        time,
        offset_minutes,
        radar_rate,
        alarm_rate,
        average_rate,
        classification: classify(average_rate),
        confidence,
    })
}
