//! Domain types shared across the sources, the engine, and the binary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

// ── Forecast samples ──────────────────────────────────────────────────

/// One parsed upstream row: the predicted precipitation for a 5-minute slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSample {
    /// Start of the slot this sample covers.
    pub time: DateTime<Utc>,
    /// Provider wall-clock label ("HH:mm").
    pub label: String,
    /// Precipitation rate in mm/h.
    pub rate: f64,
    /// Raw intensity code, for providers that send one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

// ── Verdicts ──────────────────────────────────────────────────────────

/// Rain intensity label for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Dry,
    Light,
    Moderate,
    Heavy,
}

impl Classification {
    pub fn is_raining(self) -> bool {
        self != Classification::Dry
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Dry => "dry",
            Classification::Light => "light",
            Classification::Moderate => "moderate",
            Classification::Heavy => "heavy",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much the two sources agree on a slot. Serialized as a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Confidence {
    Partial,
    Full,
}

impl Confidence {
    pub fn percent(self) -> u8 {
        match self {
            Confidence::Partial => 50,
            Confidence::Full => 100,
        }
    }
}

impl From<Confidence> for u8 {
    fn from(c: Confidence) -> u8 {
        c.percent()
    }
}

impl TryFrom<u8> for Confidence {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            50 => Ok(Confidence::Partial),
            100 => Ok(Confidence::Full),
            other => Err(format!("confidence must be 50 or 100, got {other}")),
        }
    }
}

/// Classification and confidence derived for one slot of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotVerdict {
    pub time: DateTime<Utc>,
    pub offset_minutes: u32,
    /// `None` when Buienradar had no answer for this slot.
    pub radar_rate: Option<f64>,
    /// `None` when Buienalarm had no answer for this slot.
    pub alarm_rate: Option<f64>,
    /// Mean of the present rates (mm/h).
    pub average_rate: f64,
    pub classification: Classification,
    pub confidence: Confidence,
}

// ── Rain state ────────────────────────────────────────────────────────

/// Cached sample sequences of both sources at the time of a scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub buienradar: Vec<ForecastSample>,
    pub buienalarm: Vec<ForecastSample>,
}

/// The published unit of truth: what it is doing now and what changes next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RainState {
    /// Scan origin, aligned to the 5-minute provider grid.
    pub observed_at: DateTime<Utc>,
    pub current: SlotVerdict,
    /// Equal to `current` when no change is expected within the horizon.
    pub predicted: SlotVerdict,
    pub message: String,
    pub sources: SourceSnapshot,
}

impl RainState {
    /// True when the scan found a confirmed transition inside the horizon.
    pub fn expects_change(&self) -> bool {
        self.predicted.classification != self.current.classification
    }
}

// ── Published events ──────────────────────────────────────────────────

pub const TOPIC_RAIN_STATE: &str = "rain-state";
pub const TOPIC_RAIN_ERROR: &str = "rain-error";

/// Everything the engine publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum RainEvent {
    State(Box<RainState>),
    Error(String),
}

impl RainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            RainEvent::State(_) => TOPIC_RAIN_STATE,
            RainEvent::Error(_) => TOPIC_RAIN_ERROR,
        }
    }

    /// `{ "topic": ..., "payload": ... }` envelope.
    pub fn to_message(&self) -> serde_json::Value {
        let payload = match self {
            RainEvent::State(state) => serde_json::to_value(state.as_ref())
                .unwrap_or_else(|e| json!(format!("unserializable rain state: {e}"))),
            RainEvent::Error(msg) => json!(msg),
        };
        json!({ "topic": self.topic(), "payload": payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(classification: Classification) -> SlotVerdict {
        SlotVerdict {
            time: DateTime::parse_from_rfc3339("2026-06-01T12:00:00Z")
                .expect("valid time")
                .with_timezone(&Utc),
            offset_minutes: 0,
            radar_rate: Some(0.0),
            alarm_rate: None,
            average_rate: 0.0,
            classification,
            confidence: Confidence::Full,
        }
    }

    #[test]
    fn test_rain_state_serializes_camel_case() {
        let state = RainState {
            observed_at: verdict(Classification::Dry).time,
            current: verdict(Classification::Dry),
            predicted: verdict(Classification::Dry),
            message: "Dry".into(),
            sources: SourceSnapshot::default(),
        };

        let value = RainEvent::State(Box::new(state)).to_message();
        assert_eq!(value["topic"], "rain-state");
        let payload = &value["payload"];
        assert_eq!(payload["current"]["classification"], "dry");
        assert_eq!(payload["current"]["confidence"], 100);
        assert_eq!(payload["current"]["offsetMinutes"], 0);
        assert!(payload["current"]["alarmRate"].is_null());
        assert!(payload["sources"]["buienradar"].is_array());
        assert!(payload["sources"]["buienalarm"].is_array());
    }

    #[test]
    fn test_confidence_round_trips_as_percentage() {
        let parsed: Confidence = serde_json::from_str("50").expect("valid confidence");
        assert_eq!(parsed, Confidence::Partial);
        assert!(serde_json::from_str::<Confidence>("75").is_err());
    }

    #[test]
    fn test_classification_order_and_rain() {
        assert!(Classification::Dry < Classification::Light);
        assert!(Classification::Moderate < Classification::Heavy);
        assert!(!Classification::Dry.is_raining());
        assert!(Classification::Light.is_raining());
    }
}
