//! Observation records and their timestamps.
//!
//! An [`Observation`] is the unit of storage. Its identity is the pair
//! `(district, timestamp)` exactly as written: district case is preserved and
//! participates in the key, while every read path matches districts
//! case-insensitively.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Canonical text layout. Lexical order of this layout equals chronological
/// order, which the embedded backends rely on when comparing stored text.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Accepted ranges for [`Observation::is_plausible`]
pub const TEMPERATURE_RANGE: (f64, f64) = (-50.0, 60.0);
pub const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);

/// Point in time of an observation, without zone, rounded to whole
/// microseconds, the finest step every backend stores.
///
/// Unparseable source values are not rejected: they coerce to
/// [`ObservedAt::unknown`], which sorts before every real reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservedAt(NaiveDateTime);

impl ObservedAt {
    /// Sentinel stored for readings whose timestamp could not be parsed
    /// (`0001-01-01T00:00:00`).
    pub fn unknown() -> Self {
        let date = NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or_default();
        Self(date.and_hms_opt(0, 0, 0).unwrap_or_default())
    }

    fn at(naive: NaiveDateTime) -> Self {
        Self(naive.round_subsecs(6))
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }

    /// Strict parse. Accepts RFC 3339 (converted to UTC), ISO-8601-like
    /// `date[T| ]hour:minute[:second[.fraction]]`, and a bare date (midnight).
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Ok(with_offset) = DateTime::parse_from_rfc3339(text) {
            return Some(Self::at(with_offset.naive_utc()));
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return Some(Self::at(naive));
            }
        }

        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(Self::at)
    }

    /// Parse, coercing anything invalid to the unknown sentinel.
    pub fn parse_lenient(text: &str) -> Self {
        Self::parse(text).unwrap_or_else(Self::unknown)
    }

    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }

    /// Canonical text form, used as the stored value in text-typed backends.
    pub fn to_canonical(&self) -> String {
        self.0.format(CANONICAL_FORMAT).to_string()
    }
}

impl From<NaiveDateTime> for ObservedAt {
    fn from(value: NaiveDateTime) -> Self {
        Self::at(value)
    }
}

impl fmt::Display for ObservedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CANONICAL_FORMAT))
    }
}

impl Serialize for ObservedAt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical())
    }
}

impl<'de> Deserialize<'de> for ObservedAt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map_or_else(Self::unknown, |text| Self::parse_lenient(&text)))
    }
}

/// One normalized weather reading.
///
/// Field names on the wire follow the persisted column layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub district: String,
    #[serde(rename = "date")]
    pub timestamp: ObservedAt,
    #[serde(rename = "temp")]
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
}

impl Observation {
    pub fn new(
        district: impl Into<String>,
        timestamp: ObservedAt,
        temperature: f64,
        humidity: f64,
        wind_speed: f64,
    ) -> Self {
        Self {
            district: district.into(),
            timestamp,
            temperature,
            humidity,
            wind_speed,
        }
    }

    /// Identity key. Case-sensitive on district.
    pub fn key(&self) -> (&str, ObservedAt) {
        (self.district.as_str(), self.timestamp)
    }

    /// Whether the reading survives the ingest plausibility filter.
    pub fn is_plausible(&self) -> bool {
        let within = |value: f64, (low, high): (f64, f64)| value.is_finite() && value >= low && value <= high;

        !self.district.trim().is_empty()
            && !self.timestamp.is_unknown()
            && within(self.temperature, TEMPERATURE_RANGE)
            && within(self.humidity, HUMIDITY_RANGE)
            && self.wind_speed.is_finite()
            && self.wind_speed >= 0.0
    }
}
