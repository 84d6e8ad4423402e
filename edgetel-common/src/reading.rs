use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name to value. `None` marks a value that was unavailable this tick.
pub type Fields = BTreeMap<String, Option<FieldValue>>;

/// Tag name to value, usually just `device`.
pub type Tags = BTreeMap<String, String>;

/// A single structured sample produced by a sensor reader.
///
/// A reading always carries at least one non-null field; [`Reading::new`]
/// refuses to build one otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Kind of data (e.g., "metrics", "sensor", "ultrasonic").
    pub measurement: String,

    /// Sampled values.
    pub fields: Fields,

    /// Identifying tags.
    pub tags: Tags,

    /// Capture time, assigned when the reading is published.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Reading {
    /// Create a reading, or `None` when every field is null.
    pub fn new(measurement: impl Into<String>, fields: Fields, tags: Tags) -> Option<Self> {
        if !fields.values().any(Option::is_some) {
            return None;
        }

        Some(Self {
            measurement: measurement.into(),
            fields,
            tags,
            timestamp: None,
        })
    }

    /// Return a copy of this reading stamped with `timestamp`.
    pub fn stamped(&self, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..self.clone()
        }
    }

    /// Iterate over the fields that hold a value, in name order.
    pub fn present_fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields
            .iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| (name.as_str(), v)))
    }

    /// Look up a non-null field.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).and_then(Option::as_ref)
    }
}

/// Typed field value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    /// Unsigned counter (monotonically increasing).
    Counter(u64),

    /// Signed integer.
    Integer(i64),

    /// Floating point measurement.
    Gauge(f64),
}

/// Kind of sensor the agent can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Host health counters (CPU, memory, disk, network, temperature).
    Metrics,
    /// DHT11 humidity/temperature probe.
    Dht11,
    /// HC-SR04 ultrasonic rangefinder.
    Ultrasonic,
}

impl SensorKind {
    /// All sensor kinds, in registration order.
    pub const ALL: [SensorKind; 3] = [SensorKind::Dht11, SensorKind::Metrics, SensorKind::Ultrasonic];

    /// Name used as the topic suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Metrics => "metrics",
            SensorKind::Dht11 => "dht11",
            SensorKind::Ultrasonic => "ultrasonic",
        }
    }

    /// Measurement name attached to readings of this kind.
    pub fn measurement(&self) -> &'static str {
        match self {
            SensorKind::Metrics => "metrics",
            SensorKind::Dht11 => "sensor",
            SensorKind::Ultrasonic => "ultrasonic",
        }
    }

    /// Database bucket readings of this kind go to by default.
    pub fn default_bucket(&self) -> &'static str {
        match self {
            SensorKind::Metrics => "metrics",
            SensorKind::Dht11 | SensorKind::Ultrasonic => "sensor",
        }
    }

    /// Default polling interval in seconds.
    pub fn default_interval_secs(&self) -> u64 {
        match self {
            SensorKind::Metrics => 60,
            SensorKind::Dht11 => 10,
            SensorKind::Ultrasonic => 15,
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Format a timestamp as ISO-8601 with microsecond precision.
pub fn iso8601(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Round `value` to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn device_tags() -> Tags {
        Tags::from([("device".to_string(), "pi01".to_string())])
    }

    #[test]
    fn test_reading_requires_a_present_field() {
        let mut fields = Fields::new();
        fields.insert("pi_temp_c".to_string(), None);
        assert!(Reading::new("metrics", fields.clone(), device_tags()).is_none());

        assert!(Reading::new("metrics", Fields::new(), device_tags()).is_none());

        fields.insert("cpu_percent".to_string(), Some(FieldValue::Gauge(12.5)));
        let reading = Reading::new("metrics", fields, device_tags()).unwrap();
        assert_eq!(reading.present_fields().count(), 1);
        assert_eq!(reading.field("cpu_percent"), Some(&FieldValue::Gauge(12.5)));
        assert_eq!(reading.field("pi_temp_c"), None);
        assert!(reading.timestamp.is_none());
    }

    #[test]
    fn test_stamped_keeps_original_untouched() {
        let fields = Fields::from([("distance_cm".to_string(), Some(FieldValue::Gauge(10.0)))]);
        let reading = Reading::new("ultrasonic", fields, device_tags()).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let stamped = reading.stamped(ts);
        assert_eq!(stamped.timestamp, Some(ts));
        assert!(reading.timestamp.is_none());
    }

    #[test]
    fn test_sensor_kind_defaults() {
        assert_eq!(SensorKind::Dht11.as_str(), "dht11");
        assert_eq!(SensorKind::Dht11.measurement(), "sensor");
        assert_eq!(SensorKind::Metrics.default_bucket(), "metrics");
        assert_eq!(SensorKind::Ultrasonic.default_bucket(), "sensor");
        assert_eq!(SensorKind::Ultrasonic.default_interval_secs(), 15);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(9.9813, 1), 10.0);
        assert_eq!(round_to(953.674316, 2), 953.67);
        assert_eq!(round_to(-3.25, 0), -3.0);
    }

    #[test]
    fn test_iso8601() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(iso8601(&ts), "2024-05-01T12:00:00.000000Z");
    }
}
