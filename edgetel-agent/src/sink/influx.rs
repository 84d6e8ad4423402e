//! InfluxDB v2 sink.
//!
//! Points are written one at a time, synchronously, over the HTTP write
//! API in line protocol.

use std::time::Duration;

use chrono::{DateTime, Utc};
use edgetel_common::{FieldValue, Reading};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::sink::{DatabaseSink, SinkError};

/// Connection settings for the InfluxDB write API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// Base URL, e.g. `https://eu-central-1-1.aws.cloud2.influxdata.com`.
    pub host: String,

    /// Organization that owns the buckets.
    pub org: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

/// One database point built from a timestamped reading.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, FieldValue)>,
    pub timestamp: DateTime<Utc>,
}

impl DataPoint {
    /// Build a point from a reading stamped by the pipeline.
    ///
    /// Null fields are left out, as are non-finite gauges, which line
    /// protocol cannot express.
    pub fn from_reading(reading: &Reading) -> std::result::Result<Self, SinkError> {
        let timestamp = reading.timestamp.ok_or(SinkError::Unstamped)?;
        if timestamp.timestamp_nanos_opt().is_none() {
            return Err(SinkError::Serialization(format!(
                "timestamp {timestamp} is outside the nanosecond range"
            )));
        }

        let fields = reading
            .present_fields()
            .filter(|(_, value)| match value {
                FieldValue::Gauge(v) => v.is_finite(),
                _ => true,
            })
            .map(|(name, value)| (name.to_string(), *value))
            .collect();

        let tags = reading
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            measurement: reading.measurement.clone(),
            tags,
            fields,
            timestamp,
        })
    }

    /// Render as one line of InfluxDB line protocol, nanosecond precision.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape(key, &[',', '=', ' ']));
            line.push('=');
            line.push_str(&escape(value, &[',', '=', ' ']));
        }

        line.push(' ');
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}", escape(key, &[',', '=', ' ']), field_literal(value)))
            .collect();
        line.push_str(&fields.join(","));

        line.push(' ');
        line.push_str(&self.timestamp.timestamp_nanos_opt().unwrap_or_default().to_string());
        line
    }
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn field_literal(value: &FieldValue) -> String {
    match value {
        // Counters go out as signed integers so they share a column type
        // with older writers; only values past i64::MAX need the u suffix.
        FieldValue::Counter(v) if *v <= i64::MAX as u64 => format!("{v}i"),
        FieldValue::Counter(v) => format!("{v}u"),
        FieldValue::Integer(v) => format!("{v}i"),
        FieldValue::Gauge(v) => {
            let s = v.to_string();
            if s.contains('.') || s.contains('e') {
                s
            } else {
                format!("{s}.0")
            }
        }
    }
}

/// HTTP client for the InfluxDB v2 write endpoint.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    host: String,
    org: String,
    token: String,
}

impl InfluxClient {
    /// Build a client. No request is made until the first write.
    pub fn new(config: &InfluxConfig, token: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Database(e.to_string()))?;

        Ok(Self {
            http,
            host: config.host.trim_end_matches('/').to_string(),
            org: config.org.clone(),
            token,
        })
    }

    /// Write endpoint URL (without query string).
    pub fn write_url(&self) -> String {
        format!("{}/api/v2/write", self.host)
    }
}

impl DatabaseSink for InfluxClient {
    async fn write(&self, bucket: &str, point: &DataPoint) -> std::result::Result<(), SinkError> {
        let write_error = |message: String| SinkError::Write {
            bucket: bucket.to_string(),
            message,
        };

        if point.fields.is_empty() {
            return Err(write_error("point has no writable fields".to_string()));
        }

        let body = point.to_line_protocol();
        debug!(bucket = %bucket, line = %body, "Writing point");

        self.http
            .post(self.write_url())
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", bucket),
                ("precision", "ns"),
            ])
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| write_error(e.to_string()))?;

        Ok(())
    }

    async fn close(&self) -> std::result::Result<(), SinkError> {
        // Writes are not buffered; dropping the client releases its pool.
        debug!(host = %self.host, "InfluxDB client closed");
        Ok(())
    }
}
