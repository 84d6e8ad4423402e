//! Dual-sink publish pipeline.
//!
//! Every reading is stamped once, written to the database, then published
//! on the bus. A failure in one sink is logged and never prevents the
//! other from being attempted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use edgetel_common::{FieldValue, Format, Reading, Tags, encode, iso8601};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::sink::{BusSink, DataPoint, DatabaseSink, SinkError};

/// Field name carrying the ISO-8601 timestamp in bus messages.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Value in a bus message's field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BusValue {
    Field(FieldValue),
    Text(String),
}

/// Message published on the bus for one reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub measurement: String,
    pub fields: BTreeMap<String, BusValue>,
    pub tags: Tags,
}

impl BusMessage {
    /// Build from a stamped reading: non-null fields plus the timestamp.
    pub fn from_reading(reading: &Reading) -> Result<Self, SinkError> {
        let timestamp = reading.timestamp.ok_or(SinkError::Unstamped)?;

        let mut fields: BTreeMap<String, BusValue> = reading
            .present_fields()
            .map(|(name, value)| (name.to_string(), BusValue::Field(*value)))
            .collect();
        fields.insert(
            TIMESTAMP_FIELD.to_string(),
            BusValue::Text(iso8601(&timestamp)),
        );

        Ok(Self {
            measurement: reading.measurement.clone(),
            fields,
            tags: reading.tags.clone(),
        })
    }
}

/// Per-sink result of one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub database: bool,
    pub bus: bool,
}

impl PublishOutcome {
    pub fn all_ok(&self) -> bool {
        self.database && self.bus
    }
}

/// Sends readings to both sinks.
pub struct PublishPipeline<B, D> {
    bus: B,
    database: D,
    format: Format,
}

impl<B: BusSink, D: DatabaseSink> PublishPipeline<B, D> {
    pub fn new(bus: B, database: D, format: Format) -> Self {
        Self {
            bus,
            database,
            format,
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn database(&self) -> &D {
        &self.database
    }

    /// Payload encoding used for bus messages.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Publish a reading stamped with the current UTC time.
    pub async fn publish(&self, reading: &Reading, topic: &str, bucket: &str) -> PublishOutcome {
        self.publish_at(reading, topic, bucket, Utc::now()).await
    }

    /// Publish a reading with an explicit timestamp.
    ///
    /// Both sinks see the same timestamp. The database is written first.
    pub async fn publish_at(
        &self,
        reading: &Reading,
        topic: &str,
        bucket: &str,
        timestamp: DateTime<Utc>,
    ) -> PublishOutcome {
        let stamped = reading.stamped(timestamp);

        let database = match self.write_database(&stamped, bucket).await {
            Ok(()) => {
                info!(bucket = %bucket, measurement = %stamped.measurement, "Written to InfluxDB");
                true
            }
            Err(e) => {
                error!(bucket = %bucket, error = %e, "InfluxDB write failed");
                false
            }
        };

        let bus = match self.publish_bus(&stamped, topic).await {
            Ok(()) => {
                debug!(topic = %topic, "Published to bus");
                true
            }
            Err(e) => {
                error!(topic = %topic, error = %e, "Bus publish failed");
                false
            }
        };

        PublishOutcome { database, bus }
    }

    async fn write_database(&self, reading: &Reading, bucket: &str) -> Result<(), SinkError> {
        let point = DataPoint::from_reading(reading)?;
        self.database.write(bucket, &point).await
    }

    async fn publish_bus(&self, reading: &Reading, topic: &str) -> Result<(), SinkError> {
        let message = BusMessage::from_reading(reading)?;
        let payload =
            encode(&message, self.format).map_err(|e| SinkError::Serialization(e.to_string()))?;
        self.bus.publish(topic, payload).await
    }

    /// Take the sinks back out, for shutdown.
    pub fn into_sinks(self) -> (B, D) {
        (self.bus, self.database)
    }
}
