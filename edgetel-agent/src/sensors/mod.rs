//! Sensor readers.
//!
//! Every sensor exposes [`SensorReader`]: one synchronous read per scheduled
//! tick, yielding a [`Reading`] or nothing.

pub mod dht;
pub mod host;
pub mod ultrasonic;

use std::time::Duration;

use edgetel_common::{Reading, SensorKind, Tags, build_topic};

use crate::gpio::GpioError;

pub use dht::{Dht11, DhtReader, HumidityProbe};
pub use host::{FieldSet, HostMetricsReader};
pub use ultrasonic::UltrasonicRanger;

/// A sensor that can be sampled on demand.
pub trait SensorReader {
    /// Which sensor this is.
    fn kind(&self) -> SensorKind;

    /// Take one sample. Returns `None` when nothing usable was obtained.
    fn read(&mut self) -> Option<Reading>;

    /// Release any hardware held by the reader.
    fn release(&mut self) -> Result<(), GpioError> {
        Ok(())
    }
}

/// Static per-sensor scheduling and routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSpec {
    pub kind: SensorKind,
    pub interval: Duration,
    pub topic: String,
    pub bucket: String,
}

impl SensorSpec {
    /// Build a spec routed to `<device>/<kind>`.
    pub fn for_device(
        kind: SensorKind,
        device: &str,
        interval: Duration,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            interval,
            topic: build_topic(device, kind),
            bucket: bucket.into(),
        }
    }
}

/// Tags attached to every reading from `device`.
pub fn device_tags(device: &str) -> Tags {
    Tags::from([("device".to_string(), device.to_string())])
}
