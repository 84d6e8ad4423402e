//! Publish sinks.
//!
//! The pipeline talks to the pub-sub bus and the time-series database
//! through [`BusSink`] and [`DatabaseSink`]; the Zenoh and InfluxDB clients
//! are the production implementations.

pub mod bus;
pub mod influx;

use std::future::Future;

use thiserror::Error;

pub use bus::ZenohBus;
pub use influx::{DataPoint, InfluxClient};

/// Sink failures. The pipeline logs these and moves on.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    #[error("Failed to write to bucket {bucket}: {message}")]
    Write { bucket: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Reading has not been timestamped")]
    Unstamped,

    #[error("Failed to close {sink}: {message}")]
    Close { sink: &'static str, message: String },
}

/// Pub-sub bus the pipeline publishes encoded readings to.
pub trait BusSink {
    /// Publish `payload` on `topic`.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<(), SinkError>>;

    /// Stop the client's background I/O.
    fn shutdown(&self) -> impl Future<Output = Result<(), SinkError>>;
}

/// Time-series database the pipeline writes points to.
pub trait DatabaseSink {
    /// Write one point into `bucket`.
    fn write(&self, bucket: &str, point: &DataPoint) -> impl Future<Output = Result<(), SinkError>>;

    /// Close the client.
    fn close(&self) -> impl Future<Output = Result<(), SinkError>>;
}
