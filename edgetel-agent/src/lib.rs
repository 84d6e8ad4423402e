//! Edge telemetry agent.
//!
//! Samples host health counters, a DHT11 humidity probe and an ultrasonic
//! rangefinder on independent intervals, and publishes every reading to
//! both a Zenoh bus and an InfluxDB bucket.
//!
//! # Topics
//!
//! ```text
//! <device>/metrics
//! <device>/dht11
//! <device>/ultrasonic
//! ```
//!
//! # Example
//!
//! ```ignore
//! use edgetel_agent::{AgentArgs, run_agent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_agent(AgentArgs::parse()).await
//! }
//! ```

pub mod args;
pub mod clock;
pub mod config;
pub mod error;
pub mod gpio;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod pipeline;
pub mod probe;
pub mod runner;
pub mod scheduler;
pub mod sensors;
pub mod sink;

pub use args::AgentArgs;
pub use clock::{Clock, MonotonicClock};
pub use config::{AgentConfig, Credentials};
pub use error::{AgentError, Result};
pub use pipeline::{BusMessage, BusValue, PublishOutcome, PublishPipeline};
pub use probe::{Capability, probe_sensors};
pub use runner::{Agent, ShutdownReport, ShutdownSignal, run_agent};
pub use scheduler::{BASE_TICK, Scheduler};
pub use sensors::{SensorReader, SensorSpec};
pub use sink::{BusSink, DataPoint, DatabaseSink, InfluxClient, SinkError, ZenohBus};
