//! edgetel Common Library
//!
//! Shared types and utilities for the edgetel sensor agent:
//!
//! - [`reading`] - Reading data model (`Reading`, `FieldValue`, `SensorKind`)
//! - [`serialization`] - JSON/CBOR encoding and decoding
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`session`] - Zenoh session management
//! - [`topic`] - Bus topic builders and device name checks
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod reading;
pub mod serialization;
pub mod session;
pub mod topic;

// Re-export commonly used types at the crate root
pub use config::{
    BusCredentials, LogFormat, LoggingConfig, TlsConfig, ZenohConfig, load_config, parse_config,
};
pub use error::{Error, Result};
pub use reading::{FieldValue, Fields, Reading, SensorKind, Tags, iso8601, round_to};
pub use serialization::{Format, decode, encode};
pub use session::connect;
pub use topic::{build_topic, device_wildcard, sanitize_device_name, validate_device_name};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG`, when set, takes precedence over `config.level`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
