//! Startup capability probing.
//!
//! Each configured sensor is probed once. Sensors whose hardware cannot be
//! opened come back as [`Capability::Unavailable`] with the reason, and the
//! scheduler never sees them.

use edgetel_common::SensorKind;

use crate::config::{AgentConfig, Dht11Config, MetricsConfig, UltrasonicConfig};
use crate::sensors::{HostMetricsReader, SensorReader, SensorSpec};

/// Result of probing one sensor.
pub enum Capability<T> {
    Available(T),
    Unavailable(String),
}

impl<T> Capability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Capability<U> {
        match self {
            Capability::Available(value) => Capability::Available(f(value)),
            Capability::Unavailable(reason) => Capability::Unavailable(reason),
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Capability<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Capability::Available(value),
            Err(e) => Capability::Unavailable(e.to_string()),
        }
    }
}

/// A boxed sensor reader ready to register.
pub type ReaderCapability = Capability<Box<dyn SensorReader>>;

/// Probe every sensor in registration order: dht11, metrics, ultrasonic.
pub fn probe_sensors(config: &AgentConfig, device: &str) -> Vec<(SensorSpec, ReaderCapability)> {
    SensorKind::ALL
        .iter()
        .map(|&kind| {
            let spec = SensorSpec::for_device(
                kind,
                device,
                config.interval(kind),
                config.bucket(kind),
            );
            let capability = match kind {
                SensorKind::Metrics => probe_metrics(&config.sensors.metrics, device),
                SensorKind::Dht11 => probe_dht11(&config.sensors.dht11, device),
                SensorKind::Ultrasonic => probe_ultrasonic(&config.sensors.ultrasonic, device),
            };
            (spec, capability)
        })
        .collect()
}

/// Host metrics are always available; unreadable counters read as null.
pub fn probe_metrics(config: &MetricsConfig, device: &str) -> ReaderCapability {
    let reader = HostMetricsReader::new(device, config.thermal_path.clone(), config.field_set);
    Capability::Available(Box::new(reader))
}

pub fn probe_dht11(config: &Dht11Config, device: &str) -> ReaderCapability {
    if !config.enabled {
        return Capability::Unavailable("disabled in configuration".to_string());
    }
    open_dht11(config, device)
}

pub fn probe_ultrasonic(config: &UltrasonicConfig, device: &str) -> ReaderCapability {
    if !config.enabled {
        return Capability::Unavailable("disabled in configuration".to_string());
    }
    open_ultrasonic(config, device)
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn open_dht11(config: &Dht11Config, device: &str) -> ReaderCapability {
    use crate::clock::MonotonicClock;
    use crate::gpio::RppalIo;
    use crate::sensors::{Dht11, DhtReader};

    RppalIo::open()
        .and_then(|io| Dht11::new(io, MonotonicClock::new(), config.pin))
        .map(|probe| Box::new(DhtReader::new(probe, device)) as Box<dyn SensorReader>)
        .into()
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn open_ultrasonic(config: &UltrasonicConfig, device: &str) -> ReaderCapability {
    use crate::clock::MonotonicClock;
    use crate::gpio::RppalIo;
    use crate::sensors::UltrasonicRanger;
    use crate::sensors::ultrasonic::echo_timeout_for_range;

    RppalIo::open()
        .and_then(|io| {
            UltrasonicRanger::new(
                io,
                MonotonicClock::new(),
                config.trigger_pin,
                config.echo_pin,
                echo_timeout_for_range(config.max_range_cm),
                device,
            )
        })
        .map(|ranger| Box::new(ranger) as Box<dyn SensorReader>)
        .into()
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn open_dht11(_config: &Dht11Config, _device: &str) -> ReaderCapability {
    Capability::Unavailable(crate::gpio::GpioError::Unsupported.to_string())
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn open_ultrasonic(_config: &UltrasonicConfig, _device: &str) -> ReaderCapability {
    Capability::Unavailable(crate::gpio::GpioError::Unsupported.to_string())
}
