//! Configuration for the agent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use edgetel_common::{
    BusCredentials, Format, LoggingConfig, SensorKind, ZenohConfig, load_config, parse_config,
    sanitize_device_name, validate_device_name,
};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::sensors::FieldSet;
use crate::sensors::host::DEFAULT_THERMAL_PATH;
use crate::sensors::ultrasonic::{DEFAULT_MAX_RANGE_CM, MAX_RANGE_LIMIT_CM};
use crate::sink::influx::InfluxConfig;

/// Database token variable.
pub const INFLUXDB_TOKEN_VAR: &str = "INFLUXDB_TOKEN";
/// Bus user variable.
pub const ZENOH_USER_VAR: &str = "ZENOH_USER";
/// Bus password variable.
pub const ZENOH_PASSWORD_VAR: &str = "ZENOH_PASSWORD";

/// Complete agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Device identity.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Zenoh connection settings.
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// InfluxDB connection settings.
    #[serde(default)]
    pub influxdb: InfluxConfig,

    /// Bus payload encoding.
    #[serde(default)]
    pub serialization: Format,

    /// Per-sensor settings.
    #[serde(default)]
    pub sensors: SensorsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name used in topics and tags.
    /// Use "auto" to take the hostname (default).
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "auto".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
        }
    }
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:8086".to_string(),
            org: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Settings for every sensor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorsConfig {
    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub dht11: Dht11Config,

    #[serde(default)]
    pub ultrasonic: UltrasonicConfig,
}

/// Host metrics sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Sampling interval in seconds (default: 60).
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,

    /// Database bucket (default: "metrics").
    #[serde(default = "default_metrics_bucket")]
    pub bucket: String,

    /// SoC temperature file, in millidegrees Celsius.
    #[serde(default = "default_thermal_path")]
    pub thermal_path: PathBuf,

    /// "detailed" (default) or "compact".
    #[serde(default)]
    pub field_set: FieldSet,
}

fn default_metrics_interval() -> u64 {
    SensorKind::Metrics.default_interval_secs()
}

fn default_metrics_bucket() -> String {
    SensorKind::Metrics.default_bucket().to_string()
}

fn default_thermal_path() -> PathBuf {
    PathBuf::from(DEFAULT_THERMAL_PATH)
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_metrics_interval(),
            bucket: default_metrics_bucket(),
            thermal_path: default_thermal_path(),
            field_set: FieldSet::default(),
        }
    }
}

/// DHT11 humidity/temperature probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dht11Config {
    /// Probe for the sensor at startup (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sampling interval in seconds (default: 10).
    #[serde(default = "default_dht11_interval")]
    pub interval_secs: u64,

    /// Database bucket (default: "sensor").
    #[serde(default = "default_sensor_bucket")]
    pub bucket: String,

    /// Data pin, BCM numbering (default: 4).
    #[serde(default = "default_dht11_pin")]
    pub pin: u8,
}

fn default_true() -> bool {
    true
}

fn default_dht11_interval() -> u64 {
    SensorKind::Dht11.default_interval_secs()
}

fn default_sensor_bucket() -> String {
    SensorKind::Dht11.default_bucket().to_string()
}

fn default_dht11_pin() -> u8 {
    4
}

impl Default for Dht11Config {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_dht11_interval(),
            bucket: default_sensor_bucket(),
            pin: default_dht11_pin(),
        }
    }
}

/// HC-SR04 style ultrasonic ranger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UltrasonicConfig {
    /// Probe for the sensor at startup (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sampling interval in seconds (default: 15).
    #[serde(default = "default_ultrasonic_interval")]
    pub interval_secs: u64,

    /// Database bucket (default: "sensor").
    #[serde(default = "default_sensor_bucket")]
    pub bucket: String,

    /// Trigger pin, BCM numbering (default: 23).
    #[serde(default = "default_trigger_pin")]
    pub trigger_pin: u8,

    /// Echo pin, BCM numbering (default: 24).
    #[serde(default = "default_echo_pin")]
    pub echo_pin: u8,

    /// Maximum range in centimetres; sets the echo timeout (default: 515).
    #[serde(default = "default_max_range")]
    pub max_range_cm: f64,
}

fn default_ultrasonic_interval() -> u64 {
    SensorKind::Ultrasonic.default_interval_secs()
}

fn default_trigger_pin() -> u8 {
    23
}

fn default_echo_pin() -> u8 {
    24
}

fn default_max_range() -> f64 {
    DEFAULT_MAX_RANGE_CM
}

impl Default for UltrasonicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_ultrasonic_interval(),
            bucket: default_sensor_bucket(),
            trigger_pin: default_trigger_pin(),
            echo_pin: default_echo_pin(),
            max_range_cm: default_max_range(),
        }
    }
}

impl AgentConfig {
    /// Load and validate configuration from a JSON5 file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AgentError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let config: Self = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.device.name.trim().is_empty() {
            return Err(AgentError::validation("device.name must not be empty"));
        }

        let host = &self.influxdb.host;
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(AgentError::validation(format!(
                "influxdb.host must be an http(s) URL, got '{host}'"
            )));
        }
        if self.influxdb.org.is_empty() {
            return Err(AgentError::validation("influxdb.org must be set"));
        }
        if self.influxdb.timeout_secs == 0 {
            return Err(AgentError::validation("influxdb.timeout_secs must be > 0"));
        }

        let sensors = &self.sensors;
        for (name, interval, bucket) in [
            ("metrics", sensors.metrics.interval_secs, &sensors.metrics.bucket),
            ("dht11", sensors.dht11.interval_secs, &sensors.dht11.bucket),
            (
                "ultrasonic",
                sensors.ultrasonic.interval_secs,
                &sensors.ultrasonic.bucket,
            ),
        ] {
            if interval == 0 {
                return Err(AgentError::validation(format!(
                    "sensors.{name}.interval_secs must be > 0"
                )));
            }
            if bucket.is_empty() {
                return Err(AgentError::validation(format!(
                    "sensors.{name}.bucket must not be empty"
                )));
            }
        }

        let ultrasonic = &sensors.ultrasonic;
        if ultrasonic.trigger_pin == ultrasonic.echo_pin {
            return Err(AgentError::validation(
                "sensors.ultrasonic trigger_pin and echo_pin must differ",
            ));
        }
        if !(ultrasonic.max_range_cm > 0.0 && ultrasonic.max_range_cm <= MAX_RANGE_LIMIT_CM) {
            return Err(AgentError::validation(format!(
                "sensors.ultrasonic.max_range_cm must be in (0, {MAX_RANGE_LIMIT_CM}]"
            )));
        }

        Ok(())
    }

    /// Interval for a sensor kind.
    pub fn interval(&self, kind: SensorKind) -> Duration {
        let secs = match kind {
            SensorKind::Metrics => self.sensors.metrics.interval_secs,
            SensorKind::Dht11 => self.sensors.dht11.interval_secs,
            SensorKind::Ultrasonic => self.sensors.ultrasonic.interval_secs,
        };
        Duration::from_secs(secs)
    }

    /// Bucket for a sensor kind.
    pub fn bucket(&self, kind: SensorKind) -> &str {
        match kind {
            SensorKind::Metrics => &self.sensors.metrics.bucket,
            SensorKind::Dht11 => &self.sensors.dht11.bucket,
            SensorKind::Ultrasonic => &self.sensors.ultrasonic.bucket,
        }
    }

    /// Resolve the device name, taking the hostname for "auto".
    ///
    /// A hostname is sanitized into a valid topic chunk; an explicit name
    /// must already be one.
    pub fn device_name(&self) -> Result<String> {
        if self.device.name != "auto" {
            validate_device_name(&self.device.name)?;
            return Ok(self.device.name.clone());
        }

        let hostname = hostname::get()
            .map_err(|e| AgentError::Identity(format!("cannot read hostname: {e}")))?
            .into_string()
            .map_err(|_| AgentError::Identity("hostname is not valid UTF-8".to_string()))?;

        let name = sanitize_device_name(&hostname);
        validate_device_name(&name)?;
        Ok(name)
    }
}

/// Secrets read from the environment.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub influx_token: String,
    pub bus: Option<BusCredentials>,
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read credentials through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |var: &str| lookup(var).filter(|v| !v.is_empty());

        let influx_token = get(INFLUXDB_TOKEN_VAR).ok_or(AgentError::MissingCredential {
            var: INFLUXDB_TOKEN_VAR,
        })?;

        let bus = match (get(ZENOH_USER_VAR), get(ZENOH_PASSWORD_VAR)) {
            (Some(user), Some(password)) => Some(BusCredentials { user, password }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(AgentError::InvalidCredential(format!(
                    "{ZENOH_USER_VAR} is set but {ZENOH_PASSWORD_VAR} is not"
                )));
            }
            (None, Some(_)) => {
                return Err(AgentError::InvalidCredential(format!(
                    "{ZENOH_PASSWORD_VAR} is set but {ZENOH_USER_VAR} is not"
                )));
            }
        };

        Ok(Self { influx_token, bus })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        influxdb: { host: "https://influx.example.com", org: "home" }
    }"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = AgentConfig::parse(MINIMAL).unwrap();

        assert_eq!(config.device.name, "auto");
        assert_eq!(config.zenoh.mode, "peer");
        assert_eq!(config.influxdb.timeout_secs, 10);
        assert_eq!(config.serialization, Format::Json);
        assert_eq!(config.interval(SensorKind::Metrics), Duration::from_secs(60));
        assert_eq!(config.interval(SensorKind::Dht11), Duration::from_secs(10));
        assert_eq!(config.interval(SensorKind::Ultrasonic), Duration::from_secs(15));
        assert_eq!(config.bucket(SensorKind::Metrics), "metrics");
        assert_eq!(config.bucket(SensorKind::Dht11), "sensor");
        assert_eq!(config.bucket(SensorKind::Ultrasonic), "sensor");
        assert_eq!(config.sensors.dht11.pin, 4);
        assert_eq!(config.sensors.ultrasonic.trigger_pin, 23);
        assert_eq!(config.sensors.ultrasonic.echo_pin, 24);
        assert_eq!(config.sensors.metrics.field_set, FieldSet::Detailed);
        assert_eq!(
            config.sensors.metrics.thermal_path,
            PathBuf::from(DEFAULT_THERMAL_PATH)
        );
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            device: { name: "greenhouse-pi" },
            zenoh: {
                mode: "client",
                connect: ["tls/broker.example.com:7447"],
                tls: { root_ca_certificate: "/etc/edgetel/ca.pem" }
            },
            influxdb: { host: "http://localhost:8086", org: "home", timeout_secs: 5 },
            serialization: "cbor",
            sensors: {
                metrics: { interval_secs: 30, field_set: "compact" },
                dht11: { enabled: false, pin: 17 },
                ultrasonic: { trigger_pin: 5, echo_pin: 6, max_range_cm: 200 }
            },
            logging: { level: "debug", format: "json" }
        }"#;

        let config = AgentConfig::parse(json).unwrap();
        assert_eq!(config.device_name().unwrap(), "greenhouse-pi");
        assert_eq!(config.zenoh.mode, "client");
        assert!(config.zenoh.tls.is_some());
        assert_eq!(config.serialization, Format::Cbor);
        assert_eq!(config.sensors.metrics.field_set, FieldSet::Compact);
        assert_eq!(config.interval(SensorKind::Metrics), Duration::from_secs(30));
        assert!(!config.sensors.dht11.enabled);
        assert_eq!(config.sensors.ultrasonic.max_range_cm, 200.0);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_zero_interval() {
        let json = r#"{
            influxdb: { host: "http://localhost:8086", org: "home" },
            sensors: { dht11: { interval_secs: 0 } }
        }"#;
        let err = AgentConfig::parse(json).unwrap_err();
        assert!(matches!(err, AgentError::ConfigValidation(_)));
        assert!(err.to_string().contains("dht11"));
    }

    #[test]
    fn test_validate_same_trigger_and_echo() {
        let json = r#"{
            influxdb: { host: "http://localhost:8086", org: "home" },
            sensors: { ultrasonic: { trigger_pin: 7, echo_pin: 7 } }
        }"#;
        assert!(matches!(
            AgentConfig::parse(json),
            Err(AgentError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_validate_max_range_bounds() {
        for range in ["0", "-5", "1001", "3e23"] {
            let json = format!(
                r#"{{
                    influxdb: {{ host: "http://localhost:8086", org: "home" }},
                    sensors: {{ ultrasonic: {{ max_range_cm: {range} }} }}
                }}"#
            );
            assert!(
                matches!(AgentConfig::parse(&json), Err(AgentError::ConfigValidation(_))),
                "max_range_cm {range} should be rejected"
            );
        }

        let json = r#"{
            influxdb: { host: "http://localhost:8086", org: "home" },
            sensors: { ultrasonic: { max_range_cm: 1000 } }
        }"#;
        assert!(AgentConfig::parse(json).is_ok());
    }

    #[test]
    fn test_validate_missing_org() {
        assert!(AgentConfig::parse("{}").is_err());
    }

    #[test]
    fn test_validate_bad_host() {
        let json = r#"{ influxdb: { host: "influx.local", org: "home" } }"#;
        assert!(AgentConfig::parse(json).is_err());
    }

    #[test]
    fn test_unknown_field_set_rejected() {
        let json = r#"{
            influxdb: { host: "http://localhost:8086", org: "home" },
            sensors: { metrics: { field_set: "verbose" } }
        }"#;
        assert!(matches!(
            AgentConfig::parse(json),
            Err(AgentError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_invalid_device_name() {
        let json = r#"{
            device: { name: "lab/pi" },
            influxdb: { host: "http://localhost:8086", org: "home" }
        }"#;
        let config = AgentConfig::parse(json).unwrap();
        assert!(matches!(config.device_name(), Err(AgentError::Identity(_))));
    }

    #[test]
    fn test_auto_device_name_is_valid_topic_chunk() {
        let config = AgentConfig::parse(MINIMAL).unwrap();
        let name = config.device_name().unwrap();
        assert!(validate_device_name(&name).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.influxdb.org, "home");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            AgentConfig::load("/nonexistent/edgetel.json5"),
            Err(AgentError::ConfigNotFound { .. })
        ));
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_credentials_token_only() {
        let creds = Credentials::from_lookup(env(&[(INFLUXDB_TOKEN_VAR, "t0k")])).unwrap();
        assert_eq!(creds.influx_token, "t0k");
        assert!(creds.bus.is_none());
    }

    #[test]
    fn test_credentials_with_bus_pair() {
        let creds = Credentials::from_lookup(env(&[
            (INFLUXDB_TOKEN_VAR, "t0k"),
            (ZENOH_USER_VAR, "pi"),
            (ZENOH_PASSWORD_VAR, "hunter2"),
        ]))
        .unwrap();
        let bus = creds.bus.unwrap();
        assert_eq!(bus.user, "pi");
        assert_eq!(bus.password, "hunter2");
    }

    #[test]
    fn test_credentials_missing_token() {
        let err = Credentials::from_lookup(env(&[(ZENOH_USER_VAR, "pi")])).unwrap_err();
        assert!(matches!(
            err,
            AgentError::MissingCredential {
                var: INFLUXDB_TOKEN_VAR
            }
        ));
    }

    #[test]
    fn test_credentials_half_set_pair() {
        let user_only = Credentials::from_lookup(env(&[
            (INFLUXDB_TOKEN_VAR, "t0k"),
            (ZENOH_USER_VAR, "pi"),
        ]));
        assert!(matches!(user_only, Err(AgentError::InvalidCredential(_))));

        let password_only = Credentials::from_lookup(env(&[
            (INFLUXDB_TOKEN_VAR, "t0k"),
            (ZENOH_PASSWORD_VAR, "hunter2"),
        ]));
        assert!(matches!(password_only, Err(AgentError::InvalidCredential(_))));
    }

    #[test]
    fn test_empty_token_counts_as_missing() {
        let err = Credentials::from_lookup(env(&[(INFLUXDB_TOKEN_VAR, "")])).unwrap_err();
        assert!(matches!(err, AgentError::MissingCredential { .. }));
    }
}
