use crate::error::{Error, Result};
use crate::reading::SensorKind;

/// Build the bus topic for a sensor on a device.
///
/// Topics follow the pattern `<device>/<kind>`.
///
/// # Example
/// ```
/// use edgetel_common::reading::SensorKind;
/// use edgetel_common::topic::build_topic;
///
/// assert_eq!(build_topic("pi01", SensorKind::Dht11), "pi01/dht11");
/// ```
pub fn build_topic(device: &str, kind: SensorKind) -> String {
    format!("{}/{}", device, kind.as_str())
}

/// Build a wildcard matching every topic of a device.
///
/// # Example
/// ```
/// use edgetel_common::topic::device_wildcard;
///
/// assert_eq!(device_wildcard("pi01"), "pi01/*");
/// ```
pub fn device_wildcard(device: &str) -> String {
    format!("{}/*", device)
}

/// Check that a device identity can be used as a single topic chunk.
pub fn validate_device_name(device: &str) -> Result<()> {
    if device.is_empty() {
        return Err(Error::Topic("device name is empty".to_string()));
    }

    if let Some(c) = device.chars().find(|c| matches!(c, '/' | '*' | '$' | '?' | '#')) {
        return Err(Error::Topic(format!(
            "device name '{}' contains reserved character '{}'",
            device, c
        )));
    }

    if device.chars().any(char::is_whitespace) {
        return Err(Error::Topic(format!(
            "device name '{}' contains whitespace",
            device
        )));
    }

    Ok(())
}

/// Replace characters that are not allowed in a topic chunk.
pub fn sanitize_device_name(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '/' | ' ' | '#' | '?' | '*' | '$' => {
                if !result.ends_with('_') && !result.is_empty() {
                    result.push('_');
                }
            }
            _ => result.push(c),
        }
    }
    result.trim_matches('_').to_string()
}
