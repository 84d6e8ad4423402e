use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Bus payload encoding, chosen by the `serialization` config key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Plain JSON object; readable with any subscriber.
    #[default]
    Json,

    /// CBOR, for metered or slow links.
    Cbor,
}

/// Serialize a bus payload.
pub fn encode<T: Serialize + ?Sized>(value: &T, format: Format) -> Result<Vec<u8>> {
    let payload = match format {
        Format::Json => serde_json::to_vec(value)?,
        Format::Cbor => {
            let mut payload = Vec::with_capacity(128);
            ciborium::into_writer(value, &mut payload)?;
            payload
        }
    };
    Ok(payload)
}

/// Parse a bus payload.
pub fn decode<T: DeserializeOwned>(payload: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => Ok(serde_json::from_slice(payload)?),
        Format::Cbor => ciborium::from_reader(payload).map_err(|e| Error::Cbor(format!("{e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_json_is_plain_object() {
        let value = BTreeMap::from([("humidity", 41.0), ("temperature", 22.5)]);
        let encoded = encode(&value, Format::Json).unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            r#"{"humidity":41.0,"temperature":22.5}"#
        );
    }

    #[test]
    fn test_cbor_is_smaller() {
        let value = BTreeMap::from([("distance_cm", 123.4), ("timestamp_s", 1714564800.0)]);

        let json = encode(&value, Format::Json).unwrap();
        let cbor = encode(&value, Format::Cbor).unwrap();

        assert!(cbor.len() < json.len(), "CBOR should be smaller than JSON");
        let decoded: BTreeMap<String, f64> = decode(&cbor, Format::Cbor).unwrap();
        assert_eq!(decoded.get("distance_cm"), Some(&123.4));
    }

    #[test]
    fn test_format_names() {
        let format: Format = serde_json::from_str("\"cbor\"").unwrap();
        assert_eq!(format, Format::Cbor);
        assert_eq!(Format::default(), Format::Json);
    }
}
