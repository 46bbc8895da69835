//! Base64 encoding for byte fields.
//!
//! Use with `#[serde(with = "ipc::bytes")]`. JSON would otherwise spell
//! every byte as a decimal number.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64_simd::STANDARD.encode_to_string(bytes))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    base64_simd::STANDARD
        .decode_to_vec(encoded.as_bytes())
        .map_err(D::Error::custom)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        #[serde(with = "crate::bytes")]
        data: Vec<u8>,
    }

    #[test]
    fn test_bytes_are_base64_strings() {
        let blob = Blob {
            data: vec![0, 1, 2, 250, 255],
        };
        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["data"], "AAEC+v8=");

        let decoded: Blob = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, blob);
    }

    #[test]
    fn test_bytes_size_stays_near_raw() {
        let blob = Blob {
            data: vec![7; 3 * 1024],
        };
        let encoded = serde_json::to_vec(&blob).unwrap();
        assert!(encoded.len() < 4 * 1024 + 32);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let err = serde_json::from_str::<Blob>(r#"{"data":"not base64!"}"#);
        assert!(err.is_err());
    }
}
