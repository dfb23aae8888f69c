//! Codec facade.
//!
//! # Data Flow
//! ```text
//! Typed values (serde)          Stream payloads (records)
//!     → marshal / unmarshal         → CodecRegistry::lookup(media type)
//!     → JSON | XML | YAML           → Codec::decode → Vec<Record>
//!                                   → Codec::encode → bytes
//! ```
//!
//! # Design Decisions
//! - The registry is an owned value, shared through `Arc`, never a global
//! - Codecs are registered statically; extra formats go through `register`
//! - XML records keep text values as strings (the format carries no types)

pub mod format;
pub mod registry;

mod builtin;
mod xml;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use builtin::{JsonCodec, XmlCodec, YamlCodec};
pub use format::MediaType;
pub use registry::{Codec, CodecRegistry, Record};

/// Serialization failures, named by the format involved.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{format} encode error: {message}")]
    Encode { format: String, message: String },

    #[error("{format} decode error: {message}")]
    Decode { format: String, message: String },

    #[error("no typed codec for media type {0}")]
    UnsupportedFormat(String),
}

impl CodecError {
    pub(crate) fn encode(format: &str, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            format: format.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(format: &str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            format: format.to_string(),
            message: err.to_string(),
        }
    }
}

/// Serialize a typed value into the given format.
pub fn marshal<T: Serialize>(value: &T, media: &MediaType) -> Result<Vec<u8>, CodecError> {
    match media {
        MediaType::Json => {
            serde_json::to_vec(value).map_err(|e| CodecError::encode("JSON", e))
        }
        MediaType::Yaml => serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| CodecError::encode("YAML", e)),
        MediaType::Xml => quick_xml::se::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| CodecError::encode("XML", e)),
        other => Err(CodecError::UnsupportedFormat(other.to_string())),
    }
}

/// Deserialize a typed value from the given format.
pub fn unmarshal<T: DeserializeOwned>(bytes: &[u8], media: &MediaType) -> Result<T, CodecError> {
    match media {
        MediaType::Json => {
            serde_json::from_slice(bytes).map_err(|e| CodecError::decode("JSON", e))
        }
        MediaType::Yaml => {
            serde_yaml::from_slice(bytes).map_err(|e| CodecError::decode("YAML", e))
        }
        MediaType::Xml => {
            let text = std::str::from_utf8(bytes).map_err(|e| CodecError::decode("XML", e))?;
            quick_xml::de::from_str(text).map_err(|e| CodecError::decode("XML", e))
        }
        other => Err(CodecError::UnsupportedFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Node {
        name: String,
        ip_address: String,
        active: bool,
    }

    fn node() -> Node {
        Node {
            name: "n1".to_string(),
            ip_address: "10.0.0.1".to_string(),
            active: true,
        }
    }

    #[test]
    fn test_round_trip_all_formats() {
        for media in [MediaType::Json, MediaType::Xml, MediaType::Yaml] {
            let bytes = marshal(&node(), &media).unwrap();
            let back: Node = unmarshal(&bytes, &media).unwrap();
            assert_eq!(back, node(), "round trip through {media}");
        }
    }

    #[test]
    fn test_json_field_naming() {
        let bytes = marshal(&node(), &MediaType::Json).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"ipAddress\":\"10.0.0.1\""));
    }

    #[test]
    fn test_unsupported_format() {
        let err = marshal(&node(), &MediaType::PlainText).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_decode_error_names_format() {
        let err = unmarshal::<Node>(b"{not json", &MediaType::Json).unwrap_err();
        assert!(err.to_string().starts_with("JSON decode error"));
    }
}
