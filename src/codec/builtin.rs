//! JSON, YAML and XML record codecs.

use serde_json::Value;

use super::registry::{Codec, Record};
use super::{xml, CodecError};

/// Accepts a list of objects or a single object.
fn into_records(value: Value, format: &str) -> Result<Vec<Record>, CodecError> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(record) => Ok(record),
                other => Err(CodecError::decode(
                    format,
                    format!("item {index} is not a record: {other}"),
                )),
            })
            .collect(),
        Value::Object(record) => Ok(vec![record]),
        Value::Null => Ok(Vec::new()),
        other => Err(CodecError::decode(
            format,
            format!("expected a list of records, found {other}"),
        )),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn format(&self) -> &str {
        "JSON"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Record>, CodecError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| CodecError::decode("JSON", e))?;
        into_records(value, "JSON")
    }

    fn encode(&self, records: &[Record]) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(records).map_err(|e| CodecError::encode("JSON", e))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

impl Codec for YamlCodec {
    fn format(&self) -> &str {
        "YAML"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Record>, CodecError> {
        let value: Value = serde_yaml::from_slice(bytes).map_err(|e| CodecError::decode("YAML", e))?;
        into_records(value, "YAML")
    }

    fn encode(&self, records: &[Record]) -> Result<Vec<u8>, CodecError> {
        serde_yaml::to_string(records)
            .map(String::into_bytes)
            .map_err(|e| CodecError::encode("YAML", e))
    }
}

/// `<records><record><field>value</field></record></records>`
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec;

impl Codec for XmlCodec {
    fn format(&self) -> &str {
        "XML"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Record>, CodecError> {
        xml::read_records(bytes)
    }

    fn encode(&self, records: &[Record]) -> Result<Vec<u8>, CodecError> {
        xml::write_records(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<Record> {
        let Value::Array(items) = json!([
            {"k": "v", "n": "1"},
            {"k": "w", "n": "2"}
        ]) else {
            unreachable!()
        };
        items
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect()
    }

    #[test]
    fn test_json_to_yaml() {
        let records = JsonCodec.decode(br#"[{"k":"v"}]"#).unwrap();
        let yaml = String::from_utf8(YamlCodec.encode(&records).unwrap()).unwrap();
        assert_eq!(yaml, "- k: v\n");
    }

    #[test]
    fn test_yaml_to_json_keeps_order() {
        let records = YamlCodec.decode(b"- z: 1\n  a: 2\n").unwrap();
        let json = String::from_utf8(JsonCodec.encode(&records).unwrap()).unwrap();
        assert_eq!(json, r#"[{"z":1,"a":2}]"#);
    }

    #[test]
    fn test_single_object_is_one_record() {
        let records = JsonCodec.decode(br#"{"k":"v"}"#).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_scalar_rejected() {
        let err = JsonCodec.decode(b"42").unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
        let err = JsonCodec.decode(b"[1]").unwrap_err();
        assert!(err.to_string().contains("item 0"));
    }

    #[test]
    fn test_every_pair_translates() {
        let codecs: [&dyn Codec; 3] = [&JsonCodec, &XmlCodec, &YamlCodec];
        for source in codecs {
            let bytes = source.encode(&sample()).unwrap();
            for target in codecs {
                let records = source.decode(&bytes).unwrap();
                let out = target.encode(&records).unwrap();
                let back = target.decode(&out).unwrap();
                assert_eq!(back, sample(), "{} to {}", source.format(), target.format());
            }
        }
    }
}
