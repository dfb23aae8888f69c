//! Record-level codecs and their registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::builtin::{JsonCodec, XmlCodec, YamlCodec};
use super::{CodecError, MediaType};

/// One generic key→value record, keys kept in document order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Converts between bytes and ordered record sequences.
pub trait Codec: Send + Sync {
    /// Format name used as registry key, e.g. `JSON`.
    fn format(&self) -> &str;

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Record>, CodecError>;

    fn encode(&self, records: &[Record]) -> Result<Vec<u8>, CodecError>;
}

/// Codecs keyed by upper-case format name.
pub struct CodecRegistry {
    codecs: RwLock<HashMap<String, Arc<dyn Codec>>>,
}

impl CodecRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            codecs: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the JSON, XML and YAML codecs.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register(Arc::new(JsonCodec));
        registry.register(Arc::new(XmlCodec));
        registry.register(Arc::new(YamlCodec));
        registry
    }

    /// Add a codec. Returns false when its format is already taken.
    pub fn register(&self, codec: Arc<dyn Codec>) -> bool {
        let key = codec.format().to_ascii_uppercase();
        let mut codecs = self.codecs.write().unwrap_or_else(PoisonError::into_inner);
        if codecs.contains_key(&key) {
            return false;
        }
        codecs.insert(key, codec);
        true
    }

    pub fn lookup(&self, media: &MediaType) -> Option<Arc<dyn Codec>> {
        let codecs = self.codecs.read().unwrap_or_else(PoisonError::into_inner);
        codecs.get(&media.format_name()).cloned()
    }

    pub fn formats(&self) -> Vec<String> {
        let codecs = self.codecs.read().unwrap_or_else(PoisonError::into_inner);
        let mut formats: Vec<String> = codecs.keys().cloned().collect();
        formats.sort();
        formats
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LinesCodec;

    impl Codec for LinesCodec {
        fn format(&self) -> &str {
            "csv"
        }

        fn decode(&self, bytes: &[u8]) -> Result<Vec<Record>, CodecError> {
            let text = std::str::from_utf8(bytes).map_err(|e| CodecError::decode("CSV", e))?;
            Ok(text
                .lines()
                .map(|line| {
                    let mut record = Record::new();
                    record.insert("line".to_string(), line.into());
                    record
                })
                .collect())
        }

        fn encode(&self, records: &[Record]) -> Result<Vec<u8>, CodecError> {
            let lines: Vec<String> = records
                .iter()
                .filter_map(|r| r.get("line").and_then(|v| v.as_str()).map(str::to_string))
                .collect();
            Ok(lines.join("\n").into_bytes())
        }
    }

    #[test]
    fn test_builtin_formats() {
        let registry = CodecRegistry::new();
        assert_eq!(registry.formats(), vec!["JSON", "XML", "YAML"]);
        assert!(registry.lookup(&MediaType::Json).is_some());
        assert!(registry.lookup(&MediaType::PlainText).is_none());
    }

    #[test]
    fn test_late_registration() {
        let registry = CodecRegistry::new();
        let csv = MediaType::parse("text/csv");
        assert!(registry.lookup(&csv).is_none());

        assert!(registry.register(Arc::new(LinesCodec)));
        assert!(!registry.register(Arc::new(LinesCodec)));

        let codec = registry.lookup(&csv).unwrap();
        let records = codec.decode(b"a\nb").unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_empty_registry() {
        assert!(CodecRegistry::empty().lookup(&MediaType::Json).is_none());
    }
}
