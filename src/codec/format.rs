//! Media types understood by routes and the codec registry.

use std::fmt;
use std::str::FromStr;

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_XML: &str = "application/xml";
pub const TEXT_YAML: &str = "text/yaml";
pub const APPLICATION_ZIP: &str = "application/zip";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// A route's declared content type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaType {
    PlainText,
    Json,
    Xml,
    Yaml,
    Zip,
    Binary,
    /// Any other mime type, stored lowercased without parameters.
    Other(String),
}

impl MediaType {
    /// Parse a mime string. Parameters after `;` are ignored.
    pub fn parse(value: &str) -> Self {
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            TEXT_PLAIN => Self::PlainText,
            APPLICATION_JSON | "text/json" => Self::Json,
            APPLICATION_XML | "text/xml" => Self::Xml,
            TEXT_YAML | "application/yaml" | "application/x-yaml" | "text/x-yaml" => Self::Yaml,
            APPLICATION_ZIP => Self::Zip,
            APPLICATION_OCTET_STREAM => Self::Binary,
            _ => Self::Other(essence),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PlainText => TEXT_PLAIN,
            Self::Json => APPLICATION_JSON,
            Self::Xml => APPLICATION_XML,
            Self::Yaml => TEXT_YAML,
            Self::Zip => APPLICATION_ZIP,
            Self::Binary => APPLICATION_OCTET_STREAM,
            Self::Other(mime) => mime,
        }
    }

    /// Key under which a codec for this type is registered.
    ///
    /// Free-form types use their subtype without an `x-` prefix, so
    /// `text/csv` looks up `CSV`.
    pub fn format_name(&self) -> String {
        match self {
            Self::PlainText => "TEXT".to_string(),
            Self::Json => "JSON".to_string(),
            Self::Xml => "XML".to_string(),
            Self::Yaml => "YAML".to_string(),
            Self::Zip => "ZIP".to_string(),
            Self::Binary => "BINARY".to_string(),
            Self::Other(mime) => {
                let subtype = mime.rsplit('/').next().unwrap_or(mime);
                subtype
                    .strip_prefix("x-")
                    .unwrap_or(subtype)
                    .to_ascii_uppercase()
            }
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for MediaType {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}
