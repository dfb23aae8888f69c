//! Status envelopes synthesized for actions that do not answer themselves.

use std::fmt;

use crate::codec::MediaType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Ko,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Ko => "KO",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn success_message(path: &str) -> String {
    format!("Calling path: {path}, status: OK")
}

pub fn failure_message(path: &str, details: &str) -> String {
    format!("Calling path: {path}, details: {details}")
}

/// Render `status` and `message` in the shape of the produced type.
pub fn render(status: Status, message: &str, produces: &MediaType) -> String {
    match produces {
        MediaType::Json => {
            let message = serde_json::Value::String(message.to_string());
            format!("{{\"status\": \"{status}\", \"message\": {message}}}")
        }
        MediaType::Yaml => format!("status: {status}\nmessage: {message}"),
        MediaType::Xml => format!(
            "<status>{status}</status><message>{}</message>",
            quick_xml::escape::escape(message)
        ),
        _ => format!("status: {status}\n{message}"),
    }
}

/// Content type of a rendered envelope.
pub fn content_type(produces: &MediaType) -> MediaType {
    match produces {
        MediaType::Json | MediaType::Yaml | MediaType::Xml => produces.clone(),
        _ => MediaType::PlainText,
    }
}
