//! Record documents as XML events.
//!
//! Records live under one root element, one child element per record and
//! one grandchild per field. Nested objects become nested elements, list
//! values repeat the element, null is an empty element. Reading maps text
//! back to strings and repeated elements back to lists.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::Value;

use super::registry::Record;
use super::CodecError;

const ROOT: &str = "records";
const RECORD: &str = "record";

pub(crate) fn write_records(records: &[Record]) -> Result<Vec<u8>, CodecError> {
    let mut writer = Writer::new(Vec::new());
    emit(&mut writer, Event::Start(BytesStart::new(ROOT)))?;
    for record in records {
        emit(&mut writer, Event::Start(BytesStart::new(RECORD)))?;
        for (name, value) in record {
            write_field(&mut writer, name, value)?;
        }
        emit(&mut writer, Event::End(BytesEnd::new(RECORD)))?;
    }
    emit(&mut writer, Event::End(BytesEnd::new(ROOT)))?;
    Ok(writer.into_inner())
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), CodecError> {
    writer
        .write_event(event)
        .map_err(|e| CodecError::encode("XML", e))
}

fn write_field(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> Result<(), CodecError> {
    if !is_element_name(name) {
        return Err(CodecError::encode(
            "XML",
            format!("field name {name:?} is not a valid element name"),
        ));
    }

    match value {
        Value::Null => emit(writer, Event::Empty(BytesStart::new(name))),
        Value::Array(items) => {
            for item in items {
                write_field(writer, name, item)?;
            }
            Ok(())
        }
        Value::Object(fields) => {
            emit(writer, Event::Start(BytesStart::new(name)))?;
            for (child, value) in fields {
                write_field(writer, child, value)?;
            }
            emit(writer, Event::End(BytesEnd::new(name)))
        }
        Value::String(text) => write_text(writer, name, text),
        scalar => write_text(writer, name, &scalar.to_string()),
    }
}

fn write_text(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<(), CodecError> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    if !text.is_empty() {
        emit(writer, Event::Text(BytesText::new(text)))?;
    }
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

struct Element {
    name: String,
    fields: Record,
    text: String,
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            fields: Record::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> Value {
        if self.fields.is_empty() {
            Value::String(self.text)
        } else {
            Value::Object(self.fields)
        }
    }
}

pub(crate) fn read_records(bytes: &[u8]) -> Result<Vec<Record>, CodecError> {
    let source = std::str::from_utf8(bytes).map_err(|e| CodecError::decode("XML", e))?;
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut records = Vec::new();
    let mut seen_root = false;

    loop {
        match reader.read_event().map_err(|e| CodecError::decode("XML", e))? {
            Event::Start(start) => {
                let name = element_name(&start)?;
                if stack.is_empty() {
                    if seen_root {
                        return Err(CodecError::decode("XML", "more than one root element"));
                    }
                    seen_root = true;
                }
                stack.push(Element::new(name));
            }
            Event::Empty(start) => {
                let name = element_name(&start)?;
                if stack.is_empty() {
                    seen_root = true;
                    continue;
                }
                place(&mut stack, &mut records, name, Value::Null)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let text = text.unescape().map_err(|e| CodecError::decode("XML", e))?;
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    let raw = data.into_inner();
                    let text = std::str::from_utf8(&raw).map_err(|e| CodecError::decode("XML", e))?;
                    top.text.push_str(text);
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| CodecError::decode("XML", "unbalanced closing tag"))?;
                if stack.is_empty() {
                    continue;
                }
                let name = element.name.clone();
                place(&mut stack, &mut records, name, element.into_value())?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(CodecError::decode(
            "XML",
            format!("element <{}> is never closed", open.name),
        ));
    }
    Ok(records)
}

fn element_name(start: &BytesStart<'_>) -> Result<String, CodecError> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(|e| CodecError::decode("XML", e))
}

/// Attach a closed element to its parent, or emit it as a record when the
/// parent is the root.
fn place(
    stack: &mut [Element],
    records: &mut Vec<Record>,
    name: String,
    value: Value,
) -> Result<(), CodecError> {
    if stack.len() == 1 {
        let record = match value {
            Value::Object(fields) => fields,
            Value::Null => Record::new(),
            Value::String(text) if text.is_empty() => Record::new(),
            _ => {
                return Err(CodecError::decode(
                    "XML",
                    format!("record <{name}> holds text instead of fields"),
                ))
            }
        };
        records.push(record);
        return Ok(());
    }

    if let Some(parent) = stack.last_mut() {
        match parent.fields.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                parent.fields.insert(name, value);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_write_shape() {
        let out = write_records(&[record(json!({"k": "v"}))]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<records><record><k>v</k></record></records>"
        );
    }

    #[test]
    fn test_text_is_escaped() {
        let out = write_records(&[record(json!({"k": "a<b & c"}))]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("a&lt;b &amp; c"));
        let back = read_records(text.as_bytes()).unwrap();
        assert_eq!(back[0]["k"], "a<b & c");
    }

    #[test]
    fn test_nested_and_repeated() {
        let input = record(json!({
            "node": {"name": "n1", "port": "80"},
            "tag": ["a", "b"],
            "gone": null
        }));
        let out = write_records(std::slice::from_ref(&input)).unwrap();
        let back = read_records(&out).unwrap();
        assert_eq!(back, vec![input]);
    }

    #[test]
    fn test_scalars_read_back_as_text() {
        let out = write_records(&[record(json!({"n": 1, "ok": true}))]).unwrap();
        let back = read_records(&out).unwrap();
        assert_eq!(back[0]["n"], "1");
        assert_eq!(back[0]["ok"], "true");
    }

    #[test]
    fn test_invalid_field_name() {
        let err = write_records(&[record(json!({"bad key": "v"}))]).unwrap_err();
        assert!(err.to_string().contains("bad key"));
    }

    #[test]
    fn test_empty_documents() {
        assert!(read_records(b"").unwrap().is_empty());
        assert!(read_records(b"<records/>").unwrap().is_empty());
        assert_eq!(read_records(b"<records><record/></records>").unwrap().len(), 1);
    }

    #[test]
    fn test_malformed() {
        assert!(read_records(b"<records><record><k>v</record>").is_err());
        assert!(read_records(b"<records><record>text</record></records>").is_err());
    }
}
