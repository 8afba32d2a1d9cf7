use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::PipelineError;

/// Field name under which the text of an element that also carries attributes
/// is stored. The flattener relies on this shape for `EventData` entries.
pub const CONTENT_FIELD: &str = "content";

/// One element being built while its subtree is still open.
struct Frame {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

/// Parse one XML event document into a generic object tree.
///
/// Shape rules:
/// - element attributes become regular fields of the element's object
/// - repeated sibling elements of the same name collapse into an array
/// - text content of an element that also carries attributes (or children)
///   lands under [`CONTENT_FIELD`]
/// - text-only elements become plain strings, empty leaves become `""`
///
/// All scalar values stay strings; no numeric coercion is attempted, so the
/// dedup key and flattened output are byte-stable across replays.
pub fn parse_event(raw: &str) -> Result<Value, PipelineError> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut root = Map::new();
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(start)) => {
                stack.push(open_frame(&start)?);
            }
            Ok(XmlEvent::Empty(start)) => {
                let (name, value) = close_frame(open_frame(&start)?);
                let target = match stack.last_mut() {
                    Some(parent) => &mut parent.fields,
                    None => &mut root,
                };
                insert_field(target, name, value);
            }
            Ok(XmlEvent::End(_)) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| PipelineError::MalformedInput("unbalanced closing tag".into()))?;
                let (name, value) = close_frame(frame);
                let target = match stack.last_mut() {
                    Some(parent) => &mut parent.fields,
                    None => &mut root,
                };
                insert_field(target, name, value);
            }
            Ok(XmlEvent::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|e| PipelineError::MalformedInput(e.to_string()))?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Ok(XmlEvent::CData(cdata)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&cdata));
                }
            }
            Ok(XmlEvent::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(PipelineError::MalformedInput(e.to_string())),
        }
    }

    if let Some(frame) = stack.last() {
        return Err(PipelineError::MalformedInput(format!(
            "unclosed element '{}'",
            frame.name
        )));
    }
    if root.is_empty() {
        return Err(PipelineError::MalformedInput("no root element".into()));
    }
    Ok(Value::Object(root))
}

fn open_frame(start: &BytesStart) -> Result<Frame, PipelineError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut fields = Map::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| PipelineError::MalformedInput(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| PipelineError::MalformedInput(e.to_string()))?;
        insert_field(&mut fields, key, Value::String(value.into_owned()));
    }
    Ok(Frame {
        name,
        fields,
        text: String::new(),
    })
}

fn close_frame(frame: Frame) -> (String, Value) {
    let Frame {
        name,
        mut fields,
        text,
    } = frame;
    let text = text.trim();
    let value = if fields.is_empty() {
        Value::String(text.to_string())
    } else {
        if !text.is_empty() {
            fields.insert(CONTENT_FIELD.to_string(), Value::String(text.to_string()));
        }
        Value::Object(fields)
    };
    (name, value)
}

/// Insert a child field, promoting repeated names to an ordered array.
fn insert_field(map: &mut Map<String, Value>, name: String, value: Value) {
    match map.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(name, value);
        }
    }
}
