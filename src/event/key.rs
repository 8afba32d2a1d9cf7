use serde_json::Value;

use crate::error::PipelineError;
use crate::event::parser::CONTENT_FIELD;

/// Separator between the computer name and record id in a dedup key.
/// Hostnames cannot contain a colon and record ids are numeric, so distinct
/// `(Computer, EventRecordID)` pairs can never concatenate identically.
pub const KEY_SEPARATOR: char = ':';

/// Derive the deduplication key from an event's system metadata.
///
/// Deterministic over event content only: the same logical event always maps
/// to the same key, regardless of arrival order or time.
pub fn extract_dedup_key(tree: &Value) -> Result<String, PipelineError> {
    let system = tree
        .get("Event")
        .and_then(|event| event.get("System"))
        .ok_or(PipelineError::MissingField("Event.System"))?;
    let computer = scalar_field(system, "Computer")
        .ok_or(PipelineError::MissingField("Event.System.Computer"))?;
    let record_id = scalar_field(system, "EventRecordID")
        .ok_or(PipelineError::MissingField("Event.System.EventRecordID"))?;
    Ok(format!("{computer}{KEY_SEPARATOR}{record_id}"))
}

/// Read a leaf field that is either a plain string or an attribute-wrapped
/// element whose text landed under `content`.
fn scalar_field<'a>(node: &'a Value, name: &str) -> Option<&'a str> {
    match node.get(name)? {
        Value::String(value) => Some(value),
        Value::Object(fields) => fields.get(CONTENT_FIELD)?.as_str(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_key_from_computer_and_record_id() {
        let tree = json!({
            "Event": {
                "System": {"Computer": "HOST1", "EventRecordID": "42"},
            }
        });
        assert_eq!(extract_dedup_key(&tree).unwrap(), "HOST1:42");
    }

    #[test]
    fn reads_attribute_wrapped_leaves() {
        // A <Computer Flag="x">HOST1</Computer> shape parses to an object
        // with the text under `content`.
        let tree = json!({
            "Event": {
                "System": {
                    "Computer": {"Flag": "x", "content": "HOST1"},
                    "EventRecordID": "7",
                },
            }
        });
        assert_eq!(extract_dedup_key(&tree).unwrap(), "HOST1:7");
    }

    #[test]
    fn separator_prevents_concatenation_collisions() {
        let a = json!({"Event": {"System": {"Computer": "HOST1", "EventRecordID": "23"}}});
        let b = json!({"Event": {"System": {"Computer": "HOST12", "EventRecordID": "3"}}});
        assert_ne!(
            extract_dedup_key(&a).unwrap(),
            extract_dedup_key(&b).unwrap()
        );
    }

    #[test]
    fn missing_computer_is_an_error() {
        let tree = json!({"Event": {"System": {"EventRecordID": "42"}}});
        let err = extract_dedup_key(&tree).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingField("Event.System.Computer")
        ));
    }

    #[test]
    fn missing_record_id_is_an_error() {
        let tree = json!({"Event": {"System": {"Computer": "HOST1"}}});
        let err = extract_dedup_key(&tree).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingField("Event.System.EventRecordID")
        ));
    }

    #[test]
    fn missing_system_is_an_error() {
        let tree = json!({"Event": {"EventData": {}}});
        let err = extract_dedup_key(&tree).unwrap_err();
        assert!(matches!(err, PipelineError::MissingField("Event.System")));
    }
}
