use serde_json::{Map, Value};
use tracing::debug;

use crate::event::parser::CONTENT_FIELD;
use crate::metrics_const::FLATTEN_SKIPPED_ENTRIES_COUNTER;

/// Collapse a parsed event tree into a single-level record.
///
/// `Event.System` fields are copied to the top level, with one level of
/// attribute/value wrapping (Provider, TimeCreated, Execution, ...) hoisted.
/// `Event.EventData` entries carrying the `{Name, content}` shape become
/// `Name -> content` fields. On a field-name collision EventData wins:
/// last write overwrites, deterministically.
///
/// Pure function, no errors: malformed substructures contribute no fields and
/// bump a counter so the silent leniency stays observable.
pub fn flatten(tree: &Value) -> Value {
    let mut out = Map::new();

    if let Some(system) = tree.pointer("/Event/System").and_then(Value::as_object) {
        for (name, value) in system {
            match value {
                Value::Object(nested) => {
                    for (hoisted, hoisted_value) in nested {
                        out.insert(hoisted.clone(), hoisted_value.clone());
                    }
                }
                other => {
                    out.insert(name.clone(), other.clone());
                }
            }
        }
    }

    if let Some(data) = tree.pointer("/Event/EventData").and_then(Value::as_object) {
        for value in data.values() {
            // A lone <Data> element parses to a bare object rather than a
            // one-element array; both carry the same Name/content shape.
            let entries = match value {
                Value::Array(entries) => entries.as_slice(),
                Value::Object(_) => std::slice::from_ref(value),
                _ => continue,
            };
            for entry in entries {
                let name = entry.get("Name").and_then(Value::as_str);
                let content = entry.get(CONTENT_FIELD);
                match (name, content) {
                    (Some(name), Some(content)) => {
                        out.insert(name.to_string(), content.clone());
                    }
                    _ => {
                        debug!("Skipping EventData entry without Name/content shape");
                        metrics::counter!(FLATTEN_SKIPPED_ENTRIES_COUNTER).increment(1);
                    }
                }
            }
        }
    }

    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::parse_event;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn flattens_system_and_event_data() {
        let tree = parse_event(
            "<Event><System><Computer>HOST1</Computer><EventRecordID>42</EventRecordID></System>\
             <EventData><Data Name=\"User\">alice</Data></EventData></Event>",
        )
        .unwrap();

        assert_json_eq!(
            flatten(&tree),
            json!({"Computer": "HOST1", "EventRecordID": "42", "User": "alice"})
        );
    }

    #[test]
    fn hoists_nested_system_structures() {
        let tree = parse_event(
            "<Event><System>\
             <Provider Name=\"Security\" Guid=\"{123}\"/>\
             <TimeCreated SystemTime=\"2024-01-01T00:00:00Z\"/>\
             <EventID>4624</EventID>\
             </System><EventData/></Event>",
        )
        .unwrap();

        assert_json_eq!(
            flatten(&tree),
            json!({
                "Name": "Security",
                "Guid": "{123}",
                "SystemTime": "2024-01-01T00:00:00Z",
                "EventID": "4624",
            })
        );
    }

    #[test]
    fn event_data_wins_name_collisions() {
        let tree = parse_event(
            "<Event><System><Computer>HOST1</Computer></System>\
             <EventData><Data Name=\"Computer\">spoofed</Data></EventData></Event>",
        )
        .unwrap();

        assert_eq!(flatten(&tree).get("Computer").unwrap(), &json!("spoofed"));
    }

    #[test]
    fn entries_without_name_or_content_are_skipped() {
        let tree = parse_event(
            "<Event><System><Computer>HOST1</Computer></System>\
             <EventData>\
             <Data>anonymous</Data>\
             <Data Name=\"Empty\"/>\
             <Data Name=\"User\">alice</Data>\
             <Data Name=\"Level\">4</Data>\
             </EventData></Event>",
        )
        .unwrap();

        // The bare-text entry lacks Name, the empty entry lacks content;
        // neither raises an error and neither contributes a field.
        assert_json_eq!(
            flatten(&tree),
            json!({"Computer": "HOST1", "User": "alice", "Level": "4"})
        );
    }

    #[test]
    fn missing_substructures_contribute_nothing() {
        let tree = json!({"Event": {"System": "not an object"}});
        assert_json_eq!(flatten(&tree), json!({}));

        let tree = json!({"OtherRoot": {}});
        assert_json_eq!(flatten(&tree), json!({}));
    }

    #[test]
    fn flatten_is_deterministic() {
        let tree = parse_event(
            "<Event><System><Computer>HOST1</Computer><EventRecordID>9</EventRecordID></System>\
             <EventData><Data Name=\"A\">1</Data><Data Name=\"B\">2</Data></EventData></Event>",
        )
        .unwrap();

        assert_eq!(flatten(&tree), flatten(&tree));
        assert_eq!(
            serde_json::to_string(&flatten(&tree)).unwrap(),
            serde_json::to_string(&flatten(&tree)).unwrap()
        );
    }
}
