//! Masking of run-to-run volatile fields
//!
//! Identifiers handed out by the engine (object ids, script ids, timestamps,
//! ...) differ between runs. Replacing them with fixed placeholders makes
//! protocol traces comparable against checked-in expectations.

use serde_json::{Map, Value};

/// Keys whose values are replaced by `<key>` wherever they appear
pub const VOLATILE_FIELDS: &[&str] = &[
    "objectId",
    "scriptId",
    "exceptionId",
    "timestamp",
    "executionContextId",
    "callFrameId",
    "breakpointId",
    "bindRemoteObjectFunctionId",
    "formatterObjectId",
];

/// Replacement for a top-level message id
pub const MESSAGE_ID_PLACEHOLDER: &str = "<messageId>";

pub fn is_volatile(key: &str) -> bool {
    VOLATILE_FIELDS.contains(&key)
}

/// Return a copy of `message` with volatile fields masked
///
/// A truthy top-level `id` becomes [`MESSAGE_ID_PLACEHOLDER`]; every volatile
/// key at any depth becomes `"<key>"`. Applying it twice changes nothing.
pub fn normalize(message: &Value) -> Value {
    let mut normalized = mask(message);
    if let Some(object) = normalized.as_object_mut() {
        if object.get("id").is_some_and(is_truthy) {
            object.insert("id".to_string(), Value::String(MESSAGE_ID_PLACEHOLDER.to_string()));
        }
    }
    normalized
}

fn mask(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let masked: Map<String, Value> = object
                .iter()
                .map(|(key, value)| {
                    let value = if is_volatile(key) {
                        Value::String(format!("<{}>", key))
                    } else {
                        mask(value)
                    };
                    (key.clone(), value)
                })
                .collect();
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(mask).collect()),
        scalar => scalar.clone(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_masks_nested_fields() {
        let message = json!({
            "id": 12,
            "result": {
                "result": {"type": "object", "objectId": "{\"injectedScriptId\":1,\"id\":1}"},
                "frames": [{"callFrameId": "cf1", "location": {"scriptId": "33", "lineNumber": 2}}]
            }
        });

        assert_eq!(
            normalize(&message),
            json!({
                "id": "<messageId>",
                "result": {
                    "result": {"type": "object", "objectId": "<objectId>"},
                    "frames": [{"callFrameId": "<callFrameId>", "location": {"scriptId": "<scriptId>", "lineNumber": 2}}]
                }
            })
        );
    }

    #[test]
    fn test_volatile_object_is_replaced_whole() {
        let message = json!({"method": "Runtime.executionContextCreated", "params": {"timestamp": {"nested": 1}}});
        assert_eq!(normalize(&message)["params"]["timestamp"], "<timestamp>");
    }

    #[test]
    fn test_input_is_not_mutated() {
        let message = json!({"id": 1, "params": {"scriptId": "5"}});
        let _ = normalize(&message);
        assert_eq!(message["params"]["scriptId"], "5");
    }

    #[test]
    fn test_only_truthy_top_level_id_is_masked() {
        assert_eq!(normalize(&json!({"id": 0}))["id"], 0);
        assert_eq!(
            normalize(&json!({"result": {"id": 7}}))["result"]["id"],
            7
        );
    }

    #[test]
    fn test_idempotent() {
        let message = json!({
            "id": 3,
            "params": {"breakpointId": "1:2:0", "locations": [{"scriptId": "9"}], "<scriptId>": 1}
        });
        let once = normalize(&message);
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_key_order_is_preserved() {
        let message = json!({"method": "Debugger.paused", "params": {"reason": "other", "hitBreakpoints": []}});
        let text = normalize(&message).to_string();
        assert_eq!(
            text,
            r#"{"method":"Debugger.paused","params":{"reason":"other","hitBreakpoints":[]}}"#
        );
    }
}
