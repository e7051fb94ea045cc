//! Script side-table
//!
//! Populated from `Debugger.scriptParsed` so that locations reported by the
//! engine (script id + line + column) can later be rendered as source text.

use std::collections::HashMap;

use serde_json::Value;

use crate::common::{Error, Result};

/// Snapshot of one parsed script
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRecord {
    /// Deep copy of the `scriptParsed` params
    pub info: Value,
    /// Source text, fetched on first use
    pub source: Option<String>,
}

impl ScriptRecord {
    pub fn url(&self) -> Option<&str> {
        self.info.get("url").and_then(|u| u.as_str())
    }
}

/// Script id → record
#[derive(Debug, Default)]
pub struct ScriptMap {
    scripts: HashMap<String, ScriptRecord>,
}

impl ScriptMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `Debugger.scriptParsed` payload, replacing any earlier entry
    pub fn record(&mut self, params: &Value) -> Result<()> {
        let id = script_id(params.get("scriptId"))
            .ok_or_else(|| Error::malformed("Debugger.scriptParsed without a scriptId"))?;
        self.scripts.insert(
            id,
            ScriptRecord {
                info: params.clone(),
                source: None,
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ScriptRecord> {
        self.scripts.get(id)
    }

    /// Cache fetched source text; returns false for unknown scripts
    pub fn set_source(&mut self, id: &str, source: String) -> bool {
        match self.scripts.get_mut(id) {
            Some(record) => {
                record.source = Some(source);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Normalize a script id value to its map key
///
/// Engines send ids as strings; numeric ids are accepted too.
pub fn script_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Render the lines around a location with `#` marking the column
///
/// Shows the previous line, the location's line and the next line. A column
/// past the end of the line puts the marker at the end.
pub fn annotate_location(source: &str, line_number: usize, column_number: usize) -> Result<String> {
    let mut lines: Vec<String> = source.split('\n').map(str::to_string).collect();

    let line = lines.get_mut(line_number).ok_or_else(|| {
        Error::malformed(format!(
            "line {} is outside the script ({} lines)",
            line_number,
            source.split('\n').count()
        ))
    })?;

    let split = line
        .char_indices()
        .nth(column_number)
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    line.insert(split, '#');

    let start = line_number.saturating_sub(1);
    let end = (line_number + 2).min(lines.len());
    Ok(lines[start..end].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_is_a_snapshot() {
        let mut map = ScriptMap::new();
        let mut params = json!({"scriptId": "42", "url": "foo.js"});
        map.record(&params).unwrap();
        params["url"] = json!("changed.js");

        assert_eq!(map.get("42").unwrap().url(), Some("foo.js"));
        assert!(map.get("42").unwrap().source.is_none());
    }

    #[test]
    fn test_record_requires_script_id() {
        let mut map = ScriptMap::new();
        assert!(map.record(&json!({"url": "foo.js"})).is_err());
        assert!(map.is_empty());
    }

    #[test]
    fn test_numeric_script_id() {
        let mut map = ScriptMap::new();
        map.record(&json!({"scriptId": 7})).unwrap();
        assert!(map.set_source("7", "let a;".into()));
        assert_eq!(map.get("7").unwrap().source.as_deref(), Some("let a;"));
        assert!(!map.set_source("8", String::new()));
    }

    #[test]
    fn test_annotate_middle_line() {
        let source = "function foo() {\n  debugger;\n}\nfoo();";
        let text = annotate_location(source, 1, 2).unwrap();
        assert_eq!(text, "function foo() {\n  #debugger;\n}");
    }

    #[test]
    fn test_annotate_first_line_and_overlong_column() {
        let source = "a();\nb();";
        assert_eq!(annotate_location(source, 0, 100).unwrap(), "a();#\nb();");
    }

    #[test]
    fn test_annotate_out_of_range() {
        assert!(annotate_location("a();", 3, 0).is_err());
    }
}
