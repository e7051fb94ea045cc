//! Structured text rendering of nested values
//!
//! Output format:
//! ```text
//! title{
//!     key : value
//!     list : [
//!         [0] : item
//!     ]
//! }
//! ```
//! Mapping keys are sorted so the rendering does not depend on the order in
//! which an engine emitted them.

use serde_json::{Map, Value};

const INDENT: &str = "    ";

/// Render `value`, prefixing the first line with `title`
pub fn dump(value: &Value, title: Option<&str>) -> String {
    let mut lines = Vec::new();
    dump_value(value, "", title.unwrap_or(""), &mut lines);
    lines.join("\n")
}

fn dump_value(value: &Value, prefix: &str, prefix_with_name: &str, lines: &mut Vec<String>) {
    match value {
        Value::Object(object) => dump_properties(object, prefix, prefix_with_name, lines),
        Value::Array(items) => dump_items(items, prefix, prefix_with_name, lines),
        scalar => lines.push(format!(
            "{}{}",
            prefix_with_name,
            scalar_text(scalar).replace('\n', " ")
        )),
    }
}

fn dump_properties(
    object: &Map<String, Value>,
    prefix: &str,
    first_line_prefix: &str,
    lines: &mut Vec<String>,
) {
    let first_line_prefix = if first_line_prefix.is_empty() { prefix } else { first_line_prefix };
    lines.push(format!("{}{{", first_line_prefix));

    let mut names: Vec<&String> = object.keys().collect();
    names.sort();
    let nested = format!("{}{}", INDENT, prefix);
    for name in names {
        let prefix_with_name = format!("{}{} : ", nested, name);
        dump_value(&object[name.as_str()], &nested, &prefix_with_name, lines);
    }

    lines.push(format!("{}}}", prefix));
}

fn dump_items(items: &[Value], prefix: &str, first_line_prefix: &str, lines: &mut Vec<String>) {
    let first_line_prefix = if first_line_prefix.is_empty() { prefix } else { first_line_prefix };
    lines.push(format!("{}[", first_line_prefix));

    let nested = format!("{}{}", INDENT, prefix);
    for (i, item) in items.iter().enumerate() {
        let prefix_with_name = format!("{}[{}] : ", nested, i);
        dump_value(item, &nested, &prefix_with_name, lines);
    }

    lines.push(format!("{}]", prefix));
}

/// Scalar as plain text: strings unquoted, numbers as a JS engine prints them
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                n.as_f64().map(js_number).unwrap_or_else(|| n.to_string())
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Render a float the way JavaScript's `String(number)` does
///
/// Uses the shortest round-trip digits, plain notation for decimal
/// exponents in `-7..21` and `d.ddde±x` otherwise.
fn js_number(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if f == 0.0 {
        return "0".to_string();
    }

    let sign = if f < 0.0 { "-" } else { "" };
    let scientific = format!("{:e}", f.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let n = exponent + 1;

    let body = if k <= n && n <= 21 {
        format!("{}{}", digits, "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        format!("{}.{}", int, frac)
    } else if -6 < n && n <= 0 {
        format!("0.{}{}", "0".repeat((-n) as usize), digits)
    } else {
        let (first, rest) = digits.split_at(1);
        let fraction = if rest.is_empty() {
            String::new()
        } else {
            format!(".{}", rest)
        };
        let exp_sign = if n - 1 < 0 { "-" } else { "+" };
        format!("{}{}e{}{}", first, fraction, exp_sign, (n - 1).abs())
    };
    format!("{}{}", sign, body)
}
