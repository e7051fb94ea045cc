//! Deterministic protocol traces
//!
//! [`normalize`] masks identifiers that change between runs and [`dump`]
//! renders any JSON value as a sorted, indented tree. Together they turn a
//! protocol message into a stable block of text.

mod dump;
mod normalize;

pub use dump::dump;
pub use normalize::{is_volatile, normalize, MESSAGE_ID_PLACEHOLDER, VOLATILE_FIELDS};

use serde_json::Value;

/// Normalized, dumped rendering of one protocol message
pub fn render_message(message: &Value) -> String {
    dump(&normalize(message), None)
}
