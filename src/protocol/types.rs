//! Inspector protocol message types
//!
//! Responses and events are kept as the verbatim JSON the peer sent. The
//! harness logs and compares them as-is, so nothing is dropped by a typed
//! round trip.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{Error, Result};

/// Logical sub-connection identifier sharing one transport
pub type ChannelId = i32;

/// Channel used when a caller does not name one
pub const DEFAULT_CHANNEL: ChannelId = 0;

/// Outgoing command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: i64,
    pub method: String,
    pub params: Value,
}

/// Reply to a command, correlated by `id`
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    id: Option<i64>,
    raw: Value,
}

impl Response {
    /// The correlation id, or `None` when the peer sent a number no request
    /// could have used (fractional or out of `i64` range)
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// The `result` member, if any
    pub fn result(&self) -> Option<&Value> {
        self.raw.get("result")
    }

    /// The `error` member, if any
    pub fn error(&self) -> Option<&Value> {
        self.raw.get("error").filter(|e| !e.is_null())
    }

    /// Whether the peer reported a protocol-level failure
    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }

    /// Look up a value inside `result` by JSON pointer (e.g. `/result/value`)
    pub fn result_at(&self, pointer: &str) -> Option<&Value> {
        self.result().and_then(|r| r.pointer(pointer))
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn into_value(self) -> Value {
        self.raw
    }
}

/// Unsolicited notification from the peer
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    method: String,
    raw: Value,
}

impl Event {
    /// Fully qualified name, e.g. `Debugger.paused`
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The event's `params`, or `Null` when the peer sent none
    pub fn params(&self) -> &Value {
        self.raw.get("params").unwrap_or(&Value::Null)
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn into_value(self) -> Value {
        self.raw
    }
}

/// A parsed inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Response(Response),
    Event(Event),
}

impl Message {
    /// Classify a decoded message
    ///
    /// Any numeric `id` makes a response; otherwise a string `method` makes
    /// an event. Anything else is malformed.
    pub fn classify(raw: Value) -> Result<Self> {
        if !raw.is_object() {
            return Err(Error::malformed(format!("expected an object, got {}", raw)));
        }

        match raw.get("id") {
            Some(Value::Number(n)) => {
                let id = n.as_i64();
                return Ok(Message::Response(Response { id, raw }));
            }
            Some(Value::Null) | None => {}
            Some(other) => {
                tracing::trace!("Ignoring non-numeric id {}", other);
            }
        }

        let method = raw
            .get("method")
            .and_then(|m| m.as_str())
            .ok_or_else(|| Error::malformed("message has neither a numeric id nor a method"))?
            .to_string();

        Ok(Message::Event(Event { method, raw }))
    }
}

/// A message handed over by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Already-decoded JSON
    Json(Value),
    /// Serialized text still to be parsed
    Text(String),
}

impl Inbound {
    /// Decode into JSON
    pub fn into_value(self) -> Result<Value> {
        match self {
            Inbound::Json(value) => Ok(value),
            Inbound::Text(text) => serde_json::from_str(&text)
                .map_err(|e| Error::malformed(format!("invalid JSON: {}", e))),
        }
    }
}

impl From<Value> for Inbound {
    fn from(value: Value) -> Self {
        Inbound::Json(value)
    }
}

impl From<String> for Inbound {
    fn from(text: String) -> Self {
        Inbound::Text(text)
    }
}
