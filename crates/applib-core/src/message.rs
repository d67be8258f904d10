//! Protocol messages.
//!
//! Requests flow client -> server as tagged JSON objects. Server -> client
//! traffic is a closed set of [`Instruction`]s; nothing the server sends is
//! ever executed as code.

use crate::SessionToken;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Weight given to menu nodes and tabs that never received one.
pub const DEFAULT_WEIGHT: i64 = 500;

fn default_weight() -> i64 {
    DEFAULT_WEIGHT
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    /// Run a fixed query on the backend and reply to the named callback.
    DbQueryConstant { query: String, callback: String },
    /// Ask the server to reattach the previous session context.
    ResumeSession { token: SessionToken },
}

impl Request {
    /// Build a `db-query-constant` request.
    pub fn query_constant(query: impl Into<String>, callback: impl Into<String>) -> Self {
        Request::DbQueryConstant {
            query: query.into(),
            callback: callback.into(),
        }
    }

    /// Serialize to the JSON object form used on the wire.
    pub fn to_value(&self) -> Value {
        // Every variant is a struct variant with string fields, so this cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Which tab container an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabSide {
    /// The left pane's tab strip.
    Left,
    /// The right pane's tab strip.
    Right,
}

impl TabSide {
    /// Wire name of the side (`"left"` or `"right"`).
    pub fn as_str(self) -> &'static str {
        match self {
            TabSide::Left => "left",
            TabSide::Right => "right",
        }
    }
}

impl fmt::Display for TabSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TabSide {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(TabSide::Left),
            "right" => Ok(TabSide::Right),
            other => Err(ProtocolError::UnknownSide(other.to_string())),
        }
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Instruction {
    /// Deliver `data` to the handler registered under `callback`.
    Callback {
        callback: String,
        #[serde(default)]
        data: Value,
    },
    /// Declare (or update) a menu item at `path`.
    AddMenuItem {
        path: Vec<String>,
        #[serde(default = "default_weight")]
        weight: i64,
        #[serde(default)]
        action: String,
    },
    /// Append a tab to one of the tab strips.
    AddTab {
        side: TabSide,
        label: String,
        #[serde(default = "default_weight")]
        weight: i64,
        #[serde(default)]
        action: String,
        #[serde(default)]
        focused: bool,
    },
    /// Point a side's content area at a new URL.
    Navigate { side: TabSide, url: String },
    /// Token to present when the connection is re-established.
    SessionToken { token: SessionToken },
    /// Persist a client-side preference.
    SetClientProp { key: String, value: String },
}

impl Instruction {
    /// Decode one inbound frame.
    ///
    /// Accepts either a tagged JSON object or the legacy `name(<json>);`
    /// reply form, which maps onto [`Instruction::Callback`].
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let text = raw.trim();
        if text.starts_with('{') {
            return serde_json::from_str(text).map_err(DecodeError::Json);
        }
        decode_call(text)
    }
}

fn decode_call(text: &str) -> Result<Instruction, DecodeError> {
    let body = text.strip_suffix(';').unwrap_or(text).trim_end();
    let (name, rest) = body
        .split_once('(')
        .ok_or_else(|| DecodeError::Malformed(text.to_string()))?;
    let args = rest
        .strip_suffix(')')
        .ok_or_else(|| DecodeError::Malformed(text.to_string()))?;

    let name = name.trim();
    let valid_name = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$');
    if !valid_name {
        return Err(DecodeError::Malformed(text.to_string()));
    }

    let data = if args.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(args).map_err(DecodeError::Json)?
    };

    Ok(Instruction::Callback {
        callback: name.to_string(),
        data,
    })
}

/// Check that an outgoing envelope is a JSON object.
///
/// Arrays, strings, numbers, booleans and null are rejected.
pub fn envelope_object(value: &Value) -> Result<&Map<String, Value>, ProtocolError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ProtocolError::NotAMapping(value_kind(other))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Invalid input handed to the protocol by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The outgoing envelope was not a JSON object. Carries the JSON kind found.
    #[error("request envelope must be a JSON object, got {0}")]
    NotAMapping(&'static str),
    /// A tab side other than `left` or `right`.
    #[error("unknown tab side: {0}")]
    UnknownSide(String),
}

/// An inbound frame that could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognized frame: {0}")]
    Malformed(String),
}
