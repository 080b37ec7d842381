//! Wire envelope shared by the diagnose backend and its live front ends.
//! Only the routing field is typed here; everything else the backend emits
//! rides along untouched so presentation layers can pick what they need
//! without the relay core depending on it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Wire key carrying the UI target of an event.
pub const TARGET_ID_KEY: &str = "targetId";
/// Older backends address the target through the per-line class name.
pub const LEGACY_TARGET_KEY: &str = "classname";

/// One record streamed by the backend, e.g. "this source line just executed".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct DiagnosticEvent {
    #[serde(rename = "targetId")]
    pub target_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DiagnosticEvent {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Source file reported by line-trace backends, when present.
    pub fn filename(&self) -> Option<&str> {
        self.extra.get("filename").and_then(Value::as_str)
    }

    pub fn lineno(&self) -> Option<u64> {
        self.extra.get("lineno").and_then(Value::as_u64)
    }

    /// Backend-assigned sequence id. Distinct from the relay's own arrival
    /// numbering, which never trusts the backend for ordering.
    pub fn backend_id(&self) -> Option<u64> {
        self.extra.get("id").and_then(Value::as_u64)
    }
}

impl TryFrom<Value> for DiagnosticEvent {
    type Error = MalformedEventError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut fields) = value else {
            return Err(MalformedEventError::NotAnObject {
                found: json_kind(&value),
            });
        };
        let raw = fields
            .remove(TARGET_ID_KEY)
            .or_else(|| fields.remove(LEGACY_TARGET_KEY))
            .ok_or(MalformedEventError::MissingTarget)?;
        let target_id = match raw {
            Value::String(text) if text.trim().is_empty() => {
                return Err(MalformedEventError::EmptyTarget);
            }
            Value::String(text) => text,
            Value::Number(number) if number.is_i64() || number.is_u64() => number.to_string(),
            other => {
                return Err(MalformedEventError::InvalidTarget {
                    found: json_kind(&other),
                });
            }
        };
        Ok(Self {
            target_id,
            extra: fields,
        })
    }
}

#[derive(Debug, Error)]
pub enum MalformedEventError {
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload must be a json object, found {found}")]
    NotAnObject { found: &'static str },
    #[error("payload has no `targetId` or `classname` field")]
    MissingTarget,
    #[error("target id must be a string or integer, found {found}")]
    InvalidTarget { found: &'static str },
    #[error("target id is empty")]
    EmptyTarget,
}

/// Decode one inbound message into an event.
pub fn decode_event(payload: &str) -> Result<DiagnosticEvent, MalformedEventError> {
    let value: Value = serde_json::from_str(payload)?;
    DiagnosticEvent::try_from(value)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Control command sent to the backend. Commands travel as bare text frames
/// (`start`, not `"start"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Start,
    Pause,
    Resume,
    Stop,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop => "stop",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown command `{0}`")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" => Ok(Command::Start),
            "pause" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            "stop" => Ok(Command::Stop),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}
