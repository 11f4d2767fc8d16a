//! Tap protocol messages.
//!
//! Taps emit one JSON object per stdout line, discriminated by a `type`
//! field. Classification is total: a line that fails to parse, lacks the
//! discriminator, or carries an unrecognized type becomes [`TapMessage::Unknown`]
//! with the raw text, because one bad line must never abort a run.

use serde::Deserialize;
use serde_json::Value;

/// One classified line of tap output.
#[derive(Debug, Clone, PartialEq)]
pub enum TapMessage {
    /// Stream schema announcement; logged, never persisted.
    Schema { stream: String },
    /// One extracted record for `stream`.
    Record { stream: String, record: Value },
    /// Checkpoint value; the last one observed in a run is persisted.
    State { value: Value },
    /// Anything unparseable or unrecognized, carrying the raw line.
    Unknown(String),
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum WireMessage {
    #[serde(rename = "SCHEMA")]
    Schema {
        #[serde(default)]
        stream: String,
    },
    #[serde(rename = "RECORD")]
    Record {
        #[serde(default)]
        stream: String,
        #[serde(default = "empty_object")]
        record: Value,
    },
    #[serde(rename = "STATE")]
    State {
        #[serde(default)]
        value: Value,
    },
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl TapMessage {
    /// Classify a raw output line. Never fails.
    pub fn classify(line: &str) -> TapMessage {
        match serde_json::from_str::<WireMessage>(line) {
            Ok(WireMessage::Schema { stream }) => TapMessage::Schema { stream },
            Ok(WireMessage::Record { stream, record }) => TapMessage::Record { stream, record },
            Ok(WireMessage::State { value }) => TapMessage::State { value },
            Err(_) => TapMessage::Unknown(line.to_string()),
        }
    }

    /// Stream identifier, where the message kind carries one.
    pub fn stream(&self) -> Option<&str> {
        match self {
            TapMessage::Schema { stream } | TapMessage::Record { stream, .. } => Some(stream),
            _ => None,
        }
    }
}
