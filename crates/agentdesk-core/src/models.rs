//! Agent records and the signed-in user

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use agentdesk_client::JsonDocument;

use crate::tools::Tool;

/// Prompt every new agent starts with
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful agent";

/// The signed-in user. Owned by the auth provider; only read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// An agent configuration document.
///
/// Identity is `agent_id`; the database's own `_id` is carried along
/// untouched and never used for lookups. Every other field may be missing
/// from a stored document and reads as empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<Value>,
    pub agent_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: String,
    #[serde(default, deserialize_with = "timestamp")]
    pub updated_at: String,
}

impl Agent {
    /// A fresh agent owned by `created_by`, with a new id and the default prompt
    pub fn new(name: impl Into<String>, created_by: impl Into<String>) -> Self {
        let now = timestamp_now();
        Self {
            object_id: None,
            agent_id: Uuid::new_v4().to_string(),
            name: name.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tools: Vec::new(),
            created_by: created_by.into(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn from_document(document: JsonDocument) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(document))
    }

    pub fn to_document(&self) -> Result<JsonDocument, serde_json::Error> {
        to_document(self)
    }
}

/// Current time as an RFC 3339 UTC string with millisecond precision
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Reads a timestamp stored either as text or as a BSON date in extended
/// JSON (`{"$date": "..."}` or `{"$date": {"$numberLong": "..."}}`).
fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        Value::Object(ref map) => match map.get("$date") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Object(date)) => date
                .get("$numberLong")
                .and_then(Value::as_str)
                .and_then(|millis| millis.parse::<i64>().ok())
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_else(|| value.to_string()),
            _ => value.to_string(),
        },
        other => other.to_string(),
    })
}

/// Serialize a value that must come out as a JSON object
pub fn to_document<T: Serialize>(value: &T) -> Result<JsonDocument, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}
