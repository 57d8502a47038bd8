//! Wire format of the proxy endpoint
//!
//! `POST /mongodb` takes a [`ProxyRequest`] and answers with either
//! `{"data": ...}` or `{"error": ..., "details": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A JSON object as sent to or received from the document database
pub type JsonDocument = Map<String, Value>;

/// The four database verbs the proxy understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "find")]
    Find,
    #[serde(rename = "findOne")]
    FindOne,
    #[serde(rename = "insertOne")]
    InsertOne,
    #[serde(rename = "updateOne")]
    UpdateOne,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Find => "find",
            Action::FindOne => "findOne",
            Action::InsertOne => "insertOne",
            Action::UpdateOne => "updateOne",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an action name is not one of the four verbs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid action")]
pub struct InvalidAction;

impl FromStr for Action {
    type Err = InvalidAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "find" => Ok(Action::Find),
            "findOne" => Ok(Action::FindOne),
            "insertOne" => Ok(Action::InsertOne),
            "updateOne" => Ok(Action::UpdateOne),
            _ => Err(InvalidAction),
        }
    }
}

/// Where agent documents live: connection string, database and collection.
///
/// This is also the per-user record kept by the settings store. Every data
/// access call takes it explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

impl ConnectionSettings {
    pub fn new(
        uri: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// True when uri, database and collection are all filled in
    pub fn is_complete(&self) -> bool {
        !self.uri.is_empty() && !self.database.is_empty() && !self.collection.is_empty()
    }

    /// Database and collection lower-cased, as the console addresses them
    pub fn normalized(&self) -> Self {
        Self {
            uri: self.uri.clone(),
            database: self.database.to_lowercase(),
            collection: self.collection.to_lowercase(),
        }
    }

    /// Same connection and database, different collection
    pub fn with_collection(&self, collection: impl Into<String>) -> Self {
        Self {
            uri: self.uri.clone(),
            database: self.database.clone(),
            collection: collection.into(),
        }
    }
}

/// Body of `POST /mongodb`.
///
/// `action` stays a plain string on the wire so that an unknown verb reaches
/// the proxy and is rejected there with "Invalid action".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    #[serde(default)]
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<JsonDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<JsonDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<JsonDocument>,
}

impl ProxyRequest {
    fn base(target: &ConnectionSettings, action: Action) -> Self {
        Self {
            uri: target.uri.clone(),
            database: target.database.clone(),
            collection: target.collection.clone(),
            action: action.as_str().to_string(),
            filter: None,
            document: None,
            update: None,
        }
    }

    pub fn find(target: &ConnectionSettings) -> Self {
        Self::base(target, Action::Find)
    }

    pub fn find_one(target: &ConnectionSettings, filter: JsonDocument) -> Self {
        Self {
            filter: Some(filter),
            ..Self::base(target, Action::FindOne)
        }
    }

    pub fn insert_one(target: &ConnectionSettings, document: JsonDocument) -> Self {
        Self {
            document: Some(document),
            ..Self::base(target, Action::InsertOne)
        }
    }

    pub fn update_one(
        target: &ConnectionSettings,
        filter: JsonDocument,
        update: JsonDocument,
    ) -> Self {
        Self {
            filter: Some(filter),
            update: Some(update),
            ..Self::base(target, Action::UpdateOne)
        }
    }

    /// Parse the action name
    pub fn action(&self) -> Result<Action, InvalidAction> {
        self.action.parse()
    }
}

/// Success envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Failure envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Result of `insertOne`, shaped like the driver's own result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOneResult {
    pub acknowledged: bool,
    pub inserted_id: Value,
}

/// Result of `updateOne`. A filter that matches nothing is not an error;
/// it shows up as `matched_count == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
    #[serde(default)]
    pub upserted_id: Option<Value>,
}
