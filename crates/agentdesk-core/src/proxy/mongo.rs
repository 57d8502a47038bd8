//! MongoDB backend for the proxy
//!
//! One `Client` per request, shut down afterwards. JSON payloads are read
//! as MongoDB extended JSON, so `{"$oid": ...}` in a filter addresses an
//! ObjectId; results come back as relaxed extended JSON.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Client, Collection};
use serde_json::Value;

use agentdesk_client::{InsertOneResult, JsonDocument, UpdateResult};

use super::{DocumentConnector, DocumentSession, ProxyError};

pub struct MongoConnector;

#[async_trait]
impl DocumentConnector for MongoConnector {
    async fn connect(&self, uri: &str) -> Result<Box<dyn DocumentSession>, ProxyError> {
        let client = Client::with_uri_str(uri).await?;

        // the driver connects lazily; ping so a bad URI fails here
        if let Err(e) = client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
        {
            client.shutdown().await;
            return Err(e.into());
        }

        Ok(Box::new(MongoSession { client }))
    }
}

struct MongoSession {
    client: Client,
}

impl MongoSession {
    fn collection(&self, database: &str, collection: &str) -> Collection<Document> {
        self.client.database(database).collection(collection)
    }
}

fn to_bson(document: JsonDocument) -> Result<Document, ProxyError> {
    match Bson::try_from(Value::Object(document)) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(other) => Err(ProxyError::Backend(format!(
            "Expected a document, got {:?}",
            other.element_type()
        ))),
        Err(e) => Err(ProxyError::Backend(format!("Invalid extended JSON: {}", e))),
    }
}

fn to_json(document: Document) -> JsonDocument {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => JsonDocument::new(),
    }
}

#[async_trait]
impl DocumentSession for MongoSession {
    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: JsonDocument,
    ) -> Result<Vec<JsonDocument>, ProxyError> {
        let cursor = self
            .collection(database, collection)
            .find(to_bson(filter)?, None)
            .await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents.into_iter().map(to_json).collect())
    }

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: JsonDocument,
    ) -> Result<Option<JsonDocument>, ProxyError> {
        let document = self
            .collection(database, collection)
            .find_one(to_bson(filter)?, None)
            .await?;
        Ok(document.map(to_json))
    }

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: JsonDocument,
    ) -> Result<InsertOneResult, ProxyError> {
        let result = self
            .collection(database, collection)
            .insert_one(to_bson(document)?, None)
            .await?;
        Ok(InsertOneResult {
            acknowledged: true,
            inserted_id: result.inserted_id.into_relaxed_extjson(),
        })
    }

    async fn update_one(
        &self,
        database: &str,
        collection: &str,
        filter: JsonDocument,
        update: JsonDocument,
    ) -> Result<UpdateResult, ProxyError> {
        let result = self
            .collection(database, collection)
            .update_one(to_bson(filter)?, to_bson(update)?, None)
            .await?;
        Ok(UpdateResult {
            acknowledged: true,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_count: u64::from(result.upserted_id.is_some()),
            upserted_id: result.upserted_id.map(Bson::into_relaxed_extjson),
        })
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extended_json_filter() {
        let filter = json!({ "_id": { "$oid": "65a1f0c2e4b0a1b2c3d4e5f6" } });
        let doc = to_bson(filter.as_object().cloned().unwrap()).unwrap();

        assert!(matches!(doc.get("_id"), Some(Bson::ObjectId(_))));
    }

    #[test]
    fn test_plain_fields_survive_round_trip() {
        let original = json!({
            "agent_id": "a-1",
            "tools": [{ "id": "t", "name": "Menu" }],
            "name": "Planner"
        });
        let doc = to_bson(original.as_object().cloned().unwrap()).unwrap();
        assert_eq!(Value::Object(to_json(doc)), original);
    }
}
