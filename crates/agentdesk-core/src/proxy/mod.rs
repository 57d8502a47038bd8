//! Database proxy
//!
//! Translates one [`ProxyRequest`] into one document-database operation:
//! validate the request, open a connection, run the verb, close the
//! connection. The connection is closed whether the verb succeeded or not.
//! There is no pooling and no retry.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use agentdesk_client::wire::InvalidAction;
use agentdesk_client::{
    Action, ClientError, ConnectionSettings, DocumentGateway, InsertOneResult, JsonDocument,
    ProxyRequest, UpdateResult,
};

pub use memory::MemoryConnector;
pub use mongo::MongoConnector;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("Invalid action")]
    InvalidAction,
    #[error("Document is required for insertOne")]
    MissingDocument,
    #[error("Filter and update are required for updateOne")]
    MissingFilterOrUpdate,
    #[error("MongoDB URI not configured")]
    UriNotConfigured,
    #[error("{0}")]
    Driver(#[from] mongodb::error::Error),
    #[error("{0}")]
    Backend(String),
}

impl From<InvalidAction> for ProxyError {
    fn from(_: InvalidAction) -> Self {
        ProxyError::InvalidAction
    }
}

/// Opens a connection to a document database
#[async_trait]
pub trait DocumentConnector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Box<dyn DocumentSession>, ProxyError>;
}

/// One open connection. Dropped after a single verb.
#[async_trait]
pub trait DocumentSession: Send + Sync {
    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: JsonDocument,
    ) -> Result<Vec<JsonDocument>, ProxyError>;

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: JsonDocument,
    ) -> Result<Option<JsonDocument>, ProxyError>;

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: JsonDocument,
    ) -> Result<InsertOneResult, ProxyError>;

    async fn update_one(
        &self,
        database: &str,
        collection: &str,
        filter: JsonDocument,
        update: JsonDocument,
    ) -> Result<UpdateResult, ProxyError>;

    async fn close(&self);
}

/// A request whose verb-specific arguments have been checked
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Find { filter: JsonDocument },
    FindOne { filter: JsonDocument },
    InsertOne { document: JsonDocument },
    UpdateOne { filter: JsonDocument, update: JsonDocument },
}

impl Command {
    pub fn action(&self) -> Action {
        match self {
            Command::Find { .. } => Action::Find,
            Command::FindOne { .. } => Action::FindOne,
            Command::InsertOne { .. } => Action::InsertOne,
            Command::UpdateOne { .. } => Action::UpdateOne,
        }
    }
}

impl TryFrom<&ProxyRequest> for Command {
    type Error = ProxyError;

    fn try_from(request: &ProxyRequest) -> Result<Self, ProxyError> {
        let filter = || request.filter.clone().unwrap_or_default();

        match request.action()? {
            Action::Find => Ok(Command::Find { filter: filter() }),
            Action::FindOne => Ok(Command::FindOne { filter: filter() }),
            Action::InsertOne => {
                let document = request.document.clone().ok_or(ProxyError::MissingDocument)?;
                Ok(Command::InsertOne { document })
            }
            Action::UpdateOne => match (&request.filter, &request.update) {
                (Some(filter), Some(update)) => Ok(Command::UpdateOne {
                    filter: filter.clone(),
                    update: update.clone(),
                }),
                _ => Err(ProxyError::MissingFilterOrUpdate),
            },
        }
    }
}

/// Pick the request's own URI, falling back to the server default
pub fn resolve_uri<'a>(
    request: &'a ProxyRequest,
    default_uri: Option<&'a str>,
) -> Result<&'a str, ProxyError> {
    if !request.uri.is_empty() {
        return Ok(&request.uri);
    }
    default_uri
        .filter(|uri| !uri.is_empty())
        .ok_or(ProxyError::UriNotConfigured)
}

/// Run one proxied request and return the `data` payload
pub async fn execute(
    connector: &dyn DocumentConnector,
    request: &ProxyRequest,
    default_uri: Option<&str>,
) -> Result<Value, ProxyError> {
    let command = Command::try_from(request)?;
    let uri = resolve_uri(request, default_uri)?;

    info!(
        "Proxying {} on {}.{}",
        command.action(),
        request.database,
        request.collection
    );

    let session = connector.connect(uri).await?;
    let result = run(
        session.as_ref(),
        &request.database,
        &request.collection,
        command,
    )
    .await;
    session.close().await;
    debug!("Connection closed");

    result
}

async fn run(
    session: &dyn DocumentSession,
    database: &str,
    collection: &str,
    command: Command,
) -> Result<Value, ProxyError> {
    match command {
        Command::Find { filter } => {
            let documents = session.find(database, collection, filter).await?;
            Ok(Value::Array(
                documents.into_iter().map(Value::Object).collect(),
            ))
        }
        Command::FindOne { filter } => {
            let document = session.find_one(database, collection, filter).await?;
            Ok(document.map(Value::Object).unwrap_or(Value::Null))
        }
        Command::InsertOne { document } => {
            let result = session.insert_one(database, collection, document).await?;
            Ok(serde_json::to_value(result)?)
        }
        Command::UpdateOne { filter, update } => {
            let result = session
                .update_one(database, collection, filter, update)
                .await?;
            Ok(serde_json::to_value(result)?)
        }
    }
}

/// In-process [`DocumentGateway`]: runs requests through the proxy logic
/// directly instead of over HTTP.
pub struct LocalGateway<C> {
    connector: C,
}

impl<C: DocumentConnector> LocalGateway<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    async fn call(&self, request: ProxyRequest) -> Result<Value, ClientError> {
        execute(&self.connector, &request, None)
            .await
            .map_err(|e| ClientError::Api {
                status: 400,
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl<C: DocumentConnector> DocumentGateway for LocalGateway<C> {
    async fn find(&self, target: &ConnectionSettings) -> Result<Vec<JsonDocument>, ClientError> {
        let data = self.call(ProxyRequest::find(target)).await?;
        agentdesk_client::client::documents_from(data)
    }

    async fn find_one(
        &self,
        target: &ConnectionSettings,
        filter: JsonDocument,
    ) -> Result<Option<JsonDocument>, ClientError> {
        let data = self.call(ProxyRequest::find_one(target, filter)).await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn insert_one(
        &self,
        target: &ConnectionSettings,
        document: JsonDocument,
    ) -> Result<InsertOneResult, ClientError> {
        let data = self.call(ProxyRequest::insert_one(target, document)).await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn update_one(
        &self,
        target: &ConnectionSettings,
        filter: JsonDocument,
        update: JsonDocument,
    ) -> Result<UpdateResult, ClientError> {
        let data = self
            .call(ProxyRequest::update_one(target, filter, update))
            .await?;
        Ok(serde_json::from_value(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonDocument {
        value.as_object().cloned().unwrap()
    }

    fn request(action: &str) -> ProxyRequest {
        ProxyRequest {
            uri: "memory://test".into(),
            database: "app".into(),
            collection: "agents".into(),
            action: action.into(),
            filter: None,
            document: None,
            update: None,
        }
    }

    #[test]
    fn test_command_validation() {
        assert!(matches!(
            Command::try_from(&request("find")),
            Ok(Command::Find { ref filter }) if filter.is_empty()
        ));
        assert!(matches!(
            Command::try_from(&request("findOne")),
            Ok(Command::FindOne { .. })
        ));
        assert!(matches!(
            Command::try_from(&request("insertOne")),
            Err(ProxyError::MissingDocument)
        ));
        assert!(matches!(
            Command::try_from(&request("aggregate")),
            Err(ProxyError::InvalidAction)
        ));

        let mut update = request("updateOne");
        update.update = Some(object(json!({ "$set": { "name": "x" } })));
        assert!(matches!(
            Command::try_from(&update),
            Err(ProxyError::MissingFilterOrUpdate)
        ));
        update.filter = Some(object(json!({ "agent_id": "a" })));
        assert!(matches!(
            Command::try_from(&update),
            Ok(Command::UpdateOne { .. })
        ));
    }

    #[test]
    fn test_resolve_uri() {
        let mut req = request("find");
        assert_eq!(
            resolve_uri(&req, Some("mongodb://fallback")).unwrap(),
            "memory://test"
        );

        req.uri.clear();
        assert_eq!(
            resolve_uri(&req, Some("mongodb://fallback")).unwrap(),
            "mongodb://fallback"
        );
        assert!(matches!(
            resolve_uri(&req, None),
            Err(ProxyError::UriNotConfigured)
        ));
        assert!(matches!(
            resolve_uri(&req, Some("")),
            Err(ProxyError::UriNotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_find_on_empty_collection() {
        let connector = MemoryConnector::new();
        let data = execute(&connector, &request("find"), None).await.unwrap();

        assert_eq!(data, json!([]));
        assert_eq!(connector.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_insert_then_find_one() {
        let connector = MemoryConnector::new();

        let mut insert = request("insertOne");
        insert.document = Some(object(json!({ "agent_id": "a-1", "name": "Planner" })));
        let inserted = execute(&connector, &insert, None).await.unwrap();
        assert_eq!(inserted["acknowledged"], true);
        assert!(inserted["insertedId"]["$oid"].is_string());

        let mut find_one = request("findOne");
        find_one.filter = Some(object(json!({ "agent_id": "a-1" })));
        let found = execute(&connector, &find_one, None).await.unwrap();
        assert_eq!(found["name"], "Planner");

        find_one.filter = Some(object(json!({ "agent_id": "missing" })));
        let missing = execute(&connector, &find_one, None).await.unwrap();
        assert_eq!(missing, Value::Null);
    }

    #[tokio::test]
    async fn test_update_matching_nothing_is_not_an_error() {
        let connector = MemoryConnector::new();

        let mut update = request("updateOne");
        update.filter = Some(object(json!({ "agent_id": "ghost" })));
        update.update = Some(object(json!({ "$set": { "name": "x" } })));

        let result = execute(&connector, &update, None).await.unwrap();
        assert_eq!(result["matchedCount"], 0);
        assert_eq!(result["modifiedCount"], 0);
    }

    #[tokio::test]
    async fn test_validation_fails_before_connecting() {
        let connector = MemoryConnector::new();

        let err = execute(&connector, &request("insertOne"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::MissingDocument));
        assert_eq!(connector.connections_opened(), 0);
    }

    #[tokio::test]
    async fn test_connection_closed_after_backend_error() {
        let connector = MemoryConnector::new();

        // replacement documents are rejected, like the driver does
        let mut update = request("updateOne");
        update.filter = Some(JsonDocument::new());
        update.update = Some(object(json!({ "name": "no operator" })));

        assert!(execute(&connector, &update, None).await.is_err());
        assert_eq!(connector.connections_opened(), 1);
        assert_eq!(connector.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_local_gateway() {
        let gateway = LocalGateway::new(MemoryConnector::new());
        let target = ConnectionSettings::new("memory://local", "app", "agents");

        gateway
            .insert_one(&target, object(json!({ "agent_id": "a" })))
            .await
            .unwrap();
        let all = gateway.find(&target).await.unwrap();
        assert_eq!(all.len(), 1);

        let err = gateway
            .update_one(&target, JsonDocument::new(), object(json!({ "bad": 1 })))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }
}
