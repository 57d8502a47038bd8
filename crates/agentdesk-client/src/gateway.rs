//! Document access seam
//!
//! The agent workspace only needs the four proxy verbs. [`ProxyClient`]
//! implements them over HTTP; the server crate also provides an in-process
//! implementation.
//!
//! [`ProxyClient`]: crate::ProxyClient

use async_trait::async_trait;

use crate::client::ClientError;
use crate::wire::{ConnectionSettings, InsertOneResult, JsonDocument, UpdateResult};

#[async_trait]
pub trait DocumentGateway: Send + Sync {
    /// Every document in the target collection
    async fn find(&self, target: &ConnectionSettings) -> Result<Vec<JsonDocument>, ClientError>;

    async fn find_one(
        &self,
        target: &ConnectionSettings,
        filter: JsonDocument,
    ) -> Result<Option<JsonDocument>, ClientError>;

    async fn insert_one(
        &self,
        target: &ConnectionSettings,
        document: JsonDocument,
    ) -> Result<InsertOneResult, ClientError>;

    async fn update_one(
        &self,
        target: &ConnectionSettings,
        filter: JsonDocument,
        update: JsonDocument,
    ) -> Result<UpdateResult, ClientError>;
}
