//! In-process document store
//!
//! Backs the proxy when `PROXY_BACKEND=memory` and in tests. Every
//! connection shares one store regardless of URI. Filters match by
//! top-level field equality; updates support `$set` and `$unset`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use agentdesk_client::{InsertOneResult, JsonDocument, UpdateResult};

use super::{DocumentConnector, DocumentSession, ProxyError};

type Collections = HashMap<(String, String), Vec<JsonDocument>>;

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    open: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    collections: Arc<Mutex<Collections>>,
    counters: Arc<Counters>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections opened since creation
    pub fn connections_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Snapshot of one collection
    pub fn documents(&self, database: &str, collection: &str) -> Vec<JsonDocument> {
        self.collections
            .lock()
            .map(|c| {
                c.get(&(database.to_string(), collection.to_string()))
                    .cloned()
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentConnector for MemoryConnector {
    async fn connect(&self, _uri: &str) -> Result<Box<dyn DocumentSession>, ProxyError> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            collections: self.collections.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct MemorySession {
    collections: Arc<Mutex<Collections>>,
    counters: Arc<Counters>,
}

impl MemorySession {
    /// Read access; a collection that was never written reads as empty
    fn read_collection<T>(
        &self,
        database: &str,
        collection: &str,
        f: impl FnOnce(&[JsonDocument]) -> T,
    ) -> Result<T, ProxyError> {
        let collections = self
            .collections
            .lock()
            .map_err(|e| ProxyError::Backend(format!("Lock error: {}", e)))?;
        let documents = collections
            .get(&(database.to_string(), collection.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(f(documents))
    }

    /// Write access; creates the collection on first use
    fn with_collection<T>(
        &self,
        database: &str,
        collection: &str,
        f: impl FnOnce(&mut Vec<JsonDocument>) -> Result<T, ProxyError>,
    ) -> Result<T, ProxyError> {
        let mut collections = self
            .collections
            .lock()
            .map_err(|e| ProxyError::Backend(format!("Lock error: {}", e)))?;
        let documents = collections
            .entry((database.to_string(), collection.to_string()))
            .or_default();
        f(documents)
    }
}

fn matches(document: &JsonDocument, filter: &JsonDocument) -> bool {
    filter
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}

fn new_object_id() -> Value {
    let hex = Uuid::new_v4().simple().to_string();
    json!({ "$oid": &hex[..24] })
}

/// Apply an operator update. Returns whether the document changed.
fn apply_update(document: &mut JsonDocument, update: &JsonDocument) -> Result<bool, ProxyError> {
    if update.is_empty() || update.keys().any(|k| !k.starts_with('$')) {
        return Err(ProxyError::Backend(
            "Update document requires atomic operators".to_string(),
        ));
    }

    let mut changed = false;
    for (operator, fields) in update {
        let fields = fields.as_object().ok_or_else(|| {
            ProxyError::Backend(format!("Modifiers operate on fields: {}", operator))
        })?;

        match operator.as_str() {
            "$set" => {
                for (field, value) in fields {
                    if document.get(field) != Some(value) {
                        document.insert(field.clone(), value.clone());
                        changed = true;
                    }
                }
            }
            "$unset" => {
                for field in fields.keys() {
                    changed |= document.remove(field).is_some();
                }
            }
            other => {
                return Err(ProxyError::Backend(format!(
                    "Unsupported update operator: {}",
                    other
                )))
            }
        }
    }
    Ok(changed)
}

#[async_trait]
impl DocumentSession for MemorySession {
    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: JsonDocument,
    ) -> Result<Vec<JsonDocument>, ProxyError> {
        self.read_collection(database, collection, |docs| {
            docs.iter().filter(|d| matches(d, &filter)).cloned().collect()
        })
    }

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: JsonDocument,
    ) -> Result<Option<JsonDocument>, ProxyError> {
        self.read_collection(database, collection, |docs| {
            docs.iter().find(|d| matches(d, &filter)).cloned()
        })
    }

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        mut document: JsonDocument,
    ) -> Result<InsertOneResult, ProxyError> {
        self.with_collection(database, collection, |docs| {
            let id = document
                .entry("_id")
                .or_insert_with(new_object_id)
                .clone();

            if docs.iter().any(|d| d.get("_id") == Some(&id)) {
                return Err(ProxyError::Backend(format!(
                    "E11000 duplicate key error collection: {}.{} dup key: {{ _id: {} }}",
                    database, collection, id
                )));
            }

            docs.push(document);
            Ok(InsertOneResult {
                acknowledged: true,
                inserted_id: id,
            })
        })
    }

    async fn update_one(
        &self,
        database: &str,
        collection: &str,
        filter: JsonDocument,
        update: JsonDocument,
    ) -> Result<UpdateResult, ProxyError> {
        self.with_collection(database, collection, |docs| {
            let (matched, modified) = match docs.iter_mut().find(|d| matches(d, &filter)) {
                Some(document) => {
                    let mut candidate = document.clone();
                    let changed = apply_update(&mut candidate, &update)?;
                    *document = candidate;
                    (1, u64::from(changed))
                }
                None => {
                    // validate the update even when nothing matches
                    apply_update(&mut JsonDocument::new(), &update)?;
                    (0, 0)
                }
            };

            Ok(UpdateResult {
                acknowledged: true,
                matched_count: matched,
                modified_count: modified,
                upserted_count: 0,
                upserted_id: None,
            })
        })
    }

    async fn close(&self) {
        self.counters.open.fetch_sub(1, Ordering::SeqCst);
    }
}
