//! Per-user connection settings
//!
//! One `mongodb_settings` row per user, upserted on save. The server keeps
//! rows in PostgreSQL via Diesel; the console reaches them through the
//! proxy client. Both sit behind [`SettingsStore`].

use async_trait::async_trait;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, error, info};

use agentdesk_client::{ClientError, ConnectionSettings, ProxyClient};

use crate::models::User;
use crate::schema::mongodb_settings;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to connect to database: {0}")]
    Connection(#[from] diesel::ConnectionError),
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Failed to acquire database lock")]
    Lock,
    #[error("{0}")]
    Remote(#[from] ClientError),
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// The user's settings, or `None` if they never saved any
    async fn load(&self, user_id: &str) -> Result<Option<ConnectionSettings>, SettingsError>;

    /// Insert or replace the user's settings
    async fn save(&self, user_id: &str, settings: &ConnectionSettings)
        -> Result<(), SettingsError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = mongodb_settings)]
struct SettingsRow {
    uri: String,
    database: String,
    collection: String,
}

impl From<SettingsRow> for ConnectionSettings {
    fn from(row: SettingsRow) -> Self {
        ConnectionSettings {
            uri: row.uri,
            database: row.database,
            collection: row.collection,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = mongodb_settings)]
struct NewSettings<'a> {
    user_id: &'a str,
    uri: &'a str,
    database: &'a str,
    collection: &'a str,
}

pub struct PgSettingsStore {
    conn: Mutex<PgConnection>,
}

impl PgSettingsStore {
    pub fn connect(database_url: &str) -> Result<Self, SettingsError> {
        let conn = PgConnection::establish(database_url)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn load(&self, user_id: &str) -> Result<Option<ConnectionSettings>, SettingsError> {
        let mut conn = self.conn.lock().map_err(|_| SettingsError::Lock)?;

        let row: Option<SettingsRow> = mongodb_settings::table
            .filter(mongodb_settings::user_id.eq(user_id))
            .select(SettingsRow::as_select())
            .first(&mut *conn)
            .optional()?;

        Ok(row.map(ConnectionSettings::from))
    }

    async fn save(
        &self,
        user_id: &str,
        settings: &ConnectionSettings,
    ) -> Result<(), SettingsError> {
        let mut conn = self.conn.lock().map_err(|_| SettingsError::Lock)?;

        diesel::insert_into(mongodb_settings::table)
            .values(NewSettings {
                user_id,
                uri: &settings.uri,
                database: &settings.database,
                collection: &settings.collection,
            })
            .on_conflict(mongodb_settings::user_id)
            .do_update()
            .set((
                mongodb_settings::uri.eq(&settings.uri),
                mongodb_settings::database.eq(&settings.database),
                mongodb_settings::collection.eq(&settings.collection),
                mongodb_settings::updated_at.eq(Utc::now()),
            ))
            .execute(&mut *conn)?;

        debug!("Saved settings for user {}", user_id);
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Settings held in process memory; used with `SETTINGS_BACKEND=memory`
#[derive(Default)]
pub struct MemorySettingsStore {
    rows: Mutex<HashMap<String, ConnectionSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self, user_id: &str) -> Result<Option<ConnectionSettings>, SettingsError> {
        let rows = self.rows.lock().map_err(|_| SettingsError::Lock)?;
        Ok(rows.get(user_id).cloned())
    }

    async fn save(
        &self,
        user_id: &str,
        settings: &ConnectionSettings,
    ) -> Result<(), SettingsError> {
        let mut rows = self.rows.lock().map_err(|_| SettingsError::Lock)?;
        rows.insert(user_id.to_string(), settings.clone());
        Ok(())
    }
}

// ============================================================================
// Remote (through the proxy server)
// ============================================================================

#[async_trait]
impl SettingsStore for ProxyClient {
    async fn load(&self, user_id: &str) -> Result<Option<ConnectionSettings>, SettingsError> {
        Ok(self.fetch_settings(user_id).await?)
    }

    async fn save(
        &self,
        user_id: &str,
        settings: &ConnectionSettings,
    ) -> Result<(), SettingsError> {
        self.save_settings(user_id, settings).await?;
        Ok(())
    }
}

// ============================================================================
// Console state
// ============================================================================

/// The signed-in user's settings as the console sees them.
///
/// Settings stay all-empty until loaded, and when the user has never saved
/// any. A failed save leaves the previous settings in place.
pub struct SettingsState<S> {
    store: S,
    user: Option<User>,
    settings: ConnectionSettings,
    is_loading: bool,
    is_saving: bool,
    error: Option<String>,
}

impl<S: SettingsStore> SettingsState<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            user: None,
            settings: ConnectionSettings::default(),
            is_loading: false,
            is_saving: false,
            error: None,
        }
    }

    /// Switch to `user` and load their settings
    pub async fn sign_in(&mut self, user: User) {
        self.user = Some(user);
        self.settings = ConnectionSettings::default();
        self.load().await;
    }

    pub fn sign_out(&mut self) {
        self.user = None;
        self.settings = ConnectionSettings::default();
        self.error = None;
    }

    pub async fn load(&mut self) {
        let Some(user) = self.user.clone() else {
            return;
        };

        self.is_loading = true;
        match self.store.load(&user.id).await {
            Ok(Some(settings)) => {
                info!("Loaded connection settings for {}", user.email);
                self.settings = settings;
            }
            Ok(None) => debug!("No connection settings stored for {}", user.email),
            Err(e) => {
                error!("Error loading connection settings: {}", e);
                self.error = Some(e.to_string());
            }
        }
        self.is_loading = false;
    }

    /// Persist new settings. Returns false without a user or on failure.
    pub async fn save(&mut self, settings: ConnectionSettings) -> bool {
        let Some(user) = self.user.clone() else {
            return false;
        };

        self.is_saving = true;
        self.error = None;

        let saved = match self.store.save(&user.id, &settings).await {
            Ok(()) => {
                self.settings = settings;
                true
            }
            Err(e) => {
                error!("Error saving connection settings: {}", e);
                self.error = Some(e.to_string());
                false
            }
        };

        self.is_saving = false;
        saved
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_saving(&self) -> bool {
        self.is_saving
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
