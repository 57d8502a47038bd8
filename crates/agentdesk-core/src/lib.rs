//! AgentDesk Core Library
//!
//! The MongoDB proxy server, the settings store and the console-side agent
//! workspace that drives them.

pub mod agents;
pub mod config;
pub mod history;
pub mod models;
pub mod proxy;
pub mod schema;
pub mod server;
pub mod settings;
pub mod tools;

// Re-export key types for convenience
pub use agents::{AgentError, AgentWorkspace, ReloadPolicy, SaveOutcome};
pub use config::Config;
pub use history::{HistoryKind, PromptHistory};
pub use models::{Agent, User};
pub use proxy::{DocumentConnector, LocalGateway, MemoryConnector, MongoConnector, ProxyError};
pub use server::{router, AppState};
pub use settings::{MemorySettingsStore, PgSettingsStore, SettingsState, SettingsStore};
pub use tools::{Tool, ToolPatch};
