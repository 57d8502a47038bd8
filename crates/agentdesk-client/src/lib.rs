//! agentdesk client - typed access to the agentdesk proxy
//!
//! Modules:
//! - wire: request/response types shared with the proxy server
//! - client: HTTP client for the proxy and settings endpoints
//! - gateway: the document-access seam the agent workspace is written against

pub mod client;
pub mod gateway;
pub mod wire;

pub use client::{ClientError, ProxyClient};
pub use gateway::DocumentGateway;
pub use wire::{
    Action, ConnectionSettings, DataEnvelope, ErrorEnvelope, InsertOneResult, JsonDocument,
    ProxyRequest, UpdateResult,
};
