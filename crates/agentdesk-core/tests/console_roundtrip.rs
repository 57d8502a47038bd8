//! Console flows against a live server on the in-memory backends

use std::sync::Arc;

use agentdesk_client::{ConnectionSettings, DocumentGateway, ProxyClient, ProxyRequest};
use agentdesk_core::models::User;
use agentdesk_core::proxy::MemoryConnector;
use agentdesk_core::server::{router, AppState};
use agentdesk_core::settings::{MemorySettingsStore, SettingsState};
use agentdesk_core::AgentWorkspace;

const API_KEY: &str = "test-key";

async fn spawn_server() -> String {
    let state = AppState::new(
        Arc::new(MemoryConnector::new()),
        Arc::new(MemorySettingsStore::new()),
    )
    .with_api_key(Some(API_KEY.to_string()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    format!("http://{}", addr)
}

fn settings() -> ConnectionSettings {
    ConnectionSettings::new("memory://console", "Console", "Agents")
}

#[tokio::test]
async fn test_create_edit_and_save_agent() {
    let base = spawn_server().await;
    let client = ProxyClient::new(&base, Some(API_KEY.to_string())).unwrap();
    let user = User::new("user-1", "dev@example.com");

    let mut ws = AgentWorkspace::new(client.clone(), settings(), Some(user));
    ws.load().await.unwrap();
    assert!(ws.agents().is_empty());

    let agent = ws.create("Support bot").await.unwrap();
    assert_eq!(ws.agents().len(), 1);
    assert!(ws.select(&agent.agent_id));

    ws.edit(|draft| draft.system_prompt = "Answer billing questions".to_string());
    assert!(ws.is_dirty());

    let outcome = ws.update().await.unwrap();
    assert_eq!(outcome.update.matched_count, 1);
    assert!(outcome.history.is_some());
    assert!(!ws.is_dirty());
    assert_eq!(ws.agents()[0].system_prompt, "Answer billing questions");

    let history = client
        .find(&ConnectionSettings::new(
            "memory://console",
            "console",
            "prompt_history",
        ))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["type"], "prompt");
    assert_eq!(history[0]["agent_id"], agent.agent_id.as_str());
    assert_eq!(history[0]["user_id"], "user-1");
    assert_eq!(history[0]["new_prompt"], "Answer billing questions");
}

#[tokio::test]
async fn test_settings_round_trip_through_server() {
    let base = spawn_server().await;
    let client = ProxyClient::new(&base, Some(API_KEY.to_string())).unwrap();

    let mut state = SettingsState::new(client.clone());
    state.sign_in(User::new("user-2", "ops@example.com")).await;
    assert_eq!(state.settings(), &ConnectionSettings::default());

    assert!(state.save(settings()).await);

    let mut again = SettingsState::new(client);
    again.sign_in(User::new("user-2", "ops@example.com")).await;
    assert_eq!(again.settings(), &settings());
    assert!(again.error().is_none());
}

#[tokio::test]
async fn test_settings_keyed_by_exact_user_id() {
    let base = spawn_server().await;
    let client = ProxyClient::new(&base, Some(API_KEY.to_string())).unwrap();

    let users = ["alice", "alice#bob", "a?b=c", "team/alice", "50%off"];
    for (i, user_id) in users.iter().enumerate() {
        let settings = ConnectionSettings::new(format!("mongodb://host-{}", i), "db", "agents");
        let saved = client.save_settings(user_id, &settings).await.unwrap();
        assert_eq!(saved, settings);
    }

    for (i, user_id) in users.iter().enumerate() {
        let loaded = client.fetch_settings(user_id).await.unwrap().unwrap();
        assert_eq!(loaded.uri, format!("mongodb://host-{}", i), "user {}", user_id);
    }

    assert!(client.fetch_settings("alice#eve").await.unwrap().is_none());
    assert!(client.fetch_settings("team").await.unwrap().is_none());
}

#[tokio::test]
async fn test_wrong_key_is_unauthorized() {
    let base = spawn_server().await;
    let client = ProxyClient::new(&base, Some("nope".to_string())).unwrap();

    let err = client
        .execute(
            &ProxyRequest::find(&settings()),
            "Failed to fetch data",
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.to_string(), "Unauthorized");
}

#[tokio::test]
async fn test_find_on_empty_collection() {
    let base = spawn_server().await;
    let client = ProxyClient::new(&base, Some(API_KEY.to_string())).unwrap();

    let docs = client.find(&settings()).await.unwrap();
    assert!(docs.is_empty());
}
