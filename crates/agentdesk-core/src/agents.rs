//! Agent workspace
//!
//! Holds the console's view of the agent collection: the loaded list, the
//! selected agent (the snapshot) and its locally edited copy (the draft).
//!
//! Saving is a two-step write with no transaction around it:
//!
//! 1. if the prompt or tools differ from the snapshot, append a
//!    [`PromptHistory`] record;
//! 2. `$set` name, prompt, tools and `updated_at` on the document keyed by
//!    `agent_id`.
//!
//! If step 1 succeeds and step 2 fails, the history holds an entry the
//! document does not reflect. Step 2 is a field replacement, so repeating a
//! save converges. Concurrent saves from two consoles are last-write-wins.

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use agentdesk_client::{
    ClientError, ConnectionSettings, DocumentGateway, InsertOneResult, JsonDocument, UpdateResult,
};

use crate::history::{PromptHistory, PROMPT_HISTORY_COLLECTION};
use crate::models::{timestamp_now, to_document, Agent, User};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent name is required")]
    NameRequired,
    #[error("Please login first")]
    NotLoggedIn,
    #[error("Invalid agent data")]
    InvalidAgent,
    #[error("Failed to load agents")]
    Load(#[source] ClientError),
    #[error("Failed to create agent")]
    Create(#[source] ClientError),
    #[error("{0}")]
    Update(#[source] ClientError),
    #[error("Failed to encode agent: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a reload does to an unsaved draft of the selected agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPolicy {
    /// Replace snapshot and draft with the server copy
    #[default]
    Overwrite,
    /// Refresh the snapshot but keep a draft that has unsaved changes
    KeepDirtyDraft,
}

/// Outcome of a successful save
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// The history record written, if the prompt or tools changed
    pub history: Option<PromptHistory>,
    pub update: UpdateResult,
}

pub struct AgentWorkspace<G> {
    gateway: G,
    settings: ConnectionSettings,
    user: Option<User>,
    reload_policy: ReloadPolicy,
    agents: Vec<Agent>,
    selected: Option<Agent>,
    edited: Option<Agent>,
    is_loading: bool,
    is_saving: bool,
    error: Option<String>,
}

impl<G: DocumentGateway> AgentWorkspace<G> {
    pub fn new(gateway: G, settings: ConnectionSettings, user: Option<User>) -> Self {
        Self {
            gateway,
            settings,
            user,
            reload_policy: ReloadPolicy::default(),
            agents: Vec::new(),
            selected: None,
            edited: None,
            is_loading: false,
            is_saving: false,
            error: None,
        }
    }

    pub fn with_reload_policy(mut self, policy: ReloadPolicy) -> Self {
        self.reload_policy = policy;
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// The snapshot: the selected agent as last loaded or saved
    pub fn selected(&self) -> Option<&Agent> {
        self.selected.as_ref()
    }

    /// The draft being edited
    pub fn edited(&self) -> Option<&Agent> {
        self.edited.as_ref()
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

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// True when the draft differs from the snapshot
    pub fn is_dirty(&self) -> bool {
        self.edited != self.selected
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    pub fn set_user(&mut self, user: Option<User>) {
        self.user = user;
    }

    /// Point the workspace at a different collection and reload if the
    /// settings changed.
    pub async fn set_settings(&mut self, settings: ConnectionSettings) -> Result<(), AgentError> {
        if settings == self.settings {
            return Ok(());
        }
        self.settings = settings;
        self.load().await
    }

    /// Make `agent_id` the selected agent. Any unsaved draft is discarded.
    pub fn select(&mut self, agent_id: &str) -> bool {
        match self.agents.iter().find(|a| a.agent_id == agent_id) {
            Some(agent) => {
                self.selected = Some(agent.clone());
                self.edited = Some(agent.clone());
                true
            }
            None => false,
        }
    }

    pub fn deselect(&mut self) {
        self.selected = None;
        self.edited = None;
    }

    /// Change the draft. Returns false when nothing is selected.
    pub fn edit(&mut self, f: impl FnOnce(&mut Agent)) -> bool {
        match self.edited.as_mut() {
            Some(draft) => {
                f(draft);
                true
            }
            None => false,
        }
    }

    /// Throw away the draft and start again from the snapshot
    pub fn discard_changes(&mut self) {
        self.edited = self.selected.clone();
    }

    fn agents_target(&self) -> ConnectionSettings {
        self.settings.normalized()
    }

    fn history_target(&self) -> ConnectionSettings {
        self.settings
            .normalized()
            .with_collection(PROMPT_HISTORY_COLLECTION)
    }

    fn fail(&mut self, err: AgentError) -> AgentError {
        self.error = Some(err.to_string());
        err
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    /// Fetch the whole agent collection and replace the local list.
    ///
    /// Does nothing until uri, database and collection are all set. If the
    /// selected agent is still present, snapshot and draft are refreshed
    /// from the new list according to the reload policy. Documents that
    /// cannot be read as agents are left out and counted in `error()`.
    pub async fn load(&mut self) -> Result<(), AgentError> {
        if !self.settings.is_complete() {
            debug!("Connection settings incomplete, skipping agent load");
            return Ok(());
        }

        self.is_loading = true;
        let result = self.gateway.find(&self.agents_target()).await;
        self.is_loading = false;

        let documents = match result {
            Ok(documents) => documents,
            Err(e) => {
                error!("Error loading agents: {}", e);
                return Err(self.fail(AgentError::Load(e)));
            }
        };

        let total = documents.len();
        self.agents = documents
            .into_iter()
            .filter_map(|doc| match Agent::from_document(doc) {
                Ok(agent) => Some(agent),
                Err(e) => {
                    warn!("Skipping malformed agent document: {}", e);
                    None
                }
            })
            .collect();
        let skipped = total - self.agents.len();
        info!("Loaded {} agents", self.agents.len());

        self.refresh_selection();
        self.error = (skipped > 0).then(|| {
            format!(
                "Skipped {} of {} agent documents without a readable agent_id",
                skipped, total
            )
        });
        Ok(())
    }

    fn refresh_selection(&mut self) {
        let Some(selected_id) = self.selected.as_ref().map(|a| a.agent_id.clone()) else {
            return;
        };
        let Some(fresh) = self.agents.iter().find(|a| a.agent_id == selected_id).cloned() else {
            return;
        };

        let keep_draft = self.reload_policy == ReloadPolicy::KeepDirtyDraft && self.is_dirty();
        if keep_draft {
            debug!("Keeping unsaved draft of {}", selected_id);
        } else {
            self.edited = Some(fresh.clone());
        }
        self.selected = Some(fresh);
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new agent called `name`, then reload the list.
    ///
    /// A blank name or a missing user is rejected before anything is sent.
    pub async fn create(&mut self, name: &str) -> Result<Agent, AgentError> {
        if name.trim().is_empty() {
            return Err(self.fail(AgentError::NameRequired));
        }
        let Some(user) = self.user.clone() else {
            return Err(self.fail(AgentError::NotLoggedIn));
        };

        let agent = Agent::new(name, user.id);
        let document = agent.to_document()?;

        self.is_saving = true;
        let result = self.gateway.insert_one(&self.agents_target(), document).await;
        self.is_saving = false;

        if let Err(e) = result {
            error!("Failed to create agent: {}", e);
            return Err(self.fail(AgentError::Create(e)));
        }

        info!("Created agent {} ({})", agent.name, agent.agent_id);
        self.error = None;
        self.reload_after_write().await;
        Ok(agent)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Save the draft: history record first (when needed), then the update.
    pub async fn update(&mut self) -> Result<SaveOutcome, AgentError> {
        let draft = self.edited.clone().filter(|d| !d.agent_id.is_empty());
        let Some(draft) = draft else {
            error!("No agent selected or missing agent_id");
            return Err(self.fail(AgentError::InvalidAgent));
        };
        let Some(user) = self.user.clone() else {
            return Err(self.fail(AgentError::NotLoggedIn));
        };

        self.is_saving = true;
        let result = self.write_draft(&draft, &user).await;
        self.is_saving = false;

        match result {
            Ok(outcome) => {
                info!(
                    "Updated agent {} (matched {}, modified {})",
                    draft.agent_id, outcome.update.matched_count, outcome.update.modified_count
                );
                self.selected = Some(draft);
                self.error = None;
                self.reload_after_write().await;
                Ok(outcome)
            }
            Err(e) => {
                error!("Failed to update agent: {}", e);
                Err(self.fail(e))
            }
        }
    }

    async fn write_draft(&self, draft: &Agent, user: &User) -> Result<SaveOutcome, AgentError> {
        let history = self
            .selected
            .as_ref()
            .and_then(|snapshot| PromptHistory::record(snapshot, draft, &user.id, timestamp_now()));

        if let Some(record) = &history {
            debug!("Recording {:?} change for {}", record.kind, draft.agent_id);
            self.insert_history(record).await?;
        }

        let filter = object(json!({ "agent_id": draft.agent_id }));
        let update = object(json!({
            "$set": {
                "name": draft.name,
                "system_prompt": draft.system_prompt,
                "tools": draft.tools,
                "updated_at": timestamp_now(),
            }
        }));

        let update = self
            .gateway
            .update_one(&self.agents_target(), filter, update)
            .await
            .map_err(AgentError::Update)?;

        Ok(SaveOutcome { history, update })
    }

    async fn insert_history(&self, record: &PromptHistory) -> Result<InsertOneResult, AgentError> {
        let document = to_document(record)?;
        self.gateway
            .insert_one(&self.history_target(), document)
            .await
            .map_err(AgentError::Update)
    }

    /// A failed reload after a successful write leaves the write in place;
    /// the load error stays visible in `error()`.
    async fn reload_after_write(&mut self) {
        if let Err(e) = self.load().await {
            warn!("Reload after write failed: {}", e);
        }
    }
}

fn object(value: Value) -> JsonDocument {
    match value {
        Value::Object(map) => map,
        _ => JsonDocument::new(),
    }
}
