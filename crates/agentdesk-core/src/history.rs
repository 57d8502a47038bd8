//! Prompt history
//!
//! Append-only audit records written when a save changes an agent's system
//! prompt or tool list. Records are compared against the last loaded
//! snapshot, not against the database, so two sessions editing the same
//! agent can each log a change from the same baseline.

use serde::{Deserialize, Serialize};

use crate::models::Agent;
use crate::tools::Tool;

/// Collection history records are written to, next to the agents
pub const PROMPT_HISTORY_COLLECTION: &str = "prompt_history";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Prompt,
    Tools,
    Both,
}

/// Which tracked fields differ between snapshot and draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeSet {
    pub prompt_changed: bool,
    pub tools_changed: bool,
}

impl ChangeSet {
    pub fn between(snapshot: &Agent, draft: &Agent) -> Self {
        Self {
            prompt_changed: snapshot.system_prompt != draft.system_prompt,
            tools_changed: snapshot.tools != draft.tools,
        }
    }

    pub fn kind(&self) -> Option<HistoryKind> {
        match (self.prompt_changed, self.tools_changed) {
            (true, true) => Some(HistoryKind::Both),
            (true, false) => Some(HistoryKind::Prompt),
            (false, true) => Some(HistoryKind::Tools),
            (false, false) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptHistory {
    pub agent_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_tools: Option<Vec<Tool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tools: Option<Vec<Tool>>,
    pub modified_at: String,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
}

impl PromptHistory {
    /// Build the record for saving `draft` over `snapshot`, or `None` when
    /// neither the prompt nor the tools changed.
    pub fn record(
        snapshot: &Agent,
        draft: &Agent,
        user_id: &str,
        modified_at: impl Into<String>,
    ) -> Option<Self> {
        let changes = ChangeSet::between(snapshot, draft);
        let kind = changes.kind()?;

        let (old_prompt, new_prompt) = if changes.prompt_changed {
            (
                Some(snapshot.system_prompt.clone()),
                Some(draft.system_prompt.clone()),
            )
        } else {
            (None, None)
        };

        let (old_tools, new_tools) = if changes.tools_changed {
            (Some(snapshot.tools.clone()), Some(draft.tools.clone()))
        } else {
            (None, None)
        };

        Some(Self {
            agent_id: draft.agent_id.clone(),
            user_id: user_id.to_string(),
            old_prompt,
            new_prompt,
            old_tools,
            new_tools,
            modified_at: modified_at.into(),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::to_document;

    fn snapshot() -> Agent {
        Agent::new("Planner", "owner")
    }

    #[test]
    fn test_unchanged_draft_has_no_record() {
        let snap = snapshot();
        let mut draft = snap.clone();
        draft.name = "Renamed".into();

        assert_eq!(ChangeSet::between(&snap, &draft).kind(), None);
        assert!(PromptHistory::record(&snap, &draft, "u", "t").is_none());
    }

    #[test]
    fn test_prompt_only_change() {
        let snap = snapshot();
        let mut draft = snap.clone();
        draft.system_prompt = "You plan trips".into();

        let record = PromptHistory::record(&snap, &draft, "editor", "t").unwrap();
        assert_eq!(record.kind, HistoryKind::Prompt);
        assert_eq!(record.old_prompt.as_deref(), Some("You are a helpful agent"));
        assert_eq!(record.new_prompt.as_deref(), Some("You plan trips"));
        assert_eq!(record.user_id, "editor");

        let doc = to_document(&record).unwrap();
        assert_eq!(doc["type"], "prompt");
        assert!(!doc.contains_key("old_tools"));
        assert!(!doc.contains_key("new_tools"));
    }

    #[test]
    fn test_tools_only_change() {
        let snap = snapshot();
        let mut draft = snap.clone();
        draft.add_tool();

        let record = PromptHistory::record(&snap, &draft, "u", "t").unwrap();
        assert_eq!(record.kind, HistoryKind::Tools);
        assert_eq!(record.old_tools.as_ref().map(Vec::len), Some(0));
        assert_eq!(record.new_tools.as_ref().map(Vec::len), Some(1));
        assert!(record.old_prompt.is_none());
    }

    #[test]
    fn test_both_changed() {
        let snap = snapshot();
        let mut draft = snap.clone();
        draft.system_prompt = "different".into();
        draft.add_tool();

        let record = PromptHistory::record(&snap, &draft, "u", "t").unwrap();
        assert_eq!(record.kind, HistoryKind::Both);
        assert!(record.new_prompt.is_some());
        assert!(record.new_tools.is_some());
    }

    #[test]
    fn test_tool_order_counts_as_change() {
        let mut snap = snapshot();
        snap.add_tool();
        snap.add_tool();
        let mut draft = snap.clone();
        draft.tools.reverse();

        assert!(ChangeSet::between(&snap, &draft).tools_changed);
    }
}
