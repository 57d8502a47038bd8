//! Tool definitions attached to an agent
//!
//! A tool is described by free text plus a raw OpenAPI document. The
//! document is only checked for being JSON when the editor asks for it;
//! saving an agent never validates it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Agent;

/// Placeholder description for a newly added tool
pub const DEFAULT_TOOL_DESCRIPTION: &str = "Describe how and when to use this tool";

/// Fields missing from a stored tool read as empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub openapi_spec: String,
}

impl Tool {
    /// A new, unnamed tool with a fresh id
    pub fn blank() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: String::new(),
            description: DEFAULT_TOOL_DESCRIPTION.to_string(),
            openapi_spec: String::new(),
        }
    }

    pub fn apply(&mut self, patch: ToolPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(openapi_spec) = patch.openapi_spec {
            self.openapi_spec = openapi_spec;
        }
    }

    pub fn has_valid_spec(&self) -> bool {
        validate_openapi_spec(&self.openapi_spec)
    }
}

/// Partial update of a tool; `None` leaves the field alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub openapi_spec: Option<String>,
}

impl ToolPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn openapi_spec(mut self, spec: impl Into<String>) -> Self {
        self.openapi_spec = Some(spec.into());
        self
    }
}

/// Empty text is accepted; anything else must parse as JSON
pub fn validate_openapi_spec(text: &str) -> bool {
    text.is_empty() || serde_json::from_str::<serde_json::Value>(text).is_ok()
}

impl Agent {
    /// Append a blank tool and return it
    pub fn add_tool(&mut self) -> &Tool {
        self.tools.push(Tool::blank());
        &self.tools[self.tools.len() - 1]
    }

    /// Patch the tool at `index`. Returns false when out of range.
    pub fn update_tool(&mut self, index: usize, patch: ToolPatch) -> bool {
        match self.tools.get_mut(index) {
            Some(tool) => {
                tool.apply(patch);
                true
            }
            None => false,
        }
    }

    pub fn remove_tool(&mut self, index: usize) -> Option<Tool> {
        if index < self.tools.len() {
            Some(self.tools.remove(index))
        } else {
            None
        }
    }

    /// Indexes of tools whose OpenAPI text is not valid JSON
    pub fn invalid_tool_specs(&self) -> Vec<usize> {
        self.tools
            .iter()
            .enumerate()
            .filter(|(_, tool)| !tool.has_valid_spec())
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_tool() {
        let tool = Tool::blank();
        assert!(tool.name.is_empty());
        assert_eq!(tool.description, DEFAULT_TOOL_DESCRIPTION);
        assert!(tool.openapi_spec.is_empty());
        assert!(Uuid::parse_str(&tool.id).is_ok());
    }

    #[test]
    fn test_validate_openapi_spec() {
        assert!(validate_openapi_spec(""));
        assert!(validate_openapi_spec(r#"{"openapi": "3.0.0", "paths": {}}"#));
        assert!(!validate_openapi_spec("openapi: 3.0.0"));
        assert!(!validate_openapi_spec("{\"openapi\": "));
    }

    #[test]
    fn test_tool_editing() {
        let mut agent = Agent::new("Menu Bot", "u");
        let first_id = agent.add_tool().id.clone();
        agent.add_tool();
        assert_eq!(agent.tools.len(), 2);

        assert!(agent.update_tool(
            0,
            ToolPatch::default()
                .name("Food Menu API")
                .openapi_spec("not json")
        ));
        assert_eq!(agent.tools[0].name, "Food Menu API");
        assert_eq!(agent.tools[0].id, first_id);
        assert_eq!(agent.tools[0].description, DEFAULT_TOOL_DESCRIPTION);
        assert_eq!(agent.invalid_tool_specs(), vec![0]);

        assert!(!agent.update_tool(5, ToolPatch::default().name("nope")));

        let removed = agent.remove_tool(0).unwrap();
        assert_eq!(removed.id, first_id);
        assert_eq!(agent.tools.len(), 1);
        assert!(agent.remove_tool(3).is_none());
        assert!(agent.invalid_tool_specs().is_empty());
    }
}
