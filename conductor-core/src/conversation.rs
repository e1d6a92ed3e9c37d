// ABOUTME: Persisted conversation metadata consumed by the worker registry.
// ABOUTME: Carries the raw conversation type so records written by other tools stay readable.

use chrono::{DateTime, Utc};
use conductor_agent::{BackendKind, UnknownBackendKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub id: String,
    /// Backend type as stored ("acp", "codex", ...); may name an unsupported backend
    #[serde(rename = "type")]
    pub conversation_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Backend-specific configuration
    #[serde(default)]
    pub extra: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ConversationMetadata {
    pub fn new(id: impl Into<String>, conversation_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            conversation_type: conversation_type.into(),
            name: None,
            extra: Value::Null,
            created_at: None,
        }
    }

    /// Generate a new conversation with a random id, stamped now
    pub fn create(kind: BackendKind) -> Self {
        Self {
            created_at: Some(Utc::now()),
            ..Self::new(uuid::Uuid::new_v4().to_string(), kind.as_str())
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }

    pub fn backend_kind(&self) -> Result<BackendKind, UnknownBackendKind> {
        self.conversation_type.parse()
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
