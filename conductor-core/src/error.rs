// ABOUTME: Error type for registry operations that reject the caller.
// ABOUTME: Lookup misses elsewhere degrade to defaults and never surface here.

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Every persistence tier missed for this conversation
    #[error("conversation not found: {id}")]
    NotFound { id: String },

    #[error("unsupported conversation type '{conversation_type}' for conversation {id}")]
    UnsupportedConversationType {
        id: String,
        conversation_type: String,
    },

    /// The conversation's backend config did not deserialize
    #[error("invalid backend config for conversation {id}: {source}")]
    InvalidBackendConfig {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RegistryError {
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::NotFound { id }
            | Self::UnsupportedConversationType { id, .. }
            | Self::InvalidBackendConfig { id, .. } => id,
        }
    }
}
