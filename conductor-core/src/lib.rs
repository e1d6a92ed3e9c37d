// ABOUTME: Conversation-level orchestration for agent worker tasks.
// ABOUTME: Provides the worker registry, persistence tiers, tool event resolution, and configuration.

pub mod config;
pub mod conversation;
pub mod error;
pub mod metrics;
pub mod paths;
pub mod persistence;
pub mod registry;
pub mod tools;

pub use conversation::ConversationMetadata;
pub use error::RegistryError;
pub use persistence::{
    ConversationStore, HistoryFileStore, PersistenceFallbackLoader, RecoveryTier,
    SqliteConversationStore,
};
pub use registry::{BackendTaskBuilder, ConversationWorkerRegistry, TaskBuilder, TaskSummary};
pub use tools::{ToolDescriptor, ToolEventResolver};

// Re-export conductor-agent types
pub use conductor_agent::{AgentEvent, BackendKind, LifecycleState, WorkerTask};
