// ABOUTME: Per-conversation worker tasks for external coding-agent backends.
// ABOUTME: Provides the WorkerTask lifecycle, the agent event model, and ACP/Codex/mock backends.

pub mod backends;
pub mod error;
pub mod event;
pub mod handle;
pub mod lifecycle;
pub mod task;

pub use backends::{BackendKind, BackendSpec, UnknownBackendKind};
pub use error::WorkerError;
pub use event::{AgentEvent, ErrorCode, McpInvocation, Usage};
pub use handle::EventReceiver;
pub use lifecycle::LifecycleState;
pub use task::WorkerTask;
