// ABOUTME: Event types emitted by worker tasks while a backend session runs.
// ABOUTME: Serialized as {"type": ..., "payload": ...} so presentation code can key on the event type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type names as they appear on the wire.
pub mod types {
    pub const SESSION_CONFIGURED: &str = "session_configured";
    pub const AGENT_MESSAGE_DELTA: &str = "agent_message_delta";
    pub const AGENT_REASONING: &str = "agent_reasoning";
    pub const EXEC_COMMAND_BEGIN: &str = "exec_command_begin";
    pub const EXEC_COMMAND_OUTPUT_DELTA: &str = "exec_command_output_delta";
    pub const EXEC_COMMAND_END: &str = "exec_command_end";
    pub const PATCH_APPLY_BEGIN: &str = "patch_apply_begin";
    pub const PATCH_APPLY_END: &str = "patch_apply_end";
    pub const WEB_SEARCH_BEGIN: &str = "web_search_begin";
    pub const WEB_SEARCH_END: &str = "web_search_end";
    pub const MCP_TOOL_CALL_BEGIN: &str = "mcp_tool_call_begin";
    pub const MCP_TOOL_CALL_END: &str = "mcp_tool_call_end";
    pub const TASK_COMPLETE: &str = "task_complete";
    pub const ERROR: &str = "error";

    /// Whether the event type is an MCP tool call begin/end
    pub fn is_mcp_tool_call(event_type: &str) -> bool {
        event_type == MCP_TOOL_CALL_BEGIN || event_type == MCP_TOOL_CALL_END
    }
}

/// Events emitted by a worker task's backend session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Backend session is ready; carries the backend's own session/thread id
    SessionConfigured { session_id: String },

    /// Streaming assistant text
    AgentMessageDelta { delta: String },

    /// Reasoning / status text from the agent
    AgentReasoning { text: String },

    /// A shell command started
    ExecCommandBegin {
        call_id: String,
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },

    /// Incremental command output
    ExecCommandOutputDelta { call_id: String, chunk: String },

    /// A shell command finished
    ExecCommandEnd {
        call_id: String,
        #[serde(default)]
        exit_code: Option<i32>,
        #[serde(default)]
        output: String,
    },

    /// File edits are about to be applied
    PatchApplyBegin {
        call_id: String,
        #[serde(default)]
        changes: Value,
    },

    /// File edits were applied (or failed)
    PatchApplyEnd { call_id: String, success: bool },

    WebSearchBegin {
        call_id: String,
        #[serde(default)]
        query: Option<String>,
    },

    WebSearchEnd {
        call_id: String,
        #[serde(default)]
        query: Option<String>,
    },

    /// An MCP tool call started
    McpToolCallBegin {
        call_id: String,
        invocation: McpInvocation,
    },

    /// An MCP tool call finished
    McpToolCallEnd {
        call_id: String,
        invocation: McpInvocation,
        #[serde(default)]
        result: Value,
        success: bool,
    },

    /// The turn finished
    TaskComplete {
        #[serde(default)]
        last_message: Option<String>,
        #[serde(default)]
        usage: Option<Usage>,
    },

    /// Error occurred during execution
    Error {
        code: ErrorCode,
        message: String,
        recoverable: bool,
    },

    /// Backend-specific event; `kind` doubles as its event type
    Custom {
        kind: String,
        #[serde(default)]
        payload: Value,
    },
}

impl AgentEvent {
    /// The wire event type of this event
    pub fn event_type(&self) -> &str {
        match self {
            Self::SessionConfigured { .. } => types::SESSION_CONFIGURED,
            Self::AgentMessageDelta { .. } => types::AGENT_MESSAGE_DELTA,
            Self::AgentReasoning { .. } => types::AGENT_REASONING,
            Self::ExecCommandBegin { .. } => types::EXEC_COMMAND_BEGIN,
            Self::ExecCommandOutputDelta { .. } => types::EXEC_COMMAND_OUTPUT_DELTA,
            Self::ExecCommandEnd { .. } => types::EXEC_COMMAND_END,
            Self::PatchApplyBegin { .. } => types::PATCH_APPLY_BEGIN,
            Self::PatchApplyEnd { .. } => types::PATCH_APPLY_END,
            Self::WebSearchBegin { .. } => types::WEB_SEARCH_BEGIN,
            Self::WebSearchEnd { .. } => types::WEB_SEARCH_END,
            Self::McpToolCallBegin { .. } => types::MCP_TOOL_CALL_BEGIN,
            Self::McpToolCallEnd { .. } => types::MCP_TOOL_CALL_END,
            Self::TaskComplete { .. } => types::TASK_COMPLETE,
            Self::Error { .. } => types::ERROR,
            Self::Custom { kind, .. } => kind,
        }
    }

    /// The MCP invocation carried by MCP tool-call events
    pub fn mcp_invocation(&self) -> Option<&McpInvocation> {
        match self {
            Self::McpToolCallBegin { invocation, .. } | Self::McpToolCallEnd { invocation, .. } => {
                Some(invocation)
            }
            _ => None,
        }
    }

    /// Whether this event ends the current turn
    pub fn is_turn_end(&self) -> bool {
        matches!(
            self,
            Self::TaskComplete { .. } | Self::Error { recoverable: false, .. }
        )
    }
}

/// Raw call info reported by a backend for an MCP tool call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct McpInvocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Codex reports the tool as `tool`
    #[serde(default, alias = "tool", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl McpInvocation {
    /// The invoked tool: `method`, falling back to `name`
    pub fn tool_name(&self) -> Option<&str> {
        self.method
            .as_deref()
            .filter(|m| !m.is_empty())
            .or_else(|| self.name.as_deref().filter(|n| !n.is_empty()))
    }
}

/// Typed error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request timed out
    Timeout,
    /// Session no longer exists on the backend
    SessionInvalid,
    /// Backend-specific error
    BackendError,
    Unknown,
}

/// Token usage reported at the end of a turn
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: Option<u64>,
}
