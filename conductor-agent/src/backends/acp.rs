// ABOUTME: ACP protocol backend - drives claude-code-acp, codex-acp, or any ACP agent binary.
// ABOUTME: Keeps one agent process per task on a dedicated thread and maps session updates to events.

use super::ReadySender;
use crate::handle::{TaskShared, WorkerCommand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Configuration for the ACP backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcpConfig {
    /// Path to the ACP binary (codex-acp or claude-code-acp)
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Timeout in seconds for prompts
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Working directory for the agent
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Extra CLI arguments to pass to the ACP binary
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Extra environment for the agent process
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// ACP session to load instead of creating a new one
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_binary() -> String {
    "claude-code-acp".to_string()
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

#[cfg(not(feature = "acp"))]
pub(crate) fn spawn(
    _config: AcpConfig,
    _shared: Arc<TaskShared>,
    ready: ReadySender,
) -> mpsc::Sender<WorkerCommand> {
    let (tx, _rx) = mpsc::channel(1);
    let _ = ready.send(Err(
        "conductor-agent was built without the `acp` feature".to_string(),
    ));
    tx
}

#[cfg(feature = "acp")]
pub(crate) use worker::spawn;

#[cfg(feature = "acp")]
mod worker {
    use super::*;
    use crate::backends::COMMAND_BUFFER;
    use crate::event::{AgentEvent, ErrorCode, McpInvocation};
    use acp::Agent as _;
    use agent_client_protocol as acp;
    use anyhow::{Context, Result};
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;
    use tokio::process::{Child, Command as ProcessCommand};
    use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

    pub(crate) fn spawn(
        config: AcpConfig,
        shared: Arc<TaskShared>,
        ready: ReadySender,
    ) -> mpsc::Sender<WorkerCommand> {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let thread_name = format!("acp-{}", shared.conversation_id());

        // ACP futures are !Send, so the client lives on its own thread
        if let Err(e) = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_worker(config, shared, rx, ready))
        {
            tracing::error!(error = %e, "Failed to spawn ACP worker thread");
        }
        tx
    }

    /// Why the session loop stopped
    enum WorkerExit {
        /// Killed, dropped, or never came up
        Stopped,
        /// The agent process ended on its own
        BackendEnded(String),
    }

    fn run_worker(
        config: AcpConfig,
        shared: Arc<TaskShared>,
        commands: mpsc::Receiver<WorkerCommand>,
        ready: ReadySender,
    ) {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                let _ = ready.send(Err(format!("Failed to create ACP runtime: {}", e)));
                return;
            }
        };

        let local = tokio::task::LocalSet::new();
        let exit = local.block_on(
            &rt,
            session_loop(config, Arc::clone(&shared), commands, ready),
        );

        match exit {
            WorkerExit::BackendEnded(reason) => shared.mark_exited(&reason),
            WorkerExit::Stopped => {
                tracing::debug!(conversation_id = %shared.conversation_id(), "ACP worker stopped")
            }
        }
    }

    async fn session_loop(
        config: AcpConfig,
        shared: Arc<TaskShared>,
        mut commands: mpsc::Receiver<WorkerCommand>,
        ready: ReadySender,
    ) -> WorkerExit {
        let mut client = match AcpSession::connect(&config, Arc::clone(&shared)).await {
            Ok(client) => client,
            Err(e) => {
                let _ = ready.send(Err(format!("{:#}", e)));
                return WorkerExit::Stopped;
            }
        };

        let session_id = match &config.session_id {
            Some(id) => client.load_session(id).await.map(|()| id.clone()),
            None => client.new_session().await,
        };
        let session_id = match session_id {
            Ok(id) => id,
            Err(e) => {
                let _ = ready.send(Err(format!("{:#}", e)));
                return WorkerExit::Stopped;
            }
        };

        shared.emit(AgentEvent::SessionConfigured {
            session_id: session_id.clone(),
        });
        if ready.send(Ok(())).is_err() {
            return WorkerExit::Stopped;
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        loop {
            tokio::select! {
                _ = shared.cancelled() => return WorkerExit::Stopped,
                status = client.child.wait() => {
                    return WorkerExit::BackendEnded(format!("ACP agent exited: {:?}", status));
                }
                command = commands.recv() => match command {
                    Some(WorkerCommand::Prompt { text }) => {
                        tokio::select! {
                            _ = shared.cancelled() => return WorkerExit::Stopped,
                            () = client.prompt(&session_id, &text, timeout) => {}
                        }
                    }
                    None => return WorkerExit::Stopped,
                },
            }
        }
    }

    /// How a tool call is surfaced as events
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum ToolClass {
        Command,
        Patch,
        Fetch,
        Other,
    }

    impl ToolClass {
        fn from_kind(kind: &acp::ToolKind) -> Self {
            match kind {
                acp::ToolKind::Execute => Self::Command,
                acp::ToolKind::Edit | acp::ToolKind::Delete | acp::ToolKind::Move => Self::Patch,
                acp::ToolKind::Fetch => Self::Fetch,
                _ => Self::Other,
            }
        }
    }

    /// A tool call seen in a ToolCall update, awaiting its completion
    struct PendingCall {
        class: ToolClass,
        title: String,
    }

    /// Handler for ACP client-side callbacks
    struct AcpClientHandler {
        shared: Arc<TaskShared>,
        working_dir: PathBuf,
        pending: Mutex<HashMap<String, PendingCall>>,
    }

    impl AcpClientHandler {
        fn new(shared: Arc<TaskShared>, working_dir: PathBuf) -> Self {
            Self {
                shared,
                working_dir,
                pending: Mutex::new(HashMap::new()),
            }
        }

        fn begin_tool_call(&self, tool_call: acp::ToolCall) {
            let call_id = tool_call.tool_call_id.to_string();
            let class = ToolClass::from_kind(&tool_call.kind);
            let input = tool_call.raw_input.unwrap_or_else(|| json!({}));
            let title = tool_call.title;

            let event = match class {
                ToolClass::Command => AgentEvent::ExecCommandBegin {
                    call_id: call_id.clone(),
                    command: command_line(&input).unwrap_or_else(|| title.clone()),
                    cwd: input.get("cwd").and_then(Value::as_str).map(str::to_string),
                },
                ToolClass::Patch => AgentEvent::PatchApplyBegin {
                    call_id: call_id.clone(),
                    changes: input,
                },
                ToolClass::Fetch => AgentEvent::WebSearchBegin {
                    call_id: call_id.clone(),
                    query: Some(title.clone()),
                },
                ToolClass::Other => {
                    // Agents proxying MCP servers name them "mcp__<server>__<tool>"
                    if let Some(invocation) = mcp_invocation(&title, &input) {
                        AgentEvent::McpToolCallBegin {
                            call_id: call_id.clone(),
                            invocation,
                        }
                    } else {
                        AgentEvent::Custom {
                            kind: "acp_tool_call".to_string(),
                            payload: json!({ "call_id": call_id, "title": title, "input": input }),
                        }
                    }
                }
            };

            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(call_id, PendingCall { class, title });
            self.shared.emit(event);
        }

        fn finish_tool_call(&self, call_id: String, success: bool, output: Option<Value>) {
            let Some(pending) = self
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&call_id)
            else {
                tracing::debug!(call_id = %call_id, "Completion for unknown tool call");
                return;
            };

            let output = output.unwrap_or(Value::Null);
            let event = match pending.class {
                ToolClass::Command => AgentEvent::ExecCommandEnd {
                    call_id,
                    exit_code: output
                        .get("exit_code")
                        .and_then(Value::as_i64)
                        .map(|c| c as i32),
                    output: match &output {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    },
                },
                ToolClass::Patch => AgentEvent::PatchApplyEnd { call_id, success },
                ToolClass::Fetch => AgentEvent::WebSearchEnd {
                    call_id,
                    query: Some(pending.title),
                },
                ToolClass::Other => match mcp_invocation(&pending.title, &Value::Null) {
                    Some(invocation) => AgentEvent::McpToolCallEnd {
                        call_id,
                        invocation,
                        result: output,
                        success,
                    },
                    None => AgentEvent::Custom {
                        kind: "acp_tool_call_end".to_string(),
                        payload: json!({ "call_id": call_id, "success": success, "output": output }),
                    },
                },
            };
            self.shared.emit(event);
        }

        fn content_text(content: acp::ContentBlock) -> String {
            match content {
                acp::ContentBlock::Text(t) => t.text,
                acp::ContentBlock::Image(_) => "<image>".into(),
                acp::ContentBlock::Audio(_) => "<audio>".into(),
                acp::ContentBlock::ResourceLink(r) => r.uri,
                acp::ContentBlock::Resource(_) => "<resource>".into(),
                _ => String::new(),
            }
        }

        /// Resolve `path` inside the working directory, rejecting escapes
        fn sandboxed_path(&self, path: &Path) -> Option<PathBuf> {
            let joined = self.working_dir.join(path);
            let canonical = match joined.canonicalize() {
                Ok(p) => p,
                // New files: check the parent instead
                Err(_) => joined.parent()?.canonicalize().ok()?.join(joined.file_name()?),
            };
            canonical.starts_with(&self.working_dir).then_some(canonical)
        }
    }

    fn command_line(input: &Value) -> Option<String> {
        match input.get("command")? {
            Value::String(s) => Some(s.clone()),
            Value::Array(parts) => Some(
                parts
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        }
    }

    fn mcp_invocation(title: &str, input: &Value) -> Option<McpInvocation> {
        let rest = title.strip_prefix("mcp__")?;
        let (server, tool) = rest.split_once("__")?;
        Some(McpInvocation {
            server: Some(server.to_string()),
            method: Some(tool.to_string()),
            name: None,
            arguments: (!input.is_null()).then(|| input.clone()),
        })
    }

    #[async_trait::async_trait(?Send)]
    impl acp::Client for AcpClientHandler {
        async fn request_permission(
            &self,
            args: acp::RequestPermissionRequest,
        ) -> acp::Result<acp::RequestPermissionResponse> {
            tracing::debug!(
                session_id = %args.session_id,
                tool_call_id = %args.tool_call.tool_call_id,
                "Auto-approving permission request"
            );

            let allow_option = args
                .options
                .iter()
                .find(|opt| matches!(opt.kind, acp::PermissionOptionKind::AllowOnce))
                .or_else(|| args.options.first());

            if let Some(option) = allow_option {
                Ok(acp::RequestPermissionResponse::new(
                    acp::RequestPermissionOutcome::Selected(acp::SelectedPermissionOutcome::new(
                        option.option_id.clone(),
                    )),
                ))
            } else {
                Ok(acp::RequestPermissionResponse::new(
                    acp::RequestPermissionOutcome::Cancelled,
                ))
            }
        }

        async fn session_notification(&self, args: acp::SessionNotification) -> acp::Result<()> {
            match args.update {
                acp::SessionUpdate::AgentMessageChunk(chunk) => {
                    let delta = Self::content_text(chunk.content);
                    if !delta.is_empty() {
                        self.shared.emit(AgentEvent::AgentMessageDelta { delta });
                    }
                }
                acp::SessionUpdate::AgentThoughtChunk(chunk) => {
                    let text = Self::content_text(chunk.content);
                    if !text.is_empty() {
                        self.shared.emit(AgentEvent::AgentReasoning { text });
                    }
                }
                acp::SessionUpdate::ToolCall(tool_call) => self.begin_tool_call(tool_call),
                acp::SessionUpdate::ToolCallUpdate(update) => {
                    let call_id = update.tool_call_id.to_string();
                    let fields = update.fields;
                    match fields.status {
                        Some(acp::ToolCallStatus::Completed) => {
                            self.finish_tool_call(call_id, true, fields.raw_output)
                        }
                        Some(acp::ToolCallStatus::Failed) => {
                            self.finish_tool_call(call_id, false, fields.raw_output)
                        }
                        _ => {}
                    }
                }
                other => {
                    tracing::trace!(?other, "Ignoring unhandled session update type");
                }
            }
            Ok(())
        }

        async fn write_text_file(
            &self,
            args: acp::WriteTextFileRequest,
        ) -> acp::Result<acp::WriteTextFileResponse> {
            let Some(path) = self.sandboxed_path(&args.path) else {
                tracing::warn!(path = %args.path.display(), "Write attempt outside working directory");
                return Err(acp::Error::invalid_params());
            };

            if let Err(e) = std::fs::write(&path, &args.content) {
                tracing::error!(path = %path.display(), error = %e, "Failed to write file");
                return Err(acp::Error::internal_error());
            }

            tracing::debug!(path = %path.display(), len = args.content.len(), "Wrote file");
            Ok(acp::WriteTextFileResponse::new())
        }

        async fn read_text_file(
            &self,
            args: acp::ReadTextFileRequest,
        ) -> acp::Result<acp::ReadTextFileResponse> {
            let Some(path) = self.sandboxed_path(&args.path) else {
                tracing::warn!(path = %args.path.display(), "Read attempt outside working directory");
                return Err(acp::Error::invalid_params());
            };

            match std::fs::read_to_string(&path) {
                Ok(content) => Ok(acp::ReadTextFileResponse::new(content)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read file");
                    Err(acp::Error::invalid_params())
                }
            }
        }

        // Terminal capabilities are not advertised, so agents should not call these
        async fn create_terminal(
            &self,
            _args: acp::CreateTerminalRequest,
        ) -> acp::Result<acp::CreateTerminalResponse> {
            Err(acp::Error::method_not_found())
        }

        async fn terminal_output(
            &self,
            _args: acp::TerminalOutputRequest,
        ) -> acp::Result<acp::TerminalOutputResponse> {
            Err(acp::Error::method_not_found())
        }

        async fn release_terminal(
            &self,
            _args: acp::ReleaseTerminalRequest,
        ) -> acp::Result<acp::ReleaseTerminalResponse> {
            Err(acp::Error::method_not_found())
        }

        async fn wait_for_terminal_exit(
            &self,
            _args: acp::WaitForTerminalExitRequest,
        ) -> acp::Result<acp::WaitForTerminalExitResponse> {
            Err(acp::Error::method_not_found())
        }

        async fn kill_terminal_command(
            &self,
            _args: acp::KillTerminalCommandRequest,
        ) -> acp::Result<acp::KillTerminalCommandResponse> {
            Err(acp::Error::method_not_found())
        }

        async fn ext_method(&self, _args: acp::ExtRequest) -> acp::Result<acp::ExtResponse> {
            Err(acp::Error::method_not_found())
        }

        async fn ext_notification(&self, _args: acp::ExtNotification) -> acp::Result<()> {
            Ok(())
        }
    }

    /// One ACP agent process and its client-side connection
    struct AcpSession {
        child: Child,
        conn: acp::ClientSideConnection,
        shared: Arc<TaskShared>,
        working_dir: PathBuf,
    }

    impl Drop for AcpSession {
        fn drop(&mut self) {
            if let Err(e) = self.child.start_kill() {
                tracing::debug!(error = %e, "ACP agent process already gone");
            }
        }
    }

    impl AcpSession {
        async fn connect(config: &AcpConfig, shared: Arc<TaskShared>) -> Result<Self> {
            if config.binary.contains("..") || config.binary.contains('\0') {
                anyhow::bail!("Invalid agent binary path");
            }
            let working_dir = config.working_dir.canonicalize().with_context(|| {
                format!(
                    "Working directory does not exist: {}",
                    config.working_dir.display()
                )
            })?;

            tracing::info!(
                binary = %config.binary,
                extra_args = ?config.extra_args,
                cwd = %working_dir.display(),
                "Spawning ACP agent"
            );

            let mut child = ProcessCommand::new(&config.binary)
                .args(&config.extra_args)
                .current_dir(&working_dir)
                .envs(&config.env)
                .stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::inherit())
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("Failed to spawn ACP agent '{}'", config.binary))?;

            let stdin = child.stdin.take().context("Failed to get stdin")?;
            let stdout = child.stdout.take().context("Failed to get stdout")?;

            let handler = AcpClientHandler::new(Arc::clone(&shared), working_dir.clone());
            let (conn, handle_io) = acp::ClientSideConnection::new(
                handler,
                stdin.compat_write(),
                stdout.compat(),
                |fut| {
                    tokio::task::spawn_local(fut);
                },
            );
            tokio::task::spawn_local(handle_io);

            conn.initialize(
                acp::InitializeRequest::new(acp::ProtocolVersion::V1)
                    .client_capabilities(acp::ClientCapabilities::default())
                    .client_info(
                        acp::Implementation::new("conductor-agent", env!("CARGO_PKG_VERSION"))
                            .title("conductor worker"),
                    ),
            )
            .await
            .context("ACP initialization failed")?;

            tracing::info!(conversation_id = %shared.conversation_id(), "ACP connection initialized");

            Ok(Self {
                child,
                conn,
                shared,
                working_dir,
            })
        }

        async fn new_session(&self) -> Result<String> {
            let response = self
                .conn
                .new_session(acp::NewSessionRequest::new(self.working_dir.clone()))
                .await
                .context("Failed to create new ACP session")?;

            let session_id = response.session_id.to_string();
            tracing::info!(session_id = %session_id, "Created new ACP session");
            Ok(session_id)
        }

        async fn load_session(&self, session_id: &str) -> Result<()> {
            self.conn
                .load_session(acp::LoadSessionRequest::new(
                    acp::SessionId::new(session_id.to_string()),
                    self.working_dir.clone(),
                ))
                .await
                .context("Failed to load ACP session")?;

            tracing::info!(session_id = %session_id, "Loaded ACP session");
            Ok(())
        }

        /// Run one prompt turn; the outcome is reported as events
        async fn prompt(&self, session_id: &str, text: &str, timeout: Duration) {
            tracing::debug!(session_id = %session_id, prompt_len = text.len(), "Sending prompt");

            let request = acp::PromptRequest::new(
                acp::SessionId::new(session_id.to_string()),
                vec![acp::ContentBlock::Text(acp::TextContent::new(
                    text.to_string(),
                ))],
            );

            match tokio::time::timeout(timeout, self.conn.prompt(request)).await {
                Ok(Ok(response)) => {
                    tracing::debug!(stop_reason = ?response.stop_reason, "Prompt completed");
                    self.shared.emit(AgentEvent::TaskComplete {
                        last_message: None,
                        usage: None,
                    });
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "ACP prompt failed");
                    self.shared.emit(AgentEvent::Error {
                        code: ErrorCode::BackendError,
                        message: format!("ACP prompt error: {}", e),
                        recoverable: false,
                    });
                }
                Err(_) => {
                    tracing::error!(timeout_secs = timeout.as_secs(), "Prompt timed out");
                    self.shared.emit(AgentEvent::Error {
                        code: ErrorCode::Timeout,
                        message: format!(
                            "ACP prompt timed out after {} seconds",
                            timeout.as_secs()
                        ),
                        recoverable: true,
                    });
                }
            }
        }
    }

}
