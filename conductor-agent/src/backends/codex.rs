// ABOUTME: Codex CLI backend - spawns `codex exec --json` per prompt and resumes the thread.
// ABOUTME: Translates Codex JSONL items into exec/patch/web-search/MCP begin-end events.

use super::{ReadySender, COMMAND_BUFFER};
use crate::event::{AgentEvent, ErrorCode, McpInvocation, Usage};
use crate::handle::{TaskShared, WorkerCommand};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as ProcessCommand;
use tokio::sync::mpsc;

/// Configuration for the Codex CLI backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodexConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Sandbox mode: read-only, workspace-write, or danger-full-access
    #[serde(default = "default_sandbox")]
    pub sandbox_mode: String,
    /// Existing Codex thread to resume
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_binary() -> String {
    "codex".to_string()
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_sandbox() -> String {
    "workspace-write".to_string()
}

pub(crate) fn spawn(
    config: CodexConfig,
    shared: Arc<TaskShared>,
    ready: ReadySender,
) -> mpsc::Sender<WorkerCommand> {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    tokio::spawn(run_worker(config, shared, rx, ready));
    tx
}

async fn run_worker(
    config: CodexConfig,
    shared: Arc<TaskShared>,
    mut commands: mpsc::Receiver<WorkerCommand>,
    ready: ReadySender,
) {
    if config.binary.trim().is_empty() {
        let _ = ready.send(Err("codex backend requires 'binary' to be set".to_string()));
        return;
    }
    if !config.working_dir.is_dir() {
        let _ = ready.send(Err(format!(
            "Working directory does not exist: {}",
            config.working_dir.display()
        )));
        return;
    }

    let mut thread_id = config.thread_id.clone();
    if let Some(id) = &thread_id {
        shared.emit(AgentEvent::SessionConfigured {
            session_id: id.clone(),
        });
    }
    if ready.send(Ok(())).is_err() {
        return;
    }

    loop {
        let command = tokio::select! {
            _ = shared.cancelled() => break,
            command = commands.recv() => command,
        };
        let Some(WorkerCommand::Prompt { text }) = command else {
            break;
        };

        // Prompts run sequentially so each turn resumes the previous thread
        match run_turn(&config, &shared, thread_id.as_deref(), &text).await {
            Ok(Some(id)) => thread_id = Some(id),
            Ok(None) => {}
            Err(e) if is_missing_binary(&e) => {
                tracing::error!(error = %e, binary = %config.binary, "Codex CLI not found");
                shared.emit(AgentEvent::Error {
                    code: ErrorCode::BackendError,
                    message: format!("{:#}", e),
                    recoverable: false,
                });
                shared.mark_exited("codex binary not found");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Codex turn failed");
                shared.emit(AgentEvent::Error {
                    code: ErrorCode::BackendError,
                    message: format!("{:#}", e),
                    recoverable: true,
                });
            }
        }
    }
}

fn is_missing_binary(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound)
}

/// Run one `codex exec` turn, returning the thread id Codex reported
async fn run_turn(
    config: &CodexConfig,
    shared: &TaskShared,
    thread_id: Option<&str>,
    text: &str,
) -> Result<Option<String>> {
    let mut cmd = ProcessCommand::new(&config.binary);
    // --json and -s must come before the `resume` subcommand
    cmd.args(["exec", "--json", "-s", config.sandbox_mode.as_str()])
        .args(&config.extra_args);
    match thread_id {
        Some(id) => {
            cmd.args(["resume", id]);
        }
        None => {
            cmd.arg("-C").arg(&config.working_dir);
        }
    }
    cmd.arg(text);

    tracing::debug!(cmd = ?cmd, "Spawning Codex CLI");

    let mut child = cmd
        .current_dir(&config.working_dir)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to spawn Codex CLI")?;

    let stdout = child.stdout.take().context("Failed to capture stdout")?;
    let stderr = child.stderr.take().context("Failed to capture stderr")?;

    let stderr_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut session_missing = false;
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.is_empty() {
                tracing::warn!(stderr = %line, "Codex CLI stderr");
                if line.contains("session") && line.contains("not found") {
                    session_missing = true;
                }
            }
        }
        session_missing
    });

    let mut translator = CodexTranslator::default();
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = tokio::select! {
            _ = shared.cancelled() => {
                // Dropping the child kills it
                return Ok(translator.thread_id);
            }
            line = lines.next_line() => line.context("Failed to read Codex output")?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(&line) {
            Ok(json) => {
                for event in translator.translate(&json) {
                    shared.emit(event);
                }
            }
            Err(e) => tracing::debug!(error = %e, line = %line, "Skipping non-JSON Codex output"),
        }
    }

    let status = child.wait().await.context("Failed to wait for Codex CLI")?;
    let session_missing = stderr_handle.await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "stderr reader task failed");
        false
    });

    if session_missing {
        shared.emit(AgentEvent::Error {
            code: ErrorCode::SessionInvalid,
            message: "Codex session not found".to_string(),
            recoverable: false,
        });
        // Start a fresh thread on the next prompt
        return Ok(None);
    }

    if !status.success() {
        shared.emit(AgentEvent::Error {
            code: ErrorCode::BackendError,
            message: format!("Codex exited with status: {:?}", status.code()),
            recoverable: true,
        });
    }

    Ok(translator.thread_id.or_else(|| thread_id.map(str::to_string)))
}

/// Stateful translation of Codex JSONL lines into agent events
#[derive(Debug, Default)]
pub(crate) struct CodexTranslator {
    pub(crate) thread_id: Option<String>,
    last_message: Option<String>,
    /// Items whose begin event has been emitted
    started: HashSet<String>,
    /// Bytes of aggregated command output already emitted, per item
    output_sent: HashMap<String, usize>,
}

impl CodexTranslator {
    pub(crate) fn translate(&mut self, json: &Value) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        let event_type = json.get("type").and_then(Value::as_str).unwrap_or("");

        match event_type {
            "thread.started" => {
                if let Some(id) = json.get("thread_id").and_then(Value::as_str) {
                    self.thread_id = Some(id.to_string());
                    events.push(AgentEvent::SessionConfigured {
                        session_id: id.to_string(),
                    });
                }
            }
            "item.started" | "item.updated" | "item.completed" => {
                if let Some(item) = json.get("item") {
                    let phase = &event_type["item.".len()..];
                    self.translate_item(item, phase, &mut events);
                }
            }
            "turn.completed" => {
                let usage = json.get("usage").map(|usage| Usage {
                    input_tokens: usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
                    output_tokens: usage
                        .get("output_tokens")
                        .and_then(Value::as_u64)
                        .unwrap_or(0),
                    cache_read_tokens: usage.get("cached_input_tokens").and_then(Value::as_u64),
                });
                events.push(AgentEvent::TaskComplete {
                    last_message: self.last_message.take(),
                    usage,
                });
            }
            "turn.failed" | "error" => {
                let message = json
                    .pointer("/error/message")
                    .or_else(|| json.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown Codex error")
                    .to_string();
                events.push(AgentEvent::Error {
                    code: ErrorCode::BackendError,
                    message,
                    recoverable: event_type == "error",
                });
            }
            _ => {}
        }

        events
    }

    fn translate_item(&mut self, item: &Value, phase: &str, events: &mut Vec<AgentEvent>) {
        let item_type = item.get("type").and_then(Value::as_str).unwrap_or("");
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let completed = phase == "completed";
        let succeeded = item.get("status").and_then(Value::as_str) != Some("failed");

        match item_type {
            "command_execution" => {
                if self.started.insert(id.clone()) {
                    events.push(AgentEvent::ExecCommandBegin {
                        call_id: id.clone(),
                        command: str_field(item, "command"),
                        cwd: None,
                    });
                }
                let aggregated = str_field(item, "aggregated_output");
                let sent = self.output_sent.entry(id.clone()).or_insert(0);
                if aggregated.len() > *sent {
                    let chunk = aggregated.get(*sent..).unwrap_or(&aggregated).to_string();
                    *sent = aggregated.len();
                    events.push(AgentEvent::ExecCommandOutputDelta {
                        call_id: id.clone(),
                        chunk,
                    });
                }
                if completed {
                    self.finish(&id);
                    events.push(AgentEvent::ExecCommandEnd {
                        call_id: id,
                        exit_code: item
                            .get("exit_code")
                            .and_then(Value::as_i64)
                            .map(|c| c as i32),
                        output: aggregated,
                    });
                }
            }
            "file_change" => {
                if self.started.insert(id.clone()) {
                    events.push(AgentEvent::PatchApplyBegin {
                        call_id: id.clone(),
                        changes: item.get("changes").cloned().unwrap_or(Value::Null),
                    });
                }
                if completed {
                    self.finish(&id);
                    events.push(AgentEvent::PatchApplyEnd {
                        call_id: id,
                        success: succeeded,
                    });
                }
            }
            "web_search" => {
                let query = item.get("query").and_then(Value::as_str).map(str::to_string);
                if self.started.insert(id.clone()) {
                    events.push(AgentEvent::WebSearchBegin {
                        call_id: id.clone(),
                        query: query.clone(),
                    });
                }
                if completed {
                    self.finish(&id);
                    events.push(AgentEvent::WebSearchEnd { call_id: id, query });
                }
            }
            "mcp_tool_call" => {
                let invocation = McpInvocation {
                    server: item.get("server").and_then(Value::as_str).map(str::to_string),
                    method: None,
                    name: item.get("tool").and_then(Value::as_str).map(str::to_string),
                    arguments: item.get("arguments").cloned(),
                };
                if self.started.insert(id.clone()) {
                    events.push(AgentEvent::McpToolCallBegin {
                        call_id: id.clone(),
                        invocation: invocation.clone(),
                    });
                }
                if completed {
                    self.finish(&id);
                    events.push(AgentEvent::McpToolCallEnd {
                        call_id: id,
                        invocation,
                        result: item.get("result").cloned().unwrap_or(Value::Null),
                        success: succeeded,
                    });
                }
            }
            "agent_message" if completed => {
                let text = str_field(item, "text");
                if !text.is_empty() {
                    self.last_message = Some(text.clone());
                    events.push(AgentEvent::AgentMessageDelta { delta: text });
                }
            }
            "reasoning" if completed => {
                let text = str_field(item, "text");
                if !text.is_empty() {
                    events.push(AgentEvent::AgentReasoning { text });
                }
            }
            "error" => {
                let message = str_field(item, "message");
                // Large-directory hints come through as error items
                if !message.contains("consider adding") {
                    events.push(AgentEvent::Error {
                        code: ErrorCode::BackendError,
                        message,
                        recoverable: true,
                    });
                }
            }
            _ => {}
        }
    }

    fn finish(&mut self, id: &str) {
        self.started.remove(id);
        self.output_sent.remove(id);
    }
}

fn str_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
