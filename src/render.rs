// ABOUTME: Renders agent events as single terminal lines for the run command.
// ABOUTME: Tool events are labelled with their resolved, localized tool name.

use conductor_core::{AgentEvent, ToolEventResolver};

const MAX_SUMMARY_CHARS: usize = 200;

/// One display line for `event`, or None for events not worth printing
pub fn render_event(resolver: &ToolEventResolver, event: &AgentEvent) -> Option<String> {
    let line = match event {
        AgentEvent::SessionConfigured { session_id } => format!("[session] {}", session_id),
        AgentEvent::AgentMessageDelta { delta } => {
            if delta.is_empty() {
                return None;
            }
            format!("[agent] {}", delta)
        }
        AgentEvent::AgentReasoning { text } => format!("[thinking] {}", truncate(text)),
        AgentEvent::TaskComplete { usage, .. } => match usage {
            Some(usage) => format!(
                "[done] {} in / {} out tokens",
                usage.input_tokens, usage.output_tokens
            ),
            None => "[done]".to_string(),
        },
        AgentEvent::Error {
            message,
            recoverable,
            ..
        } => {
            if *recoverable {
                format!("[error] {} (recoverable)", message)
            } else {
                format!("[error] {}", message)
            }
        }
        _ => {
            let summary = tool_summary(event)?;
            let descriptor = resolver.resolve_agent_event(event);
            format!("[{}] {}", resolver.localized_name(&descriptor), summary)
        }
    };
    Some(line)
}

fn tool_summary(event: &AgentEvent) -> Option<String> {
    let summary = match event {
        AgentEvent::ExecCommandBegin { command, .. } => format!("$ {}", command),
        AgentEvent::ExecCommandOutputDelta { chunk, .. } => {
            let chunk = chunk.trim_end();
            if chunk.is_empty() {
                return None;
            }
            truncate(chunk)
        }
        AgentEvent::ExecCommandEnd { exit_code, .. } => match exit_code {
            Some(code) => format!("exited with {}", code),
            None => "finished".to_string(),
        },
        AgentEvent::PatchApplyBegin { changes, .. } => match changes.as_object() {
            Some(files) if !files.is_empty() => {
                let names: Vec<&str> = files.keys().map(String::as_str).collect();
                format!("editing {}", names.join(", "))
            }
            _ => "applying changes".to_string(),
        },
        AgentEvent::PatchApplyEnd { success, .. } => {
            if *success {
                "changes applied".to_string()
            } else {
                "changes failed".to_string()
            }
        }
        AgentEvent::WebSearchBegin { query, .. } => match query {
            Some(q) => format!("searching \"{}\"", q),
            None => "searching".to_string(),
        },
        AgentEvent::WebSearchEnd { .. } => "search finished".to_string(),
        AgentEvent::McpToolCallBegin { invocation, .. } => {
            format!("calling {}", invocation.tool_name().unwrap_or("tool"))
        }
        AgentEvent::McpToolCallEnd {
            invocation,
            success,
            ..
        } => {
            let name = invocation.tool_name().unwrap_or("tool");
            if *success {
                format!("{} finished", name)
            } else {
                format!("{} failed", name)
            }
        }
        AgentEvent::Custom { kind, payload } => match payload.get("title").and_then(|t| t.as_str()) {
            Some(title) => format!("{}: {}", kind, title),
            None => kind.clone(),
        },
        _ => return None,
    };
    Some(summary)
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_SUMMARY_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_SUMMARY_CHARS).collect();
    format!("{}...", head)
}
