// ABOUTME: ToolEventResolver - maps every agent event to exactly one ToolDescriptor.
// ABOUTME: MCP calls match registered MCP tools; other events walk a priority-sorted candidate list.

use super::builtin::{builtin_tools, default_event_mappings};
use super::descriptor::{Platform, ToolCategory, ToolDescriptor, BUILTIN_PRIORITY_MAX};
use super::i18n::LabelCatalog;
use super::mcp::{self, McpToolInfo};
use crate::metrics;
use conductor_agent::event::types;
use conductor_agent::{AgentEvent, McpInvocation};
use serde_json::Value;
use std::collections::HashMap;

/// Which table a resolved descriptor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Builtin,
    Mcp,
    GenericMcp,
    Unknown,
}

impl Source {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::Mcp => "mcp",
            Self::GenericMcp => "generic_mcp",
            Self::Unknown => "unknown",
        }
    }
}

pub struct ToolEventResolver {
    builtin: HashMap<String, ToolDescriptor>,
    mcp: HashMap<String, ToolDescriptor>,
    /// Event type -> candidate tool ids in registration order
    mappings: HashMap<String, Vec<String>>,
    platform: Platform,
    labels: LabelCatalog,
}

impl ToolEventResolver {
    /// Empty tool tables with the default event mappings
    pub fn new(platform: Platform) -> Self {
        let mut resolver = Self {
            builtin: HashMap::new(),
            mcp: HashMap::new(),
            mappings: HashMap::new(),
            platform,
            labels: LabelCatalog::embedded(),
        };
        for (event_type, candidates) in default_event_mappings() {
            for tool_id in candidates {
                resolver.map_event(event_type, tool_id);
            }
        }
        resolver
    }

    /// Resolver seeded with the builtin tools
    pub fn with_builtin_tools(platform: Platform) -> Self {
        let mut resolver = Self::new(platform);
        for descriptor in builtin_tools() {
            resolver.register_builtin_tool(descriptor);
        }
        resolver
    }

    pub fn with_labels(mut self, labels: LabelCatalog) -> Self {
        self.labels = labels;
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn labels(&self) -> &LabelCatalog {
        &self.labels
    }

    /// Insert a builtin descriptor, replacing one with the same id.
    ///
    /// Priorities above the builtin band are clamped so MCP tools always
    /// rank below builtins. Returns false if the id belongs to an MCP tool.
    pub fn register_builtin_tool(&mut self, mut descriptor: ToolDescriptor) -> bool {
        if self.mcp.contains_key(&descriptor.id) {
            tracing::warn!(tool_id = %descriptor.id, "Builtin tool id collides with an MCP tool, rejected");
            return false;
        }
        if descriptor.priority > BUILTIN_PRIORITY_MAX {
            tracing::warn!(
                tool_id = %descriptor.id,
                priority = descriptor.priority,
                clamped = BUILTIN_PRIORITY_MAX,
                "Builtin tool priority clamped"
            );
            descriptor.priority = BUILTIN_PRIORITY_MAX;
        }

        tracing::debug!(tool_id = %descriptor.id, "Registered builtin tool");
        self.builtin.insert(descriptor.id.clone(), descriptor);
        true
    }

    /// Adapt and insert an MCP tool. Returns false if the id belongs to a builtin.
    pub fn register_mcp_tool(&mut self, info: McpToolInfo) -> bool {
        let descriptor = mcp::adapt(&info);
        if self.builtin.contains_key(&descriptor.id) {
            tracing::warn!(tool_id = %descriptor.id, "MCP tool id collides with a builtin tool, rejected");
            return false;
        }

        tracing::info!(
            tool_id = %descriptor.id,
            category = %descriptor.category,
            "Registered MCP tool"
        );
        self.mcp.insert(descriptor.id.clone(), descriptor);
        true
    }

    /// Drop every descriptor registered for `server_name`; returns how many
    pub fn unregister_mcp_server(&mut self, server_name: &str) -> usize {
        let prefix = format!("{}/", server_name);
        let before = self.mcp.len();
        self.mcp.retain(|id, _| !id.starts_with(&prefix));
        let removed = before - self.mcp.len();
        tracing::info!(server = %server_name, removed, "Unregistered MCP server tools");
        removed
    }

    /// Append `tool_id` to the candidates for `event_type`
    pub fn map_event(&mut self, event_type: &str, tool_id: &str) {
        let candidates = self.mappings.entry(event_type.to_string()).or_default();
        if !candidates.iter().any(|c| c == tool_id) {
            candidates.push(tool_id.to_string());
        }
    }

    /// Resolve a raw `{type, payload}` event. Never fails.
    pub fn resolve_tool_for_event(&self, event_type: &str, event_data: &Value) -> ToolDescriptor {
        if types::is_mcp_tool_call(event_type) {
            let invocation = event_data.get("invocation").map(invocation_from_json);
            return self.finish(self.resolve_mcp(invocation.as_ref()));
        }
        self.finish(self.resolve_from_table(event_type))
    }

    /// Resolve a typed agent event
    pub fn resolve_agent_event(&self, event: &AgentEvent) -> ToolDescriptor {
        if types::is_mcp_tool_call(event.event_type()) {
            return self.finish(self.resolve_mcp(event.mcp_invocation()));
        }
        self.finish(self.resolve_from_table(event.event_type()))
    }

    fn finish(&self, (descriptor, source): (ToolDescriptor, Source)) -> ToolDescriptor {
        metrics::record_tool_resolution(source.as_str());
        descriptor
    }

    fn resolve_mcp(&self, invocation: Option<&McpInvocation>) -> (ToolDescriptor, Source) {
        let Some(invocation) = invocation else {
            return (ToolDescriptor::unknown(), Source::Unknown);
        };
        let Some(method) = invocation.tool_name() else {
            tracing::debug!(?invocation, "MCP event without a method or name");
            return (ToolDescriptor::unknown(), Source::Unknown);
        };

        if let Some(found) = self.mcp.get(method) {
            return (found.clone(), Source::Mcp);
        }
        if let Some(server) = invocation.server.as_deref().filter(|s| !s.is_empty()) {
            if let Some(found) = self.mcp.get(&format!("{}/{}", server, method)) {
                return (found.clone(), Source::Mcp);
            }
        }

        let suffix = format!("/{}", method);
        let found = self
            .mcp
            .values()
            .filter(|d| d.id.ends_with(&suffix) || d.name == method)
            .min_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

        match found {
            Some(descriptor) => (descriptor.clone(), Source::Mcp),
            None => {
                tracing::debug!(method = %method, "No MCP descriptor, using generic fallback");
                (ToolDescriptor::generic_mcp(method), Source::GenericMcp)
            }
        }
    }

    fn resolve_from_table(&self, event_type: &str) -> (ToolDescriptor, Source) {
        let mut candidates: Vec<(&ToolDescriptor, Source)> = self
            .mappings
            .get(event_type)
            .into_iter()
            .flatten()
            .filter_map(|id| {
                self.builtin
                    .get(id)
                    .map(|d| (d, Source::Builtin))
                    .or_else(|| self.mcp.get(id).map(|d| (d, Source::Mcp)))
            })
            .filter(|(d, _)| d.availability.supports(self.platform))
            .collect();

        // Stable: equal priorities keep registration order
        candidates.sort_by_key(|(d, _)| d.priority);

        match candidates.first() {
            Some((descriptor, source)) => ((*descriptor).clone(), *source),
            None => (ToolDescriptor::unknown(), Source::Unknown),
        }
    }

    /// Every registered descriptor, by priority then id
    pub fn get_all_tools(&self) -> Vec<&ToolDescriptor> {
        let mut tools: Vec<&ToolDescriptor> = self.builtin.values().chain(self.mcp.values()).collect();
        tools.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        tools
    }

    pub fn get_tools_by_category(&self, category: ToolCategory) -> Vec<&ToolDescriptor> {
        self.get_all_tools()
            .into_iter()
            .filter(|d| d.category == category)
            .collect()
    }

    pub fn get_tool(&self, id: &str) -> Option<&ToolDescriptor> {
        self.builtin.get(id).or_else(|| self.mcp.get(id))
    }

    /// Localized display name, falling back to the descriptor's own name
    pub fn localized_name(&self, descriptor: &ToolDescriptor) -> String {
        self.labels
            .get(&format!("tools.{}.name", descriptor.id))
            .map(str::to_string)
            .unwrap_or_else(|| descriptor.name.clone())
    }

    /// Localized description, falling back to the descriptor id
    pub fn localized_description(&self, descriptor: &ToolDescriptor) -> String {
        self.labels
            .get(&descriptor.description_key)
            .map(str::to_string)
            .unwrap_or_else(|| descriptor.id.clone())
    }
}

/// Pick the string fields out of a raw invocation object.
///
/// Fields with the wrong type are ignored rather than failing the whole
/// invocation, and `tool` stands in for a missing `name`.
fn invocation_from_json(value: &Value) -> McpInvocation {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    McpInvocation {
        server: field("server"),
        method: field("method"),
        name: field("name").or_else(|| field("tool")),
        arguments: value.get("arguments").cloned(),
    }
}

impl Default for ToolEventResolver {
    fn default() -> Self {
        Self::with_builtin_tools(Platform::current())
    }
}

impl std::fmt::Debug for ToolEventResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEventResolver")
            .field("platform", &self.platform)
            .field("builtin", &self.builtin.len())
            .field("mcp", &self.mcp.len())
            .field("locale", &self.labels.locale())
            .finish()
    }
}
