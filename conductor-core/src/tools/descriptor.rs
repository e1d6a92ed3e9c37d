// ABOUTME: ToolDescriptor - renderable metadata for a tool invocation, plus its supporting types.
// ABOUTME: Serialized in camelCase for the presentation layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Builtin descriptors are clamped to priorities at or below this value
pub const BUILTIN_PRIORITY_MAX: u32 = 99;
/// Priority of every MCP-derived descriptor
pub const MCP_PRIORITY: u32 = 100;
pub const GENERIC_MCP_PRIORITY: u32 = 999;
pub const UNKNOWN_PRIORITY: u32 = 1000;

pub const UNKNOWN_TOOL_ID: &str = "unknown";
pub const GENERIC_MCP_PREFIX: &str = "generic_mcp_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Execution,
    FileOps,
    Search,
    Analysis,
    Communication,
    Custom,
}

impl ToolCategory {
    pub const ALL: [ToolCategory; 6] = [
        Self::Execution,
        Self::FileOps,
        Self::Search,
        Self::Analysis,
        Self::Communication,
        Self::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execution => "execution",
            Self::FileOps => "file_ops",
            Self::Search => "search",
            Self::Analysis => "analysis",
            Self::Communication => "communication",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized || (normalized == "fileops" && *c == Self::FileOps))
            .ok_or_else(|| anyhow::anyhow!("Unknown tool category: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Macos,
    Linux,
    Windows,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Self::Macos, Self::Linux, Self::Windows];

    /// The platform this binary was compiled for
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::Macos
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub experimental: bool,
}

impl Availability {
    pub fn everywhere() -> Self {
        Self {
            platforms: Platform::ALL.to_vec(),
            experimental: false,
        }
    }

    pub fn experimental(mut self) -> Self {
        self.experimental = true;
        self
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.platforms.contains(&platform)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub streaming: bool,
    pub images: bool,
    pub charts: bool,
    pub markdown: bool,
    pub interaction: bool,
    #[serde(default)]
    pub output_formats: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    Standard,
    Markdown,
    Code,
    Chart,
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Renderer {
    #[serde(rename = "type")]
    pub kind: RendererKind,
    #[serde(default)]
    pub config: Value,
}

impl Renderer {
    pub fn new(kind: RendererKind) -> Self {
        Self {
            kind,
            config: Value::Null,
        }
    }

    pub fn with_config(kind: RendererKind, config: Value) -> Self {
        Self { kind, config }
    }
}

/// Resolved, renderable metadata describing how to display a tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique across builtin and MCP descriptors
    pub id: String,
    pub name: String,
    pub category: ToolCategory,
    /// Lower values take precedence
    pub priority: u32,
    pub availability: Availability,
    pub capabilities: Capabilities,
    pub renderer: Renderer,
    pub icon: String,
    pub description_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl ToolDescriptor {
    /// Terminal fallback when no candidate matches an event
    pub fn unknown() -> Self {
        Self {
            id: UNKNOWN_TOOL_ID.to_string(),
            name: "Unknown".to_string(),
            category: ToolCategory::Custom,
            priority: UNKNOWN_PRIORITY,
            availability: Availability::everywhere(),
            capabilities: Capabilities::default(),
            renderer: Renderer::new(RendererKind::Standard),
            icon: "help-circle".to_string(),
            description_key: "tools.unknown.description".to_string(),
            input_schema: None,
        }
    }

    /// Fallback for an MCP tool with no registered descriptor
    pub fn generic_mcp(method: &str) -> Self {
        Self {
            id: format!("{}{}", GENERIC_MCP_PREFIX, method),
            name: method.to_string(),
            category: ToolCategory::Custom,
            priority: GENERIC_MCP_PRIORITY,
            availability: Availability::everywhere().experimental(),
            capabilities: Capabilities {
                streaming: false,
                images: true,
                charts: true,
                markdown: true,
                interaction: false,
                output_formats: vec![
                    "text".into(),
                    "markdown".into(),
                    "image".into(),
                    "chart".into(),
                ],
            },
            renderer: Renderer::new(RendererKind::Standard),
            icon: "plug".to_string(),
            description_key: "tools.generic_mcp.description".to_string(),
            input_schema: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.id == UNKNOWN_TOOL_ID
    }
}
