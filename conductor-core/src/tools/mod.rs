// ABOUTME: Tool descriptors and the resolver mapping agent events to them.
// ABOUTME: Builtin tools are authored statically; MCP tools are adapted heuristically at runtime.

pub mod builtin;
pub mod descriptor;
pub mod i18n;
pub mod mcp;
pub mod resolver;

pub use descriptor::{
    Availability, Capabilities, Platform, Renderer, RendererKind, ToolCategory, ToolDescriptor,
};
pub use i18n::LabelCatalog;
pub use mcp::McpToolInfo;
pub use resolver::ToolEventResolver;
