// ABOUTME: Statically authored builtin tool descriptors and the default event-type mapping.
// ABOUTME: Covers shell execution, file operations, web search, and browser automation.

use super::descriptor::{
    Availability, Capabilities, Platform, Renderer, RendererKind, ToolCategory, ToolDescriptor,
};
use conductor_agent::event::types;
use serde_json::json;

pub const SHELL: &str = "shell";
pub const FILE_OPERATIONS: &str = "file_operations";
pub const WEB_SEARCH: &str = "web_search";
pub const BROWSER_AUTOMATION: &str = "browser_automation";

pub fn builtin_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            id: SHELL.to_string(),
            name: "Shell".to_string(),
            category: ToolCategory::Execution,
            priority: 10,
            availability: Availability::everywhere(),
            capabilities: Capabilities {
                streaming: true,
                interaction: true,
                output_formats: vec!["text".into(), "ansi".into()],
                ..Default::default()
            },
            renderer: Renderer::new(RendererKind::Terminal),
            icon: "terminal".to_string(),
            description_key: "tools.shell.description".to_string(),
            input_schema: None,
        },
        ToolDescriptor {
            id: FILE_OPERATIONS.to_string(),
            name: "File Operations".to_string(),
            category: ToolCategory::FileOps,
            priority: 10,
            availability: Availability::everywhere(),
            capabilities: Capabilities {
                markdown: true,
                output_formats: vec!["diff".into(), "text".into()],
                ..Default::default()
            },
            renderer: Renderer::with_config(RendererKind::Code, json!({"mode": "diff"})),
            icon: "file-diff".to_string(),
            description_key: "tools.file_operations.description".to_string(),
            input_schema: None,
        },
        ToolDescriptor {
            id: WEB_SEARCH.to_string(),
            name: "Web Search".to_string(),
            category: ToolCategory::Search,
            priority: 20,
            availability: Availability::everywhere(),
            capabilities: Capabilities {
                markdown: true,
                output_formats: vec!["markdown".into(), "text".into()],
                ..Default::default()
            },
            renderer: Renderer::new(RendererKind::Markdown),
            icon: "search".to_string(),
            description_key: "tools.web_search.description".to_string(),
            input_schema: None,
        },
        ToolDescriptor {
            id: BROWSER_AUTOMATION.to_string(),
            name: "Browser Automation".to_string(),
            category: ToolCategory::Communication,
            priority: 30,
            availability: Availability {
                platforms: vec![Platform::Macos, Platform::Linux],
                experimental: true,
            },
            capabilities: Capabilities {
                streaming: true,
                images: true,
                markdown: true,
                interaction: true,
                output_formats: vec!["image".into(), "markdown".into()],
                ..Default::default()
            },
            renderer: Renderer::new(RendererKind::Standard),
            icon: "globe".to_string(),
            description_key: "tools.browser_automation.description".to_string(),
            input_schema: None,
        },
    ]
}

/// Event type -> candidate tool ids, in registration order
pub fn default_event_mappings() -> Vec<(&'static str, Vec<&'static str>)> {
    vec![
        (types::EXEC_COMMAND_BEGIN, vec![SHELL]),
        (types::EXEC_COMMAND_OUTPUT_DELTA, vec![SHELL]),
        (types::EXEC_COMMAND_END, vec![SHELL]),
        (types::PATCH_APPLY_BEGIN, vec![FILE_OPERATIONS]),
        (types::PATCH_APPLY_END, vec![FILE_OPERATIONS]),
        (types::WEB_SEARCH_BEGIN, vec![WEB_SEARCH, BROWSER_AUTOMATION]),
        (types::WEB_SEARCH_END, vec![WEB_SEARCH, BROWSER_AUTOMATION]),
    ]
}
