// ABOUTME: Adapts third-party MCP tools into ToolDescriptors using substring heuristics.
// ABOUTME: Category, capabilities, and renderer are inferred from name, description, and input schema.

use super::descriptor::{
    Availability, Capabilities, Renderer, RendererKind, ToolCategory, ToolDescriptor, MCP_PRIORITY,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// An MCP tool as announced by its server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolInfo {
    #[serde(alias = "server_name")]
    pub server_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "input_schema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl McpToolInfo {
    pub fn new(server_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            name: name.into(),
            description: None,
            input_schema: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Fully-qualified descriptor id: `{serverName}/{name}`
    pub fn qualified_id(&self) -> String {
        format!("{}/{}", self.server_name, self.name)
    }
}

// First match wins, so order matters: "search_files" is Search, not FileOps.
const CATEGORY_KEYWORDS: &[(ToolCategory, &[&str])] = &[
    (ToolCategory::Search, &["search", "find", "query"]),
    (ToolCategory::FileOps, &["file", "read", "write", "edit"]),
    (ToolCategory::Execution, &["exec", "run", "command", "shell"]),
    (ToolCategory::Analysis, &["chart", "plot", "analyze", "graph"]),
    (ToolCategory::Communication, &["http", "api", "request", "fetch"]),
];

pub fn infer_category(name: &str, description: Option<&str>) -> ToolCategory {
    let haystack = format!("{} {}", name, description.unwrap_or_default()).to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| haystack.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(ToolCategory::Custom)
}

fn schema_properties(schema: Option<&Value>) -> Vec<String> {
    schema
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object)
        .map(|props| props.keys().map(|k| k.to_lowercase()).collect())
        .unwrap_or_default()
}

pub fn infer_capabilities(category: ToolCategory, schema: Option<&Value>) -> Capabilities {
    let properties = schema_properties(schema);
    let has = |needle: &str| properties.iter().any(|p| p.contains(needle));

    let streaming = has("stream");
    let images = has("image") || has("img");
    let charts = category == ToolCategory::Analysis;

    let mut output_formats = vec!["text".to_string(), "markdown".to_string()];
    if images {
        output_formats.push("image".to_string());
    }
    if charts {
        output_formats.push("chart".to_string());
    }

    Capabilities {
        streaming,
        images,
        charts,
        markdown: true,
        interaction: true,
        output_formats,
    }
}

pub fn renderer_for(category: ToolCategory) -> Renderer {
    match category {
        ToolCategory::FileOps => Renderer::with_config(RendererKind::Code, json!({"mode": "diff"})),
        ToolCategory::Analysis => Renderer::new(RendererKind::Chart),
        ToolCategory::Search => Renderer::new(RendererKind::Markdown),
        _ => Renderer::new(RendererKind::Standard),
    }
}

fn icon_for(category: ToolCategory) -> &'static str {
    match category {
        ToolCategory::Execution => "terminal",
        ToolCategory::FileOps => "file",
        ToolCategory::Search => "search",
        ToolCategory::Analysis => "bar-chart",
        ToolCategory::Communication => "globe",
        ToolCategory::Custom => "plug",
    }
}

/// Synthesize a descriptor keyed `{serverName}/{name}`
pub fn adapt(info: &McpToolInfo) -> ToolDescriptor {
    let category = infer_category(&info.name, info.description.as_deref());
    ToolDescriptor {
        id: info.qualified_id(),
        name: info.name.clone(),
        category,
        priority: MCP_PRIORITY,
        availability: Availability::everywhere(),
        capabilities: infer_capabilities(category, info.input_schema.as_ref()),
        renderer: renderer_for(category),
        icon: icon_for(category).to_string(),
        description_key: format!("mcp.{}.{}.description", info.server_name, info.name),
        input_schema: info.input_schema.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_keywords_in_order() {
        assert_eq!(infer_category("search_docs", None), ToolCategory::Search);
        assert_eq!(infer_category("read_file", None), ToolCategory::FileOps);
        assert_eq!(infer_category("run_tests", None), ToolCategory::Execution);
        assert_eq!(infer_category("plot_series", None), ToolCategory::Analysis);
        assert_eq!(infer_category("http_get", None), ToolCategory::Communication);
        assert_eq!(infer_category("frobnicate", None), ToolCategory::Custom);
    }

    #[test]
    fn test_category_uses_description() {
        assert_eq!(
            infer_category("lookup", Some("Query the issue tracker")),
            ToolCategory::Search
        );
    }

    #[test]
    fn test_search_and_replace_is_classified_as_search() {
        assert_eq!(infer_category("search-and-replace", None), ToolCategory::Search);
    }

    #[test]
    fn test_capabilities_from_schema() {
        let schema = json!({"properties": {"stream": {"type": "boolean"}, "imageUrl": {"type": "string"}}});
        let caps = infer_capabilities(ToolCategory::Custom, Some(&schema));
        assert!(caps.streaming);
        assert!(caps.images);
        assert!(caps.markdown);
        assert!(caps.interaction);
        assert!(!caps.charts);

        let caps = infer_capabilities(ToolCategory::Analysis, None);
        assert!(!caps.streaming);
        assert!(caps.charts);
    }

    #[test]
    fn test_adapt_builds_qualified_descriptor() {
        let info = McpToolInfo::new("fs", "write_file");
        let descriptor = adapt(&info);
        assert_eq!(descriptor.id, "fs/write_file");
        assert_eq!(descriptor.category, ToolCategory::FileOps);
        assert_eq!(descriptor.renderer.kind, RendererKind::Code);
        assert_eq!(descriptor.priority, MCP_PRIORITY);
    }

    #[test]
    fn test_info_accepts_snake_case_keys() {
        let info: McpToolInfo =
            serde_json::from_value(json!({"server_name": "docs", "name": "search_docs"})).unwrap();
        assert_eq!(info.qualified_id(), "docs/search_docs");
    }
}
