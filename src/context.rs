// ABOUTME: AppContext - owns the stores, the worker registry, and the tool resolver for one process.
// ABOUTME: Command handlers receive the context instead of reaching for globals.

use crate::render;
use anyhow::{Context as _, Result};
use conductor_core::config::Config;
use conductor_core::tools::{LabelCatalog, McpToolInfo, Platform, ToolCategory};
use conductor_core::{
    metrics, AgentEvent, BackendKind, BackendTaskBuilder, ConversationMetadata,
    ConversationStore, ConversationWorkerRegistry, HistoryFileStore, PersistenceFallbackLoader,
    SqliteConversationStore, ToolDescriptor, ToolEventResolver,
};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One row of the `tools` listing
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRow {
    pub id: String,
    pub label: String,
    pub description: String,
    pub category: ToolCategory,
    pub priority: u32,
}

pub struct AppContext {
    config: Config,
    store: Arc<SqliteConversationStore>,
    history: Arc<HistoryFileStore>,
    registry: ConversationWorkerRegistry,
    resolver: RwLock<ToolEventResolver>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteConversationStore::open(config.database_path())?);
        let history = Arc::new(HistoryFileStore::new(config.history_path()));

        let loader = PersistenceFallbackLoader::new(
            Arc::clone(&store) as Arc<dyn ConversationStore>,
            Arc::clone(&history) as Arc<dyn ConversationStore>,
        );
        let builder = BackendTaskBuilder::with_defaults(config.backend_defaults()?);
        let registry = ConversationWorkerRegistry::new(builder).with_loader(loader);

        let labels = load_labels(&config.tools.locale, config.tools.catalog.as_deref())?;
        let mut resolver = ToolEventResolver::with_builtin_tools(Platform::current()).with_labels(labels);
        for info in &config.tools.mcp {
            resolver.register_mcp_tool(info.clone());
        }

        tracing::info!(
            database = %config.database_path().display(),
            history = %config.history_path().display(),
            mcp_tools = config.tools.mcp.len(),
            "Application context ready"
        );

        Ok(Self {
            config,
            store,
            history,
            registry,
            resolver: RwLock::new(resolver),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ConversationWorkerRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> RwLockReadGuard<'_, ToolEventResolver> {
        self.resolver.read().unwrap_or_else(|e| e.into_inner())
    }

    fn resolver_mut(&self) -> RwLockWriteGuard<'_, ToolEventResolver> {
        self.resolver.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist a new conversation to both stores
    pub async fn create_conversation(
        &self,
        conversation_type: &str,
        name: Option<String>,
        extra: Option<Value>,
        id: Option<String>,
    ) -> Result<ConversationMetadata> {
        let kind: BackendKind = conversation_type.parse()?;
        let mut meta = ConversationMetadata::create(kind);
        if let Some(id) = id {
            if self.store.get(&id)?.is_some() {
                anyhow::bail!("Conversation {} already exists", id);
            }
            meta.id = id;
        }
        if let Some(name) = name {
            meta = meta.with_name(name);
        }
        if let Some(extra) = extra {
            meta = meta.with_extra(extra);
        }

        self.store.save(&meta)?;
        // The history file is only a recovery fallback, so a failed write is not fatal
        if let Err(e) = self.history.save(&meta).await {
            tracing::warn!(conversation_id = %meta.id, error = %e, "Failed to append to history file");
        }

        tracing::info!(conversation_id = %meta.id, kind = %kind, "Conversation created");
        Ok(meta)
    }

    pub fn list_conversations(&self) -> Result<Vec<ConversationMetadata>> {
        self.store.list()
    }

    /// Recover the conversation's task, start it, and drive each prompt to the end of its turn.
    ///
    /// Every rendered event line is passed to `emit`. Returns the number of
    /// turns that completed.
    pub async fn run_conversation(
        &self,
        id: &str,
        prompts: &[String],
        mut emit: impl FnMut(String),
    ) -> Result<usize> {
        let task = self
            .registry
            .recover_by_id(id)
            .await
            .with_context(|| format!("Cannot run conversation {}", id))?;

        let mut events = task.subscribe();
        if let Err(e) = task.start().await {
            metrics::record_error("start_failed");
            return Err(e).with_context(|| format!("Failed to start {} backend", task.kind()));
        }

        let mut completed = 0;
        for prompt in prompts {
            if let Err(e) = task.send_input(prompt.as_str()).await {
                metrics::record_error("send_failed");
                return Err(e).context("Failed to send prompt");
            }

            let mut turn_ended = false;
            while let Some(event) = events.recv().await {
                self.emit_event(&event, &mut emit);
                if event.is_turn_end() {
                    turn_ended = true;
                    break;
                }
            }

            if !turn_ended {
                tracing::warn!(conversation_id = %id, state = %task.state(), "Event stream ended mid-turn");
                break;
            }
            completed += 1;
            if task.state().is_terminal() {
                tracing::info!(conversation_id = %id, state = %task.state(), "Backend ended after turn");
                break;
            }
        }

        Ok(completed)
    }

    fn emit_event(&self, event: &AgentEvent, emit: &mut impl FnMut(String)) {
        tracing::trace!(event_type = event.event_type(), "Agent event");
        if let Some(line) = render::render_event(&self.resolver(), event) {
            emit(line);
        }
    }

    /// Resolve a raw `{type, payload}` event to its descriptor
    pub fn resolve(&self, event_type: &str, data: &Value) -> ToolDescriptor {
        self.resolver().resolve_tool_for_event(event_type, data)
    }

    pub fn register_mcp_tool(&self, info: McpToolInfo) -> bool {
        self.resolver_mut().register_mcp_tool(info)
    }

    /// Descriptor table, optionally limited to one category
    pub fn tools(&self, category: Option<ToolCategory>) -> Vec<ToolRow> {
        let resolver = self.resolver();
        let descriptors = match category {
            Some(category) => resolver.get_tools_by_category(category),
            None => resolver.get_all_tools(),
        };
        descriptors
            .into_iter()
            .map(|d| ToolRow {
                id: d.id.clone(),
                label: resolver.localized_name(d),
                description: resolver.localized_description(d),
                category: d.category,
                priority: d.priority,
            })
            .collect()
    }

    /// Kill every worker task; returns how many were running
    pub fn shutdown(&self) -> usize {
        let killed = self.registry.clear();
        tracing::info!(killed, "Shut down worker tasks");
        killed
    }
}

fn load_labels(locale: &str, catalog: Option<&str>) -> Result<LabelCatalog> {
    match catalog {
        Some(path) => LabelCatalog::load(locale, Path::new(path)),
        None => {
            if locale != "en" {
                tracing::debug!(locale = %locale, "No label catalog configured, using embedded English labels");
            }
            Ok(LabelCatalog::embedded())
        }
    }
}
