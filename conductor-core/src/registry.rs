// ABOUTME: ConversationWorkerRegistry - one WorkerTask per conversation id.
// ABOUTME: Builds, reuses, recovers from persistence, and tears down tasks; builders map types to backends.

use crate::conversation::ConversationMetadata;
use crate::error::RegistryError;
use crate::metrics;
use crate::persistence::PersistenceFallbackLoader;
use conductor_agent::{BackendKind, BackendSpec, WorkerTask};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Builds a WorkerTask for a conversation
pub trait TaskBuilder: Send + Sync {
    fn build(&self, meta: &ConversationMetadata) -> Result<WorkerTask, RegistryError>;
}

/// Default builder: dispatches on the conversation type to a backend variant.
///
/// Per-backend defaults (the `[backends.<kind>]` config sections) are merged
/// under the conversation's own `extra`, so conversation keys win.
#[derive(Debug, Clone, Default)]
pub struct BackendTaskBuilder {
    defaults: HashMap<BackendKind, Value>,
}

impl BackendTaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: HashMap<BackendKind, Value>) -> Self {
        Self { defaults }
    }

    /// Set the default config for one backend kind
    pub fn backend_defaults(mut self, kind: BackendKind, config: Value) -> Self {
        self.defaults.insert(kind, config);
        self
    }

    fn merged_config(&self, kind: BackendKind, extra: &Value) -> Value {
        let Some(Value::Object(defaults)) = self.defaults.get(&kind) else {
            return extra.clone();
        };

        match extra {
            Value::Object(overrides) => {
                let mut merged = defaults.clone();
                for (key, value) in overrides {
                    merged.insert(key.clone(), value.clone());
                }
                Value::Object(merged)
            }
            Value::Null => Value::Object(defaults.clone()),
            other => other.clone(),
        }
    }
}

impl TaskBuilder for BackendTaskBuilder {
    fn build(&self, meta: &ConversationMetadata) -> Result<WorkerTask, RegistryError> {
        let kind = meta
            .backend_kind()
            .map_err(|_| RegistryError::UnsupportedConversationType {
                id: meta.id.clone(),
                conversation_type: meta.conversation_type.clone(),
            })?;

        let config = self.merged_config(kind, &meta.extra);
        let spec = BackendSpec::from_config(kind, &config).map_err(|source| {
            RegistryError::InvalidBackendConfig {
                id: meta.id.clone(),
                source,
            }
        })?;

        Ok(WorkerTask::new(meta.id.clone(), spec))
    }
}

/// Read-only view of a registered task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub id: String,
    pub kind: BackendKind,
}

/// Owns the conversation id -> WorkerTask map.
///
/// Map operations are synchronous and never hold the lock across an await.
/// Construction happens under the lock, so concurrent callers for one id
/// share a single task.
pub struct ConversationWorkerRegistry {
    tasks: Mutex<HashMap<String, Arc<WorkerTask>>>,
    builder: Box<dyn TaskBuilder>,
    loader: Option<PersistenceFallbackLoader>,
}

impl ConversationWorkerRegistry {
    pub fn new(builder: impl TaskBuilder + 'static) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            builder: Box::new(builder),
            loader: None,
        }
    }

    /// Enable recovery from persisted conversation metadata
    pub fn with_loader(mut self, loader: PersistenceFallbackLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, Arc<WorkerTask>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the cached task for `meta.id`, or build and register one
    pub fn get_or_create(
        &self,
        meta: &ConversationMetadata,
    ) -> Result<Arc<WorkerTask>, RegistryError> {
        let (task, active) = {
            let mut tasks = self.tasks();
            if let Some(existing) = tasks.get(&meta.id) {
                return Ok(Arc::clone(existing));
            }

            let task = Arc::new(self.builder.build(meta)?);
            tasks.insert(meta.id.clone(), Arc::clone(&task));
            (task, tasks.len())
        };

        tracing::info!(
            conversation_id = %meta.id,
            kind = %task.kind(),
            "Worker task created"
        );
        metrics::record_task_created(task.kind().as_str());
        metrics::set_active_tasks(active);
        Ok(task)
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<WorkerTask>> {
        self.tasks().get(id).cloned()
    }

    /// Find a task in memory, else rebuild it from the persistence tiers
    pub async fn recover_by_id(&self, id: &str) -> Result<Arc<WorkerTask>, RegistryError> {
        if let Some(task) = self.get_by_id(id) {
            return Ok(task);
        }

        let found = match &self.loader {
            Some(loader) => loader.load(id).await,
            None => None,
        };

        let Some((mut meta, tier)) = found else {
            tracing::info!(conversation_id = %id, "Conversation not found in any store");
            metrics::record_recovery_miss();
            return Err(RegistryError::NotFound { id: id.to_string() });
        };

        if meta.id != id {
            tracing::warn!(
                conversation_id = %id,
                stored_id = %meta.id,
                "Stored record id differs from requested id"
            );
            meta.id = id.to_string();
        }

        tracing::info!(conversation_id = %id, tier = %tier, "Recovered conversation");
        metrics::record_recovery(tier.as_str());

        // get_or_create re-checks the map, so a racing recovery reuses the winner's task
        self.get_or_create(&meta)
    }

    /// Remove the task for `id` and signal it to stop.
    ///
    /// Returns whether a task was registered. A missing id is a no-op.
    pub fn kill(&self, id: &str) -> bool {
        let removed = self.tasks().remove(id);
        let Some(task) = removed else {
            tracing::debug!(conversation_id = %id, "Kill for unknown conversation ignored");
            return false;
        };

        task.kill();
        metrics::record_task_killed();
        metrics::set_active_tasks(self.len());
        true
    }

    /// Kill every tracked task; returns how many were removed
    pub fn clear(&self) -> usize {
        let drained: Vec<Arc<WorkerTask>> = self.tasks().drain().map(|(_, t)| t).collect();
        for task in &drained {
            task.kill();
            metrics::record_task_killed();
        }
        metrics::set_active_tasks(0);

        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Cleared all worker tasks");
        }
        drained.len()
    }

    /// Register an externally constructed task.
    ///
    /// A task already registered under the same id is killed.
    pub fn add_task(&self, task: WorkerTask) -> Arc<WorkerTask> {
        let task = Arc::new(task);
        let (displaced, active) = {
            let mut tasks = self.tasks();
            let displaced = tasks.insert(task.conversation_id().to_string(), Arc::clone(&task));
            (displaced, tasks.len())
        };

        if let Some(old) = displaced {
            tracing::warn!(
                conversation_id = %task.conversation_id(),
                "Replacing registered worker task"
            );
            old.kill();
            metrics::record_task_killed();
        }
        metrics::set_active_tasks(active);
        task
    }

    /// Registered tasks, sorted by conversation id
    pub fn list_tasks(&self) -> Vec<TaskSummary> {
        let mut summaries: Vec<TaskSummary> = self
            .tasks()
            .values()
            .map(|task| TaskSummary {
                id: task.conversation_id().to_string(),
                kind: task.kind(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }
}

impl Default for ConversationWorkerRegistry {
    fn default() -> Self {
        Self::new(BackendTaskBuilder::new())
    }
}
