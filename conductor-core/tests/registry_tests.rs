// ABOUTME: Tests for ConversationWorkerRegistry construction, teardown, and recovery.
// ABOUTME: Uses counting builders and in-memory stores to observe which tiers are consulted.

use anyhow::Result;
use async_trait::async_trait;
use conductor_core::{
    BackendTaskBuilder, ConversationMetadata, ConversationStore, ConversationWorkerRegistry,
    PersistenceFallbackLoader, RegistryError, TaskBuilder,
};
use conductor_agent::{BackendKind, BackendSpec, LifecycleState, WorkerTask};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Builder that counts how many tasks it constructs
#[derive(Default, Clone)]
struct CountingBuilder {
    built: Arc<AtomicUsize>,
}

impl TaskBuilder for CountingBuilder {
    fn build(&self, meta: &ConversationMetadata) -> Result<WorkerTask, RegistryError> {
        self.built.fetch_add(1, Ordering::SeqCst);
        BackendTaskBuilder::new().build(meta)
    }
}

/// In-memory store that counts lookups and can be made to fail or stall
#[derive(Default)]
struct CountingStore {
    records: HashMap<String, ConversationMetadata>,
    lookups: AtomicUsize,
    fail: bool,
    delay: Option<Duration>,
}

impl CountingStore {
    fn with(records: &[ConversationMetadata]) -> Self {
        Self {
            records: records.iter().map(|r| (r.id.clone(), r.clone())).collect(),
            ..Default::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationStore for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    async fn load(&self, id: &str) -> Result<Option<ConversationMetadata>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("store unavailable");
        }
        Ok(self.records.get(id).cloned())
    }
}

fn registry_with(
    builder: CountingBuilder,
    primary: Arc<CountingStore>,
    secondary: Arc<CountingStore>,
) -> ConversationWorkerRegistry {
    ConversationWorkerRegistry::new(builder)
        .with_loader(PersistenceFallbackLoader::new(primary, secondary))
}

#[test]
fn test_get_or_create_returns_identical_instance() {
    let builder = CountingBuilder::default();
    let registry = ConversationWorkerRegistry::new(builder.clone());
    let meta = ConversationMetadata::new("conv-1", "mock");

    let first = registry.get_or_create(&meta).unwrap();
    let second = registry.get_or_create(&meta).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(builder.built.load(Ordering::SeqCst), 1);
    assert_eq!(first.kind(), BackendKind::Mock);
    assert_eq!(first.state(), LifecycleState::Idle);
}

#[test]
fn test_new_instance_after_kill() {
    let registry = ConversationWorkerRegistry::default();
    let meta = ConversationMetadata::new("conv-1", "mock");

    let first = registry.get_or_create(&meta).unwrap();
    registry.kill("conv-1");
    let second = registry.get_or_create(&meta).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.state(), LifecycleState::Killed);
    assert_eq!(second.state(), LifecycleState::Idle);
}

#[test]
fn test_unsupported_type_yields_no_task() {
    let registry = ConversationWorkerRegistry::default();
    let meta = ConversationMetadata::new("conv-1", "gemini");

    let err = registry.get_or_create(&meta).unwrap_err();
    match err {
        RegistryError::UnsupportedConversationType {
            id,
            conversation_type,
        } => {
            assert_eq!(id, "conv-1");
            assert_eq!(conversation_type, "gemini");
        }
        other => panic!("expected UnsupportedConversationType, got {:?}", other),
    }
    assert!(registry.is_empty());
}

#[test]
fn test_get_by_id_is_pure_lookup() {
    let registry = ConversationWorkerRegistry::default();
    assert!(registry.get_by_id("conv-1").is_none());
    assert!(registry.is_empty());

    let task = registry
        .get_or_create(&ConversationMetadata::new("conv-1", "codex"))
        .unwrap();
    let found = registry.get_by_id("conv-1").unwrap();
    assert!(Arc::ptr_eq(&task, &found));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_kill_is_idempotent() {
    let registry = ConversationWorkerRegistry::default();
    let task = registry
        .get_or_create(&ConversationMetadata::new("conv-1", "mock"))
        .unwrap();

    assert!(registry.kill("conv-1"));
    assert!(!registry.kill("conv-1"));

    assert!(registry.get_by_id("conv-1").is_none());
    assert_eq!(task.state(), LifecycleState::Killed);
}

#[test]
fn test_kill_unknown_id_is_noop() {
    let registry = ConversationWorkerRegistry::default();
    registry
        .get_or_create(&ConversationMetadata::new("conv-1", "mock"))
        .unwrap();

    assert!(!registry.kill("nope"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_clear_kills_every_task() {
    let registry = ConversationWorkerRegistry::default();
    let a = registry
        .get_or_create(&ConversationMetadata::new("a", "mock"))
        .unwrap();
    let b = registry
        .get_or_create(&ConversationMetadata::new("b", "codex"))
        .unwrap();

    assert_eq!(registry.clear(), 2);
    assert!(registry.is_empty());
    assert_eq!(a.state(), LifecycleState::Killed);
    assert_eq!(b.state(), LifecycleState::Killed);
    assert_eq!(registry.clear(), 0);
}

#[test]
fn test_add_task_kills_displaced_task() {
    let registry = ConversationWorkerRegistry::default();
    let original = registry
        .get_or_create(&ConversationMetadata::new("conv-1", "mock"))
        .unwrap();

    let replacement = registry.add_task(WorkerTask::new(
        "conv-1",
        BackendSpec::Mock(Default::default()),
    ));

    assert_eq!(original.state(), LifecycleState::Killed);
    let found = registry.get_by_id("conv-1").unwrap();
    assert!(Arc::ptr_eq(&found, &replacement));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_list_tasks_sorted_by_id() {
    let registry = ConversationWorkerRegistry::default();
    for (id, kind) in [("b", "codex"), ("c", "acp"), ("a", "mock")] {
        registry
            .get_or_create(&ConversationMetadata::new(id, kind))
            .unwrap();
    }

    let listed: Vec<(String, BackendKind)> = registry
        .list_tasks()
        .into_iter()
        .map(|s| (s.id, s.kind))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("a".to_string(), BackendKind::Mock),
            ("b".to_string(), BackendKind::Codex),
            ("c".to_string(), BackendKind::Acp),
        ]
    );
}

#[tokio::test]
async fn test_recover_prefers_in_memory_task() {
    let primary = Arc::new(CountingStore::default());
    let secondary = Arc::new(CountingStore::default());
    let registry = registry_with(CountingBuilder::default(), primary.clone(), secondary.clone());

    let task = registry
        .get_or_create(&ConversationMetadata::new("conv-1", "mock"))
        .unwrap();
    let recovered = registry.recover_by_id("conv-1").await.unwrap();

    assert!(Arc::ptr_eq(&task, &recovered));
    assert_eq!(primary.lookups(), 0);
    assert_eq!(secondary.lookups(), 0);
}

#[tokio::test]
async fn test_recover_primary_hit_skips_secondary() {
    let primary = Arc::new(CountingStore::with(&[ConversationMetadata::new("y", "codex")]));
    let secondary = Arc::new(CountingStore::with(&[ConversationMetadata::new("y", "mock")]));
    let registry = registry_with(CountingBuilder::default(), primary.clone(), secondary.clone());

    let task = registry.recover_by_id("y").await.unwrap();

    assert_eq!(task.kind(), BackendKind::Codex);
    assert_eq!(primary.lookups(), 1);
    assert_eq!(secondary.lookups(), 0);
    assert!(registry.get_by_id("y").is_some());
}

#[tokio::test]
async fn test_recover_primary_miss_uses_secondary() {
    let primary = Arc::new(CountingStore::default());
    let secondary = Arc::new(CountingStore::with(&[ConversationMetadata::new("y", "mock")]));
    let registry = registry_with(CountingBuilder::default(), primary.clone(), secondary.clone());

    let task = registry.recover_by_id("y").await.unwrap();

    assert_eq!(task.kind(), BackendKind::Mock);
    assert_eq!(primary.lookups(), 1);
    assert_eq!(secondary.lookups(), 1);
}

#[tokio::test]
async fn test_recover_primary_failure_falls_through() {
    let primary = Arc::new(CountingStore::failing());
    let secondary = Arc::new(CountingStore::with(&[ConversationMetadata::new("y", "acp")]));
    let registry = registry_with(CountingBuilder::default(), primary, secondary.clone());

    let task = registry.recover_by_id("y").await.unwrap();
    assert_eq!(task.kind(), BackendKind::Acp);
    assert_eq!(secondary.lookups(), 1);
}

#[tokio::test]
async fn test_recover_misses_everywhere_is_not_found() {
    let registry = registry_with(
        CountingBuilder::default(),
        Arc::new(CountingStore::default()),
        Arc::new(CountingStore::default()),
    );

    let err = registry.recover_by_id("ghost").await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { ref id } if id == "ghost"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_recover_without_loader_is_not_found() {
    let registry = ConversationWorkerRegistry::default();
    let err = registry.recover_by_id("ghost").await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { .. }));
}

#[tokio::test]
async fn test_recover_unsupported_stored_type_is_rejected() {
    let primary = Arc::new(CountingStore::with(&[ConversationMetadata::new("y", "gemini")]));
    let registry = registry_with(
        CountingBuilder::default(),
        primary,
        Arc::new(CountingStore::default()),
    );

    let err = registry.recover_by_id("y").await.unwrap_err();
    assert!(matches!(err, RegistryError::UnsupportedConversationType { .. }));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_concurrent_recoveries_construct_one_task() {
    let builder = CountingBuilder::default();
    let primary = Arc::new(CountingStore {
        delay: Some(Duration::from_millis(20)),
        ..CountingStore::with(&[ConversationMetadata::new("y", "mock")])
    });
    let registry = registry_with(
        builder.clone(),
        primary.clone(),
        Arc::new(CountingStore::default()),
    );

    let (a, b) = tokio::join!(registry.recover_by_id("y"), registry.recover_by_id("y"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(builder.built.load(Ordering::SeqCst), 1);
    assert_eq!(primary.lookups(), 2);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_concurrent_recoveries_across_threads() {
    let builder = CountingBuilder::default();
    let primary = Arc::new(CountingStore {
        delay: Some(Duration::from_millis(10)),
        ..CountingStore::with(&[ConversationMetadata::new("y", "codex")])
    });
    let registry = Arc::new(registry_with(
        builder.clone(),
        primary,
        Arc::new(CountingStore::default()),
    ));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry.recover_by_id("y").await.unwrap()
        }));
    }

    let mut tasks = Vec::new();
    for handle in handles {
        tasks.push(handle.await.unwrap());
    }

    assert!(tasks.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(builder.built.load(Ordering::SeqCst), 1);
}
