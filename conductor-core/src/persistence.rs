// ABOUTME: Persistence tiers for conversation metadata: SQLite primary, flat JSON history secondary.
// ABOUTME: The fallback loader walks the tiers in order and treats store errors as misses.

use crate::conversation::ConversationMetadata;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A source of conversation metadata
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Load one conversation; `Ok(None)` when the store has no such record
    async fn load(&self, id: &str) -> Result<Option<ConversationMetadata>>;
}

/// Which persistence tier produced a recovered record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTier {
    Primary,
    Secondary,
}

impl RecoveryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for RecoveryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── SQLite primary store ───────────────────────────────────────

/// Structured conversation store backed by SQLite
#[derive(Clone)]
pub struct SqliteConversationStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
        let store = Self::init(conn)?;
        tracing::info!(db = %path.display(), "Conversation store initialized");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                name TEXT,
                extra TEXT NOT NULL DEFAULT 'null',
                created_at TEXT
            )",
            [],
        )
        .context("Failed to create conversations table")?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))
    }

    /// Insert or replace a conversation record
    pub fn save(&self, meta: &ConversationMetadata) -> Result<()> {
        let extra = serde_json::to_string(&meta.extra).context("Failed to encode extra")?;
        let created_at = meta.created_at.map(|t| t.to_rfc3339());
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO conversations (id, type, name, extra, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![meta.id, meta.conversation_type, meta.name, extra, created_at],
            )
            .with_context(|| format!("Failed to save conversation {}", meta.id))?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<ConversationMetadata>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT id, type, name, extra, created_at FROM conversations WHERE id = ?1",
        )?;
        let row = stmt.query_row(params![id], read_row).optional()?;
        row.map(decode_row).transpose()
    }

    /// All conversations, oldest first
    pub fn list(&self) -> Result<Vec<ConversationMetadata>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT id, type, name, extra, created_at FROM conversations
             ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_row).collect()
    }

    /// Delete a conversation; returns whether a record existed
    pub fn delete(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn()?
            .execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

type RawRow = (String, String, Option<String>, String, Option<String>);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_row((id, conversation_type, name, extra, created_at): RawRow) -> Result<ConversationMetadata> {
    let extra = serde_json::from_str(&extra)
        .with_context(|| format!("Corrupt extra column for conversation {}", id))?;
    let created_at = created_at
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
        .transpose()
        .with_context(|| format!("Corrupt created_at for conversation {}", id))?;

    Ok(ConversationMetadata {
        id,
        conversation_type,
        name,
        extra,
        created_at,
    })
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, id: &str) -> Result<Option<ConversationMetadata>> {
        let store = self.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || store.get(&id))
            .await
            .context("Conversation lookup task panicked")?
    }
}

// ─── Flat history file secondary store ──────────────────────────

/// Secondary store: a JSON array of conversation records in one file
#[derive(Debug, Clone)]
pub struct HistoryFileStore {
    path: PathBuf,
}

impl HistoryFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record; a missing file is an empty history
    pub async fn read_all(&self) -> Result<Vec<ConversationMetadata>> {
        match self.read_raw().await? {
            Some(content) => self.parse(&content),
            None => Ok(Vec::new()),
        }
    }

    async fn read_raw(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    fn parse(&self, content: &str) -> Result<Vec<ConversationMetadata>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(content)
            .with_context(|| format!("Failed to parse history file {}", self.path.display()))
    }

    /// Where an unparseable history file is moved before it is rewritten
    pub fn corrupt_backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt");
        PathBuf::from(name)
    }

    /// Insert or replace a record, atomically replacing the whole file.
    ///
    /// An unparseable file is moved to [`Self::corrupt_backup_path`] and a
    /// fresh history is started.
    pub async fn save(&self, meta: &ConversationMetadata) -> Result<()> {
        let mut records = match self.read_raw().await? {
            None => Vec::new(),
            Some(content) => match self.parse(&content) {
                Ok(records) => records,
                Err(e) => {
                    let backup = self.corrupt_backup_path();
                    tracing::warn!(
                        path = %self.path.display(),
                        backup = %backup.display(),
                        error = %format!("{:#}", e),
                        "History file is corrupt, starting a new one"
                    );
                    tokio::fs::rename(&self.path, &backup)
                        .await
                        .with_context(|| format!("Failed to move aside {}", self.path.display()))?;
                    Vec::new()
                }
            },
        };
        match records.iter_mut().find(|r| r.id == meta.id) {
            Some(existing) => *existing = meta.clone(),
            None => records.push(meta.clone()),
        }

        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
                parent.to_path_buf()
            }
            None => PathBuf::from("."),
        };
        let content = serde_json::to_vec_pretty(&records)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&dir, &path, &content))
            .await
            .context("History writer task failed")?
    }
}

/// Write to a temp file beside `path`, then rename it into place
fn write_atomically(dir: &Path, path: &Path, content: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(content)
        .and_then(|_| tmp.as_file().sync_all())
        .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl ConversationStore for HistoryFileStore {
    fn name(&self) -> &str {
        "history_file"
    }

    async fn load(&self, id: &str) -> Result<Option<ConversationMetadata>> {
        Ok(self.read_all().await?.into_iter().find(|r| r.id == id))
    }
}

// ─── Fallback loader ────────────────────────────────────────────

/// Two-tier lookup used by conversation recovery
#[derive(Clone)]
pub struct PersistenceFallbackLoader {
    primary: Arc<dyn ConversationStore>,
    secondary: Arc<dyn ConversationStore>,
}

impl PersistenceFallbackLoader {
    pub fn new(primary: Arc<dyn ConversationStore>, secondary: Arc<dyn ConversationStore>) -> Self {
        Self { primary, secondary }
    }

    /// Find `id` in the primary store, then the secondary.
    ///
    /// The secondary store is only consulted when the primary misses or
    /// fails. Store errors are logged and count as a miss.
    pub async fn load(&self, id: &str) -> Option<(ConversationMetadata, RecoveryTier)> {
        let tiers = [
            (RecoveryTier::Primary, &self.primary),
            (RecoveryTier::Secondary, &self.secondary),
        ];

        for (tier, store) in tiers {
            match store.load(id).await {
                Ok(Some(meta)) => {
                    tracing::debug!(conversation_id = %id, tier = %tier, store = store.name(), "Conversation found");
                    return Some((meta, tier));
                }
                Ok(None) => {
                    tracing::debug!(conversation_id = %id, tier = %tier, store = store.name(), "Conversation not in store");
                }
                Err(e) => {
                    tracing::warn!(
                        conversation_id = %id,
                        tier = %tier,
                        store = store.name(),
                        error = %e,
                        "Conversation store failed, falling through"
                    );
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sqlite_roundtrip_keeps_extra_and_timestamp() {
        let store = SqliteConversationStore::open_in_memory().unwrap();
        let meta = ConversationMetadata::new("c1", "acp")
            .with_name("Refactor")
            .with_extra(json!({"working_dir": "/tmp"}));
        let meta = ConversationMetadata {
            created_at: Some(Utc::now()),
            ..meta
        };

        store.save(&meta).unwrap();
        let loaded = store.get("c1").unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("Refactor"));
        assert_eq!(loaded.extra["working_dir"], "/tmp");
        assert_eq!(
            loaded.created_at.map(|t| t.timestamp()),
            meta.created_at.map(|t| t.timestamp())
        );
    }

    #[test]
    fn test_sqlite_delete_reports_existence() {
        let store = SqliteConversationStore::open_in_memory().unwrap();
        store.save(&ConversationMetadata::new("c1", "mock")).unwrap();
        assert!(store.delete("c1").unwrap());
        assert!(!store.delete("c1").unwrap());
        assert!(store.get("c1").unwrap().is_none());
    }
}
