//! Long-term memory
//!
//! Best effort by contract: callers log failures and carry on.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(text: impl Into<String>, metadata: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn store(&self, text: &str, metadata: Value) -> Result<()>;

    /// Up to `k` stored texts ranked by relevance to `query`
    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>>;

    /// Drop entries matching `query`; returns how many were removed
    async fn forget(&self, query: &str) -> Result<usize>;
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard similarity of the two texts' keyword sets
fn similarity(query: &HashSet<String>, text: &str) -> f64 {
    let words = tokens(text);
    let shared = query.intersection(&words).count();
    if shared == 0 {
        return 0.0;
    }
    shared as f64 / query.union(&words).count() as f64
}

fn rank(entries: &[MemoryEntry], query: &str, k: usize) -> Vec<String> {
    let query = tokens(query);
    if query.is_empty() || k == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(f64, &MemoryEntry)> = entries
        .iter()
        .map(|e| (similarity(&query, &e.text), e))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    // Best score first; newer entries win ties
    scored.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| b.1.created_at.cmp(&a.1.created_at))
    });
    scored.into_iter().take(k).map(|(_, e)| e.text.clone()).collect()
}

fn matches_forget(entry: &MemoryEntry, query: &str) -> bool {
    entry.text.to_lowercase().contains(&query.trim().to_lowercase())
}

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<Vec<MemoryEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<MemoryEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(&self, text: &str, metadata: Value) -> Result<()> {
        self.entries.lock().push(MemoryEntry::new(text, metadata));
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(rank(&self.entries.lock(), query, k))
    }

    async fn forget(&self, query: &str) -> Result<usize> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| !matches_forget(e, query));
        Ok(before - entries.len())
    }
}

/// Store persisted as a JSON array, rewritten on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Vec<MemoryEntry>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                Error::Memory(format!("corrupt memory file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "opened memory store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, snapshot: Vec<MemoryEntry>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for JsonFileStore {
    async fn store(&self, text: &str, metadata: Value) -> Result<()> {
        let snapshot = {
            let mut entries = self.entries.lock();
            entries.push(MemoryEntry::new(text, metadata));
            entries.clone()
        };
        self.persist(snapshot).await
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(rank(&self.entries.lock(), query, k))
    }

    async fn forget(&self, query: &str) -> Result<usize> {
        let (removed, snapshot) = {
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries.retain(|e| !matches_forget(e, query));
            (before - entries.len(), entries.clone())
        };
        if removed > 0 {
            self.persist(snapshot).await?;
        }
        Ok(removed)
    }
}
