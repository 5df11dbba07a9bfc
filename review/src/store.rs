//! Where finished game summaries go.
//!
//! A reanalysis replaces the stored summary as a whole; nothing is merged.
//! Methods return `impl Future + Send` so orchestrator workers holding a
//! store can be spawned onto the runtime.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use analysis::GameSummary;
use tokio::sync::RwLock;

use crate::error::PersistenceError;

pub trait SummaryStore: Send + Sync + 'static {
    fn save_summary(
        &self,
        summary: &GameSummary,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn load_summary(
        &self,
        game_id: &str,
    ) -> impl Future<Output = Result<Option<GameSummary>, PersistenceError>> + Send;
    fn list_summaries(
        &self,
    ) -> impl Future<Output = Result<Vec<GameSummary>, PersistenceError>> + Send;
    fn delete_summary(
        &self,
        game_id: &str,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// One pretty-printed JSON file per game id.
///
/// Ids are percent-encoded into file names, so ids like `lichess:AbC123`
/// or `chess.com/123` are stored as-is without escaping the directory.
#[derive(Debug, Clone)]
pub struct JsonSummaryStore {
    dir: PathBuf,
}

impl JsonSummaryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, game_id: &str) -> Result<PathBuf, PersistenceError> {
        if game_id.is_empty() {
            return Err(PersistenceError::InvalidId(game_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", encode_file_stem(game_id))))
    }
}

/// Percent-encode every byte outside `[A-Za-z0-9_-]`. Injective, and the
/// result never contains a separator or a dot.
fn encode_file_stem(game_id: &str) -> String {
    let mut stem = String::with_capacity(game_id.len());
    for byte in game_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

impl SummaryStore for JsonSummaryStore {
    async fn save_summary(&self, summary: &GameSummary) -> Result<(), PersistenceError> {
        let path = self.file_path(&summary.game_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Readers never see a half-written file
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(summary)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(game_id = %summary.game_id, path = %path.display(), "Summary saved");
        Ok(())
    }

    async fn load_summary(&self, game_id: &str) -> Result<Option<GameSummary>, PersistenceError> {
        let path = self.file_path(game_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_summaries(&self) -> Result<Vec<GameSummary>, PersistenceError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<GameSummary>(&bytes) {
                    Ok(summary) => summaries.push(summary),
                    Err(e) => tracing::warn!("Skipping unreadable summary {:?}: {}", path, e),
                },
                Err(e) => tracing::warn!("Failed to read file {:?}: {}", path, e),
            }
        }
        summaries.sort_by(|a, b| a.game_id.cmp(&b.game_id));
        Ok(summaries)
    }

    async fn delete_summary(&self, game_id: &str) -> Result<(), PersistenceError> {
        let path = self.file_path(game_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps summaries in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySummaryStore {
    summaries: RwLock<HashMap<String, GameSummary>>,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SummaryStore for MemorySummaryStore {
    async fn save_summary(&self, summary: &GameSummary) -> Result<(), PersistenceError> {
        self.summaries
            .write()
            .await
            .insert(summary.game_id.clone(), summary.clone());
        Ok(())
    }

    async fn load_summary(&self, game_id: &str) -> Result<Option<GameSummary>, PersistenceError> {
        Ok(self.summaries.read().await.get(game_id).cloned())
    }

    async fn list_summaries(&self) -> Result<Vec<GameSummary>, PersistenceError> {
        let mut summaries: Vec<GameSummary> = self.summaries.read().await.values().cloned().collect();
        summaries.sort_by(|a, b| a.game_id.cmp(&b.game_id));
        Ok(summaries)
    }

    async fn delete_summary(&self, game_id: &str) -> Result<(), PersistenceError> {
        self.summaries.write().await.remove(game_id);
        Ok(())
    }
}
