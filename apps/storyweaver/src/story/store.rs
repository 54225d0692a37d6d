//! Story persistence: one JSON document per story plus the idea ledger.
//!
//! # Layout
//! ```text
//! <data_dir>/previous_ideas.json
//! <data_dir>/stories/<id>/story.json   (assets live next to it)
//! ```
//!
//! # Writes
//! Serialization happens on the caller; the file write runs via
//! `tokio::task::spawn_blocking` into a temp file in the target directory that
//! is then renamed over the old document, so a crash never leaves a torn save.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::story::model::{Story, StorySettings};
use crate::story::modules::{HasDisplayText, ModelError, TextModule};
use crate::story::part::StoryPart;

/// Current save file version.
pub const SAVE_VERSION: u32 = 1;

/// How many past ideas are shown to the model when asking for a new one.
pub const PREVIOUS_IDEAS_KEPT: usize = 40;

const STORY_FILE: &str = "story.json";
const IDEAS_FILE: &str = "previous_ideas.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Story {0} not found")]
    NotFound(Uuid),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Invalid story: {0}")]
    InvalidStory(#[from] ModelError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The on-disk form of a story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedStory {
    pub version: u32,
    pub id: Uuid,
    pub saved_at: DateTime<Utc>,
    pub title: Option<TextModule>,
    pub overview: Option<String>,
    #[serde(default)]
    pub idea: Option<String>,
    #[serde(flatten)]
    pub settings: StorySettings,
    pub parts: Vec<StoryPart>,
}

impl SavedStory {
    pub fn from_story(story: &Story) -> Self {
        Self {
            version: SAVE_VERSION,
            id: story.id(),
            saved_at: Utc::now(),
            title: story.title().cloned(),
            overview: story.overview().map(str::to_string),
            idea: story.idea().map(str::to_string),
            settings: story.settings().clone(),
            parts: story.parts().to_vec(),
        }
    }

    pub fn into_story(self) -> Result<Story, StoreError> {
        if self.version != SAVE_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: SAVE_VERSION,
                found: self.version,
            });
        }
        Ok(Story::restore(
            self.id,
            self.title,
            self.overview,
            self.idea,
            self.settings,
            self.parts,
        )?)
    }
}

/// One row of the story history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorySummary {
    pub id: Uuid,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub language: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoryStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles on the idea ledger.
    ideas_lock: Arc<Mutex<()>>,
}

impl StoryStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
            ideas_lock: Arc::default(),
        }
    }

    fn stories_dir(&self) -> PathBuf {
        self.root.join("stories")
    }

    /// Directory holding a story's document and its assets.
    pub fn story_dir(&self, id: Uuid) -> PathBuf {
        self.stories_dir().join(id.to_string())
    }

    pub async fn save(&self, story: &Story) -> Result<(), StoreError> {
        let saved = SavedStory::from_story(story);
        let content = serde_json::to_vec_pretty(&saved)?;
        let dir = self.story_dir(story.id());

        write_atomic(dir, STORY_FILE, content).await?;
        debug!(story_id = %story.id(), parts = saved.parts.len(), "Story saved");
        Ok(())
    }

    pub async fn load(&self, id: Uuid) -> Result<Story, StoreError> {
        let path = self.story_dir(id).join(STORY_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id))
            }
            Err(e) => return Err(e.into()),
        };
        let saved: SavedStory = serde_json::from_str(&content)?;
        saved.into_story()
    }

    /// Every readable saved story, newest first. Unreadable entries are skipped.
    pub async fn list_history(&self) -> Result<Vec<StorySummary>, StoreError> {
        let mut entries = match fs::read_dir(self.stories_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path().join(STORY_FILE);
            match peek_summary(&path).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable story"),
            }
        }

        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(summaries)
    }

    /// The most recent generated ideas, oldest first.
    pub async fn previous_ideas(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.ideas_lock.lock().await;
        self.read_ideas().await
    }

    pub async fn record_idea(&self, idea: &str) -> Result<(), StoreError> {
        let _guard = self.ideas_lock.lock().await;
        let mut ideas = self.read_ideas().await?;
        ideas.push(idea.to_string());
        let content = serde_json::to_vec_pretty(&ideas)?;
        write_atomic(self.root.clone(), IDEAS_FILE, content).await
    }

    async fn read_ideas(&self) -> Result<Vec<String>, StoreError> {
        let content = match fs::read_to_string(self.root.join(IDEAS_FILE)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ideas: Vec<String> = serde_json::from_str(&content)?;
        let skip = ideas.len().saturating_sub(PREVIOUS_IDEAS_KEPT);
        ideas.drain(..skip);
        Ok(ideas)
    }
}

async fn peek_summary(path: &Path) -> Result<StorySummary, StoreError> {
    // Parse just enough for the listing.
    #[derive(Deserialize)]
    struct Partial {
        version: u32,
        id: Uuid,
        saved_at: DateTime<Utc>,
        title: Option<TextModule>,
        overview: Option<String>,
        #[serde(default)]
        target_language: Option<String>,
    }

    let content = fs::read_to_string(path).await?;
    let partial: Partial = serde_json::from_str(&content)?;
    if partial.version != SAVE_VERSION {
        return Err(StoreError::VersionMismatch {
            expected: SAVE_VERSION,
            found: partial.version,
        });
    }

    Ok(StorySummary {
        id: partial.id,
        title: partial.title.map(|t| t.displayed_text().to_string()),
        overview: partial.overview,
        language: partial
            .target_language
            .map(|l| l.to_lowercase())
            .unwrap_or_else(|| "en".to_string()),
        saved_at: partial.saved_at,
    })
}

/// Writes `content` to `dir/file_name` through a temp file and rename.
async fn write_atomic(dir: PathBuf, file_name: &'static str, content: Vec<u8>) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        std::fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(file_name)).map_err(|e| e.error)?;
        Ok(())
    })
    .await??;
    Ok(())
}
