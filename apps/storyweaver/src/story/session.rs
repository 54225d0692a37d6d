//! In-memory registry of live stories.
//!
//! Each story sits behind its own async mutex so that one slow generation never
//! blocks requests for another story, while two requests for the same story are
//! serialized.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::story::model::Story;
use crate::story::store::{StoreError, StoryStore};

pub type SharedStory = Arc<Mutex<Story>>;

#[derive(Default)]
pub struct SessionRegistry {
    stories: RwLock<HashMap<Uuid, SharedStory>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly created story and returns its handle.
    pub async fn insert(&self, story: Story) -> SharedStory {
        let id = story.id();
        let shared = Arc::new(Mutex::new(story));
        self.stories.write().await.insert(id, Arc::clone(&shared));
        shared
    }

    /// Returns the live story, loading it from the store on first access.
    pub async fn get_or_load(&self, id: Uuid, store: &StoryStore) -> Result<SharedStory, StoreError> {
        if let Some(shared) = self.stories.read().await.get(&id) {
            return Ok(Arc::clone(shared));
        }

        let story = store.load(id).await?;
        debug!(story_id = %id, "Story loaded from disk into session registry");

        // Another request may have loaded it while we were reading the disk.
        let mut stories = self.stories.write().await;
        let shared = stories
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(story)));
        Ok(Arc::clone(shared))
    }

    /// Forgets a story. Requests already holding its handle keep working.
    pub async fn remove(&self, id: Uuid) {
        if self.stories.write().await.remove(&id).is_some() {
            debug!(story_id = %id, "Story released from session registry");
        }
    }

    #[cfg(test)]
    pub async fn contains(&self, id: Uuid) -> bool {
        self.stories.read().await.contains_key(&id)
    }
}
