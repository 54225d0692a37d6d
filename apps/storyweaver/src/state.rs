use std::sync::Arc;

use crate::story::engine::StoryEngine;
use crate::story::session::SessionRegistry;
use crate::usage::UsageTracker;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<StoryEngine>,
    /// Live stories keyed by id; loaded from disk on first access.
    pub sessions: Arc<SessionRegistry>,
    pub usage: Arc<UsageTracker>,
}
