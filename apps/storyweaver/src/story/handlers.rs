//! Axum route handlers for the Story API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::providers::{is_supported_language, Language, AVAILABLE_LANGUAGES};
use crate::state::AppState;
use crate::story::engine::GenerationStatus;
use crate::story::model::{Story, StorySettings, StoryState};
use crate::story::modules::{ChoiceModule, HasDisplayText};
use crate::story::part::StoryPart;
use crate::story::store::StorySummary;
use crate::usage::UsageReport;

const MIN_LENGTH: u32 = 1;
const MAX_LENGTH: u32 = 10;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateStoryRequest {
    pub idea: Option<String>,
    pub title: Option<String>,
    pub overview: Option<String>,
    #[serde(default = "default_length")]
    pub length: u32,
    pub target_language: Option<String>,
    #[serde(default = "default_true")]
    pub illustrate: bool,
    #[serde(default)]
    pub speech: bool,
}

fn default_length() -> u32 {
    StorySettings::default().length
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct CreateStoryResponse {
    pub id: Uuid,
    pub state: StoryState,
}

#[derive(Debug, Serialize)]
pub struct StoryView {
    pub id: Uuid,
    pub state: StoryState,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub idea: Option<String>,
    pub settings: StorySettings,
    pub parts: Vec<StoryPart>,
}

impl From<&Story> for StoryView {
    fn from(story: &Story) -> Self {
        Self {
            id: story.id(),
            state: story.state(),
            title: story.title().map(|t| t.displayed_text().to_string()),
            overview: story.overview().map(str::to_string),
            idea: story.idea().map(str::to_string),
            settings: story.settings().clone(),
            parts: story.parts().to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NextPartsResponse {
    pub status: GenerationStatus,
    pub parts: Vec<StoryPart>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitChoiceRequest {
    pub choice: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitChoiceResponse {
    pub accepted: bool,
    pub state: StoryState,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/stories
///
/// Creates a story session. With `title` and `overview` generation starts at the
/// introduction; with `idea` the idea is expanded first; with neither a fresh
/// idea is generated.
pub async fn handle_create_story(
    State(state): State<AppState>,
    Json(request): Json<CreateStoryRequest>,
) -> Result<(StatusCode, Json<CreateStoryResponse>), AppError> {
    let settings = validate_settings(&request)?;

    let story = match (non_blank(request.title), non_blank(request.overview), non_blank(request.idea)) {
        (Some(title), Some(overview), None) => Story::with_outline(settings, title, overview),
        (None, None, Some(idea)) => Story::from_idea(settings, idea),
        (None, None, None) => Story::new(settings),
        (_, _, Some(_)) => {
            return Err(AppError::Validation(
                "idea cannot be combined with title or overview".to_string(),
            ))
        }
        _ => {
            return Err(AppError::Validation(
                "title and overview must be given together".to_string(),
            ))
        }
    };

    state.engine.store().save(&story).await?;
    let response = CreateStoryResponse {
        id: story.id(),
        state: story.state(),
    };
    state.sessions.insert(story).await;
    info!(story_id = %response.id, state = ?response.state, "Story created");

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/stories
///
/// Saved stories, most recently saved first.
pub async fn handle_list_stories(
    State(state): State<AppState>,
) -> Result<Json<Vec<StorySummary>>, AppError> {
    Ok(Json(state.engine.store().list_history().await?))
}

/// GET /api/v1/stories/:id
pub async fn handle_get_story(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
) -> Result<Json<StoryView>, AppError> {
    let shared = state.sessions.get_or_load(story_id, state.engine.store()).await?;
    let story = shared.lock().await;
    Ok(Json(StoryView::from(&*story)))
}

/// POST /api/v1/stories/:id/next
///
/// Generation failures are reported through `status`, not as HTTP errors; the
/// caller retries by calling this endpoint again. A finished story leaves the
/// session registry and is reloaded from disk if asked for again.
pub async fn handle_next_parts(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
) -> Result<Json<NextPartsResponse>, AppError> {
    let shared = state.sessions.get_or_load(story_id, state.engine.store()).await?;
    let mut story = shared.lock().await;
    let (status, parts) = state.engine.generate_next_parts(&mut story).await;
    let finished = story.is_complete();
    drop(story);

    if finished {
        state.sessions.remove(story_id).await;
    }
    Ok(Json(NextPartsResponse { status, parts }))
}

/// POST /api/v1/stories/:id/choice
///
/// `accepted` is false when the story is not waiting for a choice or the text
/// matches none of the offered choices. A failed save is logged; the choice
/// stays applied in memory and is written with the next part.
pub async fn handle_submit_choice(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Json(request): Json<SubmitChoiceRequest>,
) -> Result<Json<SubmitChoiceResponse>, AppError> {
    let shared = state.sessions.get_or_load(story_id, state.engine.store()).await?;
    let mut story = shared.lock().await;
    let accepted = story.submit_user_choice(&ChoiceModule::new(request.choice));
    if accepted {
        if let Err(e) = state.engine.store().save(&story).await {
            error!(%story_id, error = %e, "Failed to save the selected choice");
        }
    }
    Ok(Json(SubmitChoiceResponse {
        accepted,
        state: story.state(),
    }))
}

/// GET /api/v1/languages
pub async fn handle_languages() -> Json<&'static [Language]> {
    Json(AVAILABLE_LANGUAGES)
}

/// GET /api/v1/usage
pub async fn handle_usage(State(state): State<AppState>) -> Json<UsageReport> {
    Json(state.usage.report())
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn validate_settings(request: &CreateStoryRequest) -> Result<StorySettings, AppError> {
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&request.length) {
        return Err(AppError::Validation(format!(
            "length must be between {MIN_LENGTH} and {MAX_LENGTH}, got {}",
            request.length
        )));
    }

    // Stories are written in English, so asking for English means no translation.
    let target_language = match request.target_language.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(code) if !is_supported_language(code) => {
            return Err(AppError::Validation(format!(
                "unsupported target_language '{code}'"
            )))
        }
        Some(code) if code.eq_ignore_ascii_case("en") => None,
        Some(code) => Some(code.to_uppercase()),
    };

    Ok(StorySettings {
        length: request.length,
        target_language,
        illustrate: request.illustrate,
        speech: request.speech,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
