//! Story State Machine: produces a story one part at a time.
//!
//! # generate_next_parts
//! 1. Parts the caller has not received yet (after a reload) are returned as-is.
//! 2. Past the ending → `Complete`. Trailing unresolved choice set → `AwaitingUserInput`.
//! 3. No title/overview → idea (generated unless seeded) and expansion.
//! 4. Text by iteration `n` out of `length`:
//!    - `n == 0`: introduction, then continuation (or the ending when `length == 0`)
//!    - `n < length`: continuation ending on 2 to 4 choices
//!    - otherwise: ending
//! 5. Illustration, then translation (soft-fail), then speech (soft-fail).
//! 6. The part is appended and the story saved.
//!
//! A failed step returns an error status and leaves the story's parts untouched,
//! so the same call can simply be made again.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::batch::{run_batched, BatchConfig};
use crate::llm_client::structured::{StructuredClient, StructuredError};
use crate::llm_client::TextGenerator;
use crate::providers::{ImageGenerator, SpeechSynthesizer, Translator};
use crate::story::illustration::{IllustrationError, Illustrator};
use crate::story::model::Story;
use crate::story::modules::{
    ChoiceModule, ChoiceSet, HasDisplayText, ModelError, StoryModule, Translatable,
};
use crate::story::part::StoryPart;
use crate::story::store::StoryStore;
use crate::story::writer::Writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Ok,
    AwaitingUserInput,
    Complete,
    TextGenerationError,
    ImageGenerationError,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub max_attempts: u32,
    pub illustrations_per_text: usize,
    pub batch: BatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            illustrations_per_text: 2,
            batch: BatchConfig::default(),
        }
    }
}

/// The external collaborators the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub text: Arc<dyn TextGenerator>,
    pub images: Arc<dyn ImageGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub translator: Arc<dyn Translator>,
}

/// Text produced for one part, before rendering.
struct Draft {
    texts: Vec<String>,
    choices: Option<Vec<String>>,
}

enum StepError {
    Text(StructuredError),
    Choices(ModelError),
    Image(IllustrationError),
}

impl From<StructuredError> for StepError {
    fn from(e: StructuredError) -> Self {
        StepError::Text(e)
    }
}

#[derive(Clone)]
pub struct StoryEngine {
    writer: Writer,
    illustrator: Illustrator,
    speech: Arc<dyn SpeechSynthesizer>,
    translator: Arc<dyn Translator>,
    store: StoryStore,
    config: EngineConfig,
}

impl StoryEngine {
    pub fn new(collaborators: Collaborators, store: StoryStore, config: EngineConfig) -> Self {
        let structured = StructuredClient::new(collaborators.text);
        Self {
            writer: Writer::new(structured.clone(), config.max_attempts),
            illustrator: Illustrator::new(
                structured,
                collaborators.images,
                config.max_attempts,
                config.batch,
            ),
            speech: collaborators.speech,
            translator: collaborators.translator,
            store,
            config,
        }
    }

    pub fn store(&self) -> &StoryStore {
        &self.store
    }

    /// Advances the story by at most one part. See the module docs for the steps.
    pub async fn generate_next_parts(&self, story: &mut Story) -> (GenerationStatus, Vec<StoryPart>) {
        let story_id = story.id();

        if story.has_undelivered() {
            let parts = story.take_undelivered();
            info!(%story_id, count = parts.len(), "Replaying undelivered parts");
            return (GenerationStatus::Ok, parts);
        }
        if story.is_complete() {
            return (GenerationStatus::Complete, Vec::new());
        }
        if story.is_awaiting_user_input() {
            return (GenerationStatus::AwaitingUserInput, Vec::new());
        }

        if !story.has_outline() {
            if let Err(e) = self.generate_outline(story).await {
                warn!(%story_id, error = %e, "Story idea generation failed");
                return (GenerationStatus::TextGenerationError, Vec::new());
            }
        }

        let mut modules = match self.produce_modules(story).await {
            Ok(modules) => modules,
            Err(StepError::Text(e)) => {
                warn!(%story_id, error = %e, "Text generation failed");
                return (GenerationStatus::TextGenerationError, Vec::new());
            }
            Err(StepError::Choices(e)) => {
                error!(%story_id, error = %e, "Validated choices did not form a choice set");
                return (GenerationStatus::TextGenerationError, Vec::new());
            }
            Err(StepError::Image(e)) => {
                warn!(%story_id, error = %e, "Illustration failed");
                return (GenerationStatus::ImageGenerationError, Vec::new());
            }
        };

        let asset_dir = self.store.story_dir(story_id);
        if let Some(lang) = story.settings().target_language.clone() {
            self.translate_title(story, &lang).await;
            self.translate_modules(&mut modules, &lang).await;
        }
        if story.settings().speech {
            self.synthesize_speech(&mut modules, &asset_dir).await;
        }

        let part = StoryPart::new(modules);
        story.append_part(part.clone());
        info!(%story_id, part = story.iteration_count(), modules = part.len(), "Story part generated");

        if let Err(e) = self.store.save(story).await {
            error!(%story_id, error = %e, "Failed to save story");
        }

        (GenerationStatus::Ok, vec![part])
    }

    async fn generate_outline(&self, story: &mut Story) -> Result<(), StructuredError> {
        let idea = match story.idea() {
            Some(idea) => idea.to_string(),
            None => {
                let previous = self.store.previous_ideas().await.unwrap_or_else(|e| {
                    warn!(error = %e, "Could not read previous ideas");
                    Vec::new()
                });
                let idea = self.writer.generate_idea(&previous).await?;
                if let Err(e) = self.store.record_idea(&idea).await {
                    warn!(error = %e, "Could not record the new idea");
                }
                story.set_idea(idea.clone());
                idea
            }
        };

        let outline = self.writer.expand_idea(&idea).await?;
        info!(story_id = %story.id(), title = %outline.title, "Story outline ready");
        story.set_outline(outline.title, outline.overview);
        Ok(())
    }

    async fn write_draft(&self, story: &Story) -> Result<Draft, StructuredError> {
        let n = story.iteration_count();
        let length = story.settings().length as usize;
        let overview = story.overview().unwrap_or_default();
        let mut story_so_far = story.prompt_story();
        let mut texts = Vec::with_capacity(2);
        let mut choices = None;

        if n == 0 {
            let introduction = self.writer.write_introduction(overview).await?;
            story_so_far = join_context(&story_so_far, &introduction);
            texts.push(introduction);
        }

        if n < length {
            let continuation = self
                .writer
                .write_continuation(overview, &story_so_far, n + 1, length)
                .await?;
            texts.push(continuation.text);
            choices = Some(continuation.choices);
        } else {
            texts.push(self.writer.write_ending(overview, &story_so_far).await?);
        }

        Ok(Draft { texts, choices })
    }

    async fn produce_modules(&self, story: &Story) -> Result<Vec<StoryModule>, StepError> {
        let draft = self.write_draft(story).await?;

        let choice_set = draft
            .choices
            .map(|labels| ChoiceSet::new(labels.into_iter().map(ChoiceModule::new).collect()))
            .transpose()
            .map_err(StepError::Choices)?;

        let mut modules = Vec::new();
        if story.settings().illustrate {
            let asset_dir = self.store.story_dir(story.id());
            let mut context = story.prompt_story();
            for text in &draft.texts {
                let rendered = self
                    .illustrator
                    .render(&context, text, self.config.illustrations_per_text, &asset_dir)
                    .await
                    .map_err(StepError::Image)?;
                modules.extend(rendered);
                context = join_context(&context, text);
            }
        } else {
            modules.extend(draft.texts.into_iter().map(StoryModule::text));
        }

        if let Some(set) = choice_set {
            modules.push(StoryModule::ChoiceSet(set));
        }
        Ok(modules)
    }

    async fn translate_title(&self, story: &mut Story, lang: &str) {
        let Some(title) = story.title() else {
            return;
        };
        if title.is_translated_to(lang) {
            return;
        }
        let source = title.text().to_string();
        match self.translator.translate(&source, lang).await {
            Ok(translated) => {
                if let Some(title) = story.title_mut() {
                    title.set_displayed_text(lang, translated);
                }
            }
            Err(e) => warn!(lang, error = %e, "Title translation failed, keeping original"),
        }
    }

    /// Translates every translatable unit in place. Failures keep the original text.
    async fn translate_modules(&self, modules: &mut [StoryModule], lang: &str) {
        let sources: Vec<String> = modules
            .iter_mut()
            .flat_map(StoryModule::translatables_mut)
            .map(|unit| unit.text().to_string())
            .collect();
        if sources.is_empty() {
            return;
        }

        let translator = &self.translator;
        let results = run_batched(sources, self.config.batch, |text| async move {
            translator.translate(&text, lang).await
        })
        .await;

        let units = modules.iter_mut().flat_map(StoryModule::translatables_mut);
        for (unit, result) in units.zip(results) {
            match result {
                Ok(translated) => {
                    unit.set_displayed_text(lang, translated);
                }
                Err(e) => warn!(lang, error = %e, "Translation failed, keeping original"),
            }
        }
    }

    /// Attaches audio to every speech-capable module. Failures leave it without audio.
    async fn synthesize_speech(&self, modules: &mut [StoryModule], asset_dir: &Path) {
        let jobs: Vec<(usize, String)> = modules
            .iter()
            .enumerate()
            .filter_map(|(index, module)| {
                module
                    .as_speech()
                    .map(|speech| (index, speech.speech_text().to_string()))
            })
            .filter(|(_, text)| !text.trim().is_empty())
            .collect();
        if jobs.is_empty() {
            return;
        }

        let speech = &self.speech;
        let results = run_batched(jobs, self.config.batch, |(index, text)| async move {
            (index, speech.synthesize(&text, asset_dir).await)
        })
        .await;

        for (index, result) in results {
            match result {
                Ok(path) => {
                    if let Some(target) = modules.get_mut(index).and_then(StoryModule::as_speech_mut) {
                        target.attach_audio(path);
                    }
                }
                Err(e) => warn!(module = index, error = %e, "Speech synthesis failed"),
            }
        }
    }
}

fn join_context(story_so_far: &str, text: &str) -> String {
    if story_so_far.is_empty() {
        text.to_string()
    } else {
        format!("{story_so_far}\n{text}")
    }
}
