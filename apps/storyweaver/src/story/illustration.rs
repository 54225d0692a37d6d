//! Illustration Span Matcher and the text → modules rendering pipeline.
//!
//! The model names a passage by quoting its first and last words. `resolve` maps
//! each quote pair back onto exactly one span of the source text:
//!
//! 1. Pattern `escape(beginning) .*? escape(end)`, case-insensitive, `.` matches
//!    newlines; all non-overlapping occurrences are enumerated.
//! 2. Zero occurrences or more than one → rejected with an error naming the request.
//! 3. A span intersecting an already accepted span → rejected; first accepted wins.
//! 4. The accepted list is truncated to `max_accepted`, request order preserved.
//!
//! Spans are half-open byte ranges on `char` boundaries.

use std::path::Path;
use std::sync::Arc;

use regex::RegexBuilder;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::batch::{run_batched, BatchConfig};
use crate::llm_client::prompts::{fill_placeholders, json_answer};
use crate::llm_client::structured::{
    Record, StructuredClient, StructuredError, StructuredRequest, Verdict,
};
use crate::llm_client::ChatMessage;
use crate::providers::{ImageGenerator, ProviderError};
use crate::story::modules::{ImageModule, StoryModule};
use crate::story::prompts::{
    IMAGE_DESCRIPTION_FORMAT, IMAGE_DESCRIPTION_PROMPT, ILLUSTRATIONS_FORMAT,
    ILLUSTRATIONS_PROMPT,
};

#[derive(Debug, Error)]
pub enum IllustrationError {
    #[error("illustration suggestions failed: {0}")]
    Suggestion(StructuredError),

    #[error("image description failed: {0}")]
    Description(StructuredError),

    #[error("image generation failed: {0}")]
    Image(#[from] ProviderError),
}

/// A request that resolved to exactly one passage.
#[derive(Debug, Clone, PartialEq)]
pub struct IllustrationMatch {
    /// 1-based position of the request in the model's answer.
    pub ordinal: usize,
    pub description: String,
    /// The matched passage, exactly as it appears in the source.
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl IllustrationMatch {
    fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && end > self.start
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Span matching
// ────────────────────────────────────────────────────────────────────────────

/// Resolves illustration requests against `source`.
///
/// Returns the accepted matches and one concatenated error report; an empty
/// report means every request was accepted.
pub fn resolve(
    source: &str,
    requests: &[Value],
    max_accepted: usize,
) -> (Vec<IllustrationMatch>, String) {
    let mut accepted: Vec<IllustrationMatch> = Vec::new();
    let mut errors = String::new();

    for (index, request) in requests.iter().enumerate() {
        let ordinal = index + 1;
        let fields = (
            request.get("description").and_then(Value::as_str),
            request.get("text_beginning").and_then(Value::as_str),
            request.get("text_end").and_then(Value::as_str),
        );
        let (Some(description), Some(beginning), Some(end)) = fields else {
            errors.push_str(&format!(
                "Requested illustration {ordinal} is missing some keys. \
                Please verify that your answer is in the right JSON format: {ILLUSTRATIONS_FORMAT}\n"
            ));
            continue;
        };

        let pattern = format!("{}.*?{}", regex::escape(beginning), regex::escape(end));
        let regex = match RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
        {
            Ok(regex) => regex,
            Err(e) => {
                errors.push_str(&format!(
                    "Requested illustration {ordinal} text reference could not be searched ({e}). \
                    Please provide a shorter text reference.\n"
                ));
                continue;
            }
        };

        let mut occurrences = regex.find_iter(source);
        let (found, extra) = (occurrences.next(), occurrences.next());
        let found = match (found, extra) {
            (None, _) => {
                errors.push_str(&format!(
                    "Requested illustration {ordinal} text reference does not match any part of the text ({request}). \
                    Please provide in 'text_beginning' and 'text_end' the beginning and end of the text reference \
                    that should be illustrated respectively.\n"
                ));
                continue;
            }
            (Some(_), Some(_)) => {
                errors.push_str(&format!(
                    "Requested illustration {ordinal} text reference is too broad and matches multiple parts \
                    of the text ({request}). Please provide a more specific text reference.\n"
                ));
                continue;
            }
            (Some(found), None) => found,
        };

        if let Some(previous) = accepted
            .iter()
            .find(|m| m.overlaps(found.start(), found.end()))
        {
            errors.push_str(&format!(
                "Requested illustration {ordinal} text reference overlaps with illustration {}. \
                Please provide a non-overlapping text reference or remove the illustration.\n",
                previous.ordinal
            ));
            continue;
        }

        accepted.push(IllustrationMatch {
            ordinal,
            description: description.to_string(),
            text: found.as_str().to_string(),
            start: found.start(),
            end: found.end(),
        });
    }

    accepted.truncate(max_accepted);
    (accepted, errors)
}

/// Splits `text` around the matches, inserting an image before each matched
/// passage. The passage itself stays in the following text module; empty text
/// modules are dropped.
pub fn layout(text: &str, matches: &[IllustrationMatch], images: Vec<ImageModule>) -> Vec<StoryModule> {
    let mut modules = Vec::with_capacity(matches.len() * 2 + 1);
    let mut current = 0;

    for (found, image) in matches.iter().zip(images) {
        let before = &text[current..found.start];
        if !before.is_empty() {
            modules.push(StoryModule::text(before));
        }
        modules.push(StoryModule::Image(image));
        current = found.start;
    }

    let rest = &text[current..];
    if !rest.is_empty() {
        modules.push(StoryModule::text(rest));
    }
    modules
}

// ────────────────────────────────────────────────────────────────────────────
// Illustrator
// ────────────────────────────────────────────────────────────────────────────

/// Illustrates a text block: suggestions, one image description per match, images.
#[derive(Clone)]
pub struct Illustrator {
    structured: StructuredClient,
    images: Arc<dyn ImageGenerator>,
    max_attempts: u32,
    batch: BatchConfig,
}

impl Illustrator {
    pub fn new(
        structured: StructuredClient,
        images: Arc<dyn ImageGenerator>,
        max_attempts: u32,
        batch: BatchConfig,
    ) -> Self {
        Self {
            structured,
            images,
            max_attempts,
            batch,
        }
    }

    /// Asks where `text` should be illustrated. On the final attempt whatever
    /// resolved is kept, even if some requests did not.
    pub async fn suggest(
        &self,
        text: &str,
        max_illustrations: usize,
    ) -> Result<Vec<IllustrationMatch>, StructuredError> {
        let max = max_illustrations.to_string();
        let prompt = format!(
            "{}{}",
            fill_placeholders(
                ILLUSTRATIONS_PROMPT,
                &[("max_illustrations", max.as_str()), ("text", text)],
            ),
            json_answer(ILLUSTRATIONS_FORMAT)
        );
        let mut history = vec![ChatMessage::system(prompt)];

        self.structured
            .run(
                &mut history,
                StructuredRequest {
                    schema_keys: &["illustrations"],
                    format: ILLUSTRATIONS_FORMAT,
                    max_attempts: self.max_attempts,
                    temperature: 0.0,
                },
                |record: &Record, _| {
                    let Some(requests) = record["illustrations"].as_array() else {
                        return Verdict::retry_or(
                            format!("'illustrations' must be a list. Use the format: {ILLUSTRATIONS_FORMAT}"),
                            Vec::new(),
                        );
                    };
                    let (accepted, errors) = resolve(text, requests, max_illustrations);
                    if errors.is_empty() {
                        Verdict::Accept(accepted)
                    } else {
                        Verdict::retry_or(errors, accepted)
                    }
                },
            )
            .await
    }

    /// Turns a match into a detailed prompt for the image collaborator.
    pub async fn describe(
        &self,
        story_so_far: &str,
        found: &IllustrationMatch,
    ) -> Result<String, StructuredError> {
        let prompt = format!(
            "{}{}",
            fill_placeholders(
                IMAGE_DESCRIPTION_PROMPT,
                &[
                    ("description", found.description.as_str()),
                    ("excerpt", found.text.as_str()),
                    ("story", story_so_far),
                ],
            ),
            json_answer(IMAGE_DESCRIPTION_FORMAT)
        );
        let mut history = vec![ChatMessage::system(prompt)];

        self.structured
            .run(
                &mut history,
                StructuredRequest {
                    schema_keys: &["image_description"],
                    format: IMAGE_DESCRIPTION_FORMAT,
                    max_attempts: self.max_attempts,
                    temperature: 0.0,
                },
                |record: &Record, _| match record["image_description"].as_str() {
                    Some(description) if !description.trim().is_empty() => {
                        Verdict::Accept(description.to_string())
                    }
                    _ => Verdict::retry("'image_description' must be a non-empty string."),
                },
            )
            .await
    }

    async fn illustrate_match(
        &self,
        story_so_far: &str,
        found: &IllustrationMatch,
        out_dir: &Path,
    ) -> Result<ImageModule, IllustrationError> {
        let description = self
            .describe(story_so_far, found)
            .await
            .map_err(IllustrationError::Description)?;
        let path = self.images.generate_image(&description, out_dir).await?;
        Ok(ImageModule::new(path))
    }

    /// Renders `text` into text and image modules. Any failing step fails the
    /// whole block so no half-illustrated part is produced.
    pub async fn render(
        &self,
        story_so_far: &str,
        text: &str,
        max_illustrations: usize,
        out_dir: &Path,
    ) -> Result<Vec<StoryModule>, IllustrationError> {
        let mut matches = self
            .suggest(text, max_illustrations)
            .await
            .map_err(IllustrationError::Suggestion)?;
        matches.sort_by_key(|m| m.start);
        info!(count = matches.len(), "Generating illustrations");

        let context = format!("{story_so_far}\n{text}");
        let results = run_batched(matches.iter().collect(), self.batch, |found| {
            self.illustrate_match(&context, found, out_dir)
        })
        .await;

        let mut images = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(image) => images.push(image),
                Err(e) => {
                    warn!(error = %e, "Illustration failed");
                    return Err(e);
                }
            }
        }

        Ok(layout(text, &matches, images))
    }
}
