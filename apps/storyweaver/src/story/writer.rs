//! Writer, the sequential narrative calls: idea, expansion, introduction,
//! continuation with choices, and ending.
//!
//! Every call is one structured request with its own validator.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::llm_client::prompts::{fill_placeholders, json_answer, WRITER_PERSONA};
use crate::llm_client::structured::{
    Record, StructuredClient, StructuredError, StructuredRequest, Verdict,
};
use crate::llm_client::ChatMessage;
use crate::story::modules::{MAX_CHOICES, MIN_CHOICES};
use crate::story::prompts::{
    CONTINUATION_FORMAT, CONTINUATION_PROMPT, ENDING_FORMAT, ENDING_PROMPT, EXPANSION_FORMAT,
    EXPANSION_PROMPT, IDEA_FORMAT, IDEA_PROMPT, INTRODUCTION_FORMAT, INTRODUCTION_PROMPT,
};

/// Temperature for narrative text.
const WRITING_TEMPERATURE: f32 = 0.7;

/// An idea expanded into a plan for the story.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryOutline {
    pub title: String,
    pub overview: String,
    pub goal: String,
    pub themes: Vec<String>,
    pub places: Vec<String>,
    pub characters: Vec<String>,
    pub objects: Vec<String>,
}

/// A body part: text plus the labels of the choices it ends on.
#[derive(Debug, Clone, PartialEq)]
pub struct Continuation {
    pub text: String,
    pub choices: Vec<String>,
}

#[derive(Clone)]
pub struct Writer {
    structured: StructuredClient,
    max_attempts: u32,
}

impl Writer {
    pub fn new(structured: StructuredClient, max_attempts: u32) -> Self {
        Self {
            structured,
            max_attempts,
        }
    }

    async fn ask<T, V>(
        &self,
        persona: bool,
        prompt: String,
        keys: &[&str],
        format: &str,
        temperature: f32,
        validator: V,
    ) -> Result<T, StructuredError>
    where
        T: Send,
        V: FnMut(&Record, bool) -> Verdict<T> + Send,
    {
        let preamble = if persona { WRITER_PERSONA } else { "" };
        let content = format!("{preamble}{prompt}{}", json_answer(format));
        let mut history = vec![ChatMessage::system(content)];

        self.structured
            .run(
                &mut history,
                StructuredRequest {
                    schema_keys: keys,
                    format,
                    max_attempts: self.max_attempts,
                    temperature,
                },
                validator,
            )
            .await
    }

    /// A fresh three-line idea, unlike any of `previous_ideas`.
    pub async fn generate_idea(&self, previous_ideas: &[String]) -> Result<String, StructuredError> {
        info!(known = previous_ideas.len(), "Generating a story idea");
        let previous = previous_ideas.join("\n");
        let prompt = fill_placeholders(IDEA_PROMPT, &[("previous_ideas", previous.as_str())]);
        self.ask(false, prompt, &["idea"], IDEA_FORMAT, 1.0, |record, _| {
            non_empty_string(record, "idea")
        })
        .await
    }

    pub async fn expand_idea(&self, idea: &str) -> Result<StoryOutline, StructuredError> {
        info!("Expanding the story idea");
        let prompt = fill_placeholders(EXPANSION_PROMPT, &[("idea", idea)]);
        let keys = ["title", "overview", "goal", "themes", "places", "characters", "objects"];
        self.ask(true, prompt, &keys, EXPANSION_FORMAT, 0.0, |record, _| {
            let title = match non_empty_string(record, "title") {
                Verdict::Accept(title) => title,
                Verdict::Retry { feedback, .. } => return Verdict::retry(feedback),
            };
            let overview = match non_empty_string(record, "overview") {
                Verdict::Accept(overview) => overview,
                Verdict::Retry { feedback, .. } => return Verdict::retry(feedback),
            };
            Verdict::Accept(StoryOutline {
                title,
                overview,
                goal: record["goal"].as_str().unwrap_or_default().to_string(),
                themes: string_list(&record["themes"]),
                places: string_list(&record["places"]),
                characters: string_list(&record["characters"]),
                objects: string_list(&record["objects"]),
            })
        })
        .await
    }

    pub async fn write_introduction(&self, overview: &str) -> Result<String, StructuredError> {
        info!("Writing the introduction");
        let prompt = fill_placeholders(INTRODUCTION_PROMPT, &[("overview", overview)]);
        self.ask(
            true,
            prompt,
            &["story_content"],
            INTRODUCTION_FORMAT,
            WRITING_TEMPERATURE,
            |record, _| non_empty_string(record, "story_content"),
        )
        .await
    }

    /// Part `part_number` of `total_parts`, ending on 2 to 4 choices.
    pub async fn write_continuation(
        &self,
        overview: &str,
        story_so_far: &str,
        part_number: usize,
        total_parts: usize,
    ) -> Result<Continuation, StructuredError> {
        info!(part_number, total_parts, "Writing a continuation");
        let (part_number, total_parts) = (part_number.to_string(), total_parts.to_string());
        let prompt = fill_placeholders(
            CONTINUATION_PROMPT,
            &[
                ("overview", overview),
                ("part_number", part_number.as_str()),
                ("total_parts", total_parts.as_str()),
                ("story", story_so_far),
            ],
        );
        self.ask(
            true,
            prompt,
            &["story_content", "choices"],
            CONTINUATION_FORMAT,
            WRITING_TEMPERATURE,
            validate_continuation,
        )
        .await
    }

    pub async fn write_ending(
        &self,
        overview: &str,
        story_so_far: &str,
    ) -> Result<String, StructuredError> {
        info!("Writing the ending");
        let prompt = fill_placeholders(ENDING_PROMPT, &[("overview", overview), ("story", story_so_far)]);
        self.ask(
            true,
            prompt,
            &["story_end"],
            ENDING_FORMAT,
            WRITING_TEMPERATURE,
            |record, _| non_empty_string(record, "story_end"),
        )
        .await
    }
}

fn non_empty_string(record: &Record, key: &str) -> Verdict<String> {
    match record[key].as_str() {
        Some(value) if !value.trim().is_empty() => Verdict::Accept(value.to_string()),
        _ => Verdict::retry(format!("'{key}' must be a non-empty string.")),
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Too few choices or a malformed one is always retried. Too many is retried
/// too, but the first four are kept if it is the last chance.
fn validate_continuation(record: &Record, _is_final: bool) -> Verdict<Continuation> {
    let text = match non_empty_string(record, "story_content") {
        Verdict::Accept(text) => text,
        Verdict::Retry { feedback, .. } => return Verdict::retry(feedback),
    };

    let Some(entries) = record["choices"].as_array() else {
        return Verdict::retry(format!(
            "'choices' must be a list. Please verify that your answer is in the right JSON format: {CONTINUATION_FORMAT}"
        ));
    };

    if entries.len() < MIN_CHOICES {
        return Verdict::retry(format!(
            "The JSON answer should contain at least {MIN_CHOICES} choices. \
            Please verify that your answer is in the right JSON format and contains all the choices: {CONTINUATION_FORMAT}"
        ));
    }

    let mut choices = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.get("choice").and_then(Value::as_str) {
            Some(label) if !label.trim().is_empty() => choices.push(label.to_string()),
            _ => {
                return Verdict::retry(format!(
                    "The JSON of a choice is missing some keys ({entry}). \
                    Please verify that your answer is in the right JSON format: {CONTINUATION_FORMAT}"
                ))
            }
        }
    }

    if choices.len() > MAX_CHOICES {
        let feedback = format!(
            "The JSON answer should contain at most {MAX_CHOICES} choices, you gave {}.",
            choices.len()
        );
        choices.truncate(MAX_CHOICES);
        return Verdict::retry_or(feedback, Continuation { text, choices });
    }

    Verdict::Accept(Continuation { text, choices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    use crate::testing::ScriptedTextGenerator;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn writer(generator: &Arc<ScriptedTextGenerator>, attempts: u32) -> Writer {
        Writer::new(StructuredClient::new(generator.clone()), attempts)
    }

    // ── validate_continuation ───────────────────────────────────────────────

    #[test]
    fn test_continuation_accepts_two_to_four_choices() {
        let verdict = validate_continuation(
            &record(json!({"story_content": "x", "choices": [{"choice": "A"}, {"choice": "B"}]})),
            false,
        );
        assert_eq!(
            verdict,
            Verdict::Accept(Continuation {
                text: "x".into(),
                choices: vec!["A".into(), "B".into()]
            })
        );
    }

    #[test]
    fn test_continuation_rejects_single_choice_without_fallback() {
        let verdict = validate_continuation(
            &record(json!({"story_content": "x", "choices": [{"choice": "A"}]})),
            true,
        );
        assert!(matches!(verdict, Verdict::Retry { fallback: None, .. }));
    }

    #[test]
    fn test_continuation_rejects_choice_without_label() {
        let verdict = validate_continuation(
            &record(json!({"story_content": "x", "choices": [{"choice": "A"}, {"label": "B"}]})),
            false,
        );
        let Verdict::Retry { feedback, fallback } = verdict else {
            panic!("expected retry");
        };
        assert!(feedback.contains("missing some keys"));
        assert!(fallback.is_none());
    }

    #[test]
    fn test_continuation_truncates_extra_choices_as_fallback() {
        let choices: Vec<Value> = (1..=6).map(|i| json!({"choice": format!("C{i}")})).collect();
        let verdict = validate_continuation(
            &record(json!({"story_content": "x", "choices": choices})),
            false,
        );
        let Verdict::Retry {
            fallback: Some(partial),
            ..
        } = verdict
        else {
            panic!("expected retry with fallback");
        };
        assert_eq!(partial.choices, vec!["C1", "C2", "C3", "C4"]);
    }

    // ── Writer calls ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_generate_idea_lists_previous_ideas() {
        let generator = Arc::new(ScriptedTextGenerator::new([r#"{"idea": "A clockmaker's last wish."}"#]));

        let idea = writer(&generator, 2)
            .generate_idea(&["Old idea one".into(), "Old idea two".into()])
            .await
            .unwrap();

        assert_eq!(idea, "A clockmaker's last wish.");
        let prompt = &generator.calls()[0][0].content;
        assert!(prompt.contains("Old idea one\nOld idea two"));
    }

    #[tokio::test]
    async fn test_expand_idea_reads_outline() {
        let generator = Arc::new(ScriptedTextGenerator::new([json!({
            "themes": ["time"], "places": ["workshop"], "characters": ["clockmaker"],
            "objects": ["key"], "goal": "Fix the clock", "title": "The Last Tick",
            "overview": "You must repair the town clock before midnight."
        })
        .to_string()]));

        let outline = writer(&generator, 2).expand_idea("clock").await.unwrap();

        assert_eq!(outline.title, "The Last Tick");
        assert_eq!(outline.places, vec!["workshop"]);
        assert!(generator.calls()[0][0].content.starts_with(WRITER_PERSONA));
    }

    #[tokio::test]
    async fn test_continuation_prompt_carries_part_numbers() {
        let generator = Arc::new(ScriptedTextGenerator::new([json!({
            "story_content": "The bridge sways.",
            "choices": [{"choice": "Cross"}, {"choice": "Turn back"}]
        })
        .to_string()]));

        let continuation = writer(&generator, 2)
            .write_continuation("overview", "so far", 2, 3)
            .await
            .unwrap();

        assert_eq!(continuation.choices, vec!["Cross", "Turn back"]);
        let prompt = &generator.calls()[0][0].content;
        assert!(prompt.contains("this part is 2/3"));
        assert!(prompt.contains("Story so far: so far"));
    }

    #[tokio::test]
    async fn test_ending_retries_on_empty_text() {
        let generator = Arc::new(ScriptedTextGenerator::new([
            r#"{"story_end": "  "}"#,
            r#"{"story_end": "And so it ends."}"#,
        ]));

        let ending = writer(&generator, 3)
            .write_ending("overview", "so far")
            .await
            .unwrap();

        assert_eq!(ending, "And so it ends.");
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_ending_prompt_leaves_braces_in_model_text_alone() {
        let generator = Arc::new(ScriptedTextGenerator::new([r#"{"story_end": "Fin."}"#]));

        writer(&generator, 1)
            .write_ending("a map marked {story}", "You found {overview} carved in stone.")
            .await
            .unwrap();

        let prompt = &generator.calls()[0][0].content;
        assert!(prompt.contains("Story so far: You found {overview} carved in stone."));
        assert!(prompt.contains("Story overview: a map marked {story}"));
    }
}
