//! Structured-Retry Client: turns an unreliable free-text completion into a typed answer.
//!
//! # Protocol
//! Each attempt sends the full history, strips code fences, and decodes the reply as a
//! JSON object. A reply that does not decode, lacks a required key, or is rejected by the
//! validator appends ONE corrective system message and the loop continues. The history
//! only ever grows.
//!
//! # Final attempt
//! The validator learns when it is looking at the last attempt. If it still rejects the
//! answer but offers a `fallback`, that fallback is returned unconditionally (partial
//! success beats total failure). A rejection without fallback ends in `Exhausted`.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::llm_client::{strip_json_fences, ChatMessage, LlmError, TextGenerator};

/// A decoded structured answer: top-level JSON object.
pub type Record = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StructuredError {
    #[error("Text generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("No acceptable answer after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Outcome of validating one decoded record.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<T> {
    Accept(T),
    /// `feedback` is sent back to the model; `fallback` is taken on the final attempt.
    Retry { feedback: String, fallback: Option<T> },
}

impl<T> Verdict<T> {
    pub fn retry(feedback: impl Into<String>) -> Self {
        Verdict::Retry {
            feedback: feedback.into(),
            fallback: None,
        }
    }

    pub fn retry_or(feedback: impl Into<String>, fallback: T) -> Self {
        Verdict::Retry {
            feedback: feedback.into(),
            fallback: Some(fallback),
        }
    }
}

/// Per-call parameters of a structured request.
#[derive(Debug, Clone, Copy)]
pub struct StructuredRequest<'a> {
    /// Top-level keys that must be present in the decoded object.
    pub schema_keys: &'a [&'a str],
    /// Human-readable expected shape, quoted in corrective messages.
    pub format: &'a str,
    pub max_attempts: u32,
    pub temperature: f32,
}

#[derive(Clone)]
pub struct StructuredClient {
    generator: Arc<dyn TextGenerator>,
}

impl StructuredClient {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Runs the validate/repair loop and returns the decoded record itself.
    pub async fn run_record(
        &self,
        history: &mut Vec<ChatMessage>,
        request: StructuredRequest<'_>,
    ) -> Result<Record, StructuredError> {
        self.run(history, request, |record: &Record, _| {
            Verdict::Accept(record.clone())
        })
        .await
    }

    /// Runs the validate/repair loop with a domain validator.
    pub async fn run<T, V>(
        &self,
        history: &mut Vec<ChatMessage>,
        request: StructuredRequest<'_>,
        mut validator: V,
    ) -> Result<T, StructuredError>
    where
        T: Send,
        V: FnMut(&Record, bool) -> Verdict<T> + Send,
    {
        let max_attempts = request.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let is_final = attempt == max_attempts;
            let answer = self
                .generator
                .generate(history, request.temperature)
                .await?;

            let feedback = match decode_record(&answer, request.schema_keys) {
                Err(problem) => problem.feedback(request.format),
                Ok(record) => match validator(&record, is_final) {
                    Verdict::Accept(payload) => return Ok(payload),
                    Verdict::Retry {
                        fallback: Some(payload),
                        ..
                    } if is_final => {
                        warn!(
                            attempt,
                            "Structured answer still rejected on final attempt, keeping best effort"
                        );
                        return Ok(payload);
                    }
                    Verdict::Retry { feedback, .. } => feedback,
                },
            };

            warn!(
                attempt,
                max_attempts,
                reason = %feedback,
                "Structured answer rejected"
            );

            if !is_final {
                history.push(ChatMessage::system(feedback));
            }
        }

        Err(StructuredError::Exhausted {
            attempts: max_attempts,
        })
    }
}

/// Why a raw answer could not become a `Record`.
#[derive(Debug, PartialEq)]
enum DecodeProblem {
    NotAnObject,
    MissingKeys(Vec<String>),
}

impl DecodeProblem {
    fn feedback(&self, format: &str) -> String {
        match self {
            DecodeProblem::NotAnObject => format!(
                "Your answer could not be parsed as a JSON object. \
                Answer with a single JSON object in the following format: {format}"
            ),
            DecodeProblem::MissingKeys(keys) => format!(
                "Your JSON answer is missing the following keys: {}. \
                Please verify that your answer is in the following format: {format}",
                keys.join(", ")
            ),
        }
    }
}

fn decode_record(answer: &str, schema_keys: &[&str]) -> Result<Record, DecodeProblem> {
    let record = match serde_json::from_str::<Value>(strip_json_fences(answer)) {
        Ok(Value::Object(record)) => record,
        _ => return Err(DecodeProblem::NotAnObject),
    };

    let missing: Vec<String> = schema_keys
        .iter()
        .filter(|key| !record.contains_key(**key))
        .map(|key| key.to_string())
        .collect();

    if missing.is_empty() {
        Ok(record)
    } else {
        Err(DecodeProblem::MissingKeys(missing))
    }
}
