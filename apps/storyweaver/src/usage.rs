//! Usage accounting: pass-through counters for every external collaborator call.
//!
//! Three independent counters, each behind its own lock, so batch workers that
//! synthesize speech never contend with workers that generate images.

use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;

/// Price per prompt token (USD).
const PRICE_PER_INPUT_TOKEN: f64 = 0.000_000_15;
/// Price per completion token (USD).
const PRICE_PER_OUTPUT_TOKEN: f64 = 0.000_000_6;
/// Price per synthesized speech character (USD).
const PRICE_PER_SPEECH_CHAR: f64 = 0.000_015;
/// Price per generated image (USD).
const PRICE_PER_IMAGE: f64 = 0.04;

#[derive(Debug, Default, Clone, Copy)]
struct TokenUsage {
    input: u64,
    output: u64,
}

/// Shared accounting service. Inject one `Arc<UsageTracker>` into every provider.
#[derive(Debug, Default)]
pub struct UsageTracker {
    tokens: Mutex<TokenUsage>,
    speech_chars: Mutex<u64>,
    images: Mutex<u64>,
}

/// Snapshot of all counters plus the derived cost estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub speech_characters: u64,
    pub images: u64,
    pub estimated_cost: f64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tokens(&self, input: u64, output: u64) {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.input += input;
        tokens.output += output;
        debug!(input, output, total_input = tokens.input, "Token usage recorded");
    }

    pub fn add_speech_chars(&self, chars: u64) {
        let mut speech = self.speech_chars.lock().unwrap_or_else(|e| e.into_inner());
        *speech += chars;
    }

    pub fn add_image(&self) {
        let mut images = self.images.lock().unwrap_or_else(|e| e.into_inner());
        *images += 1;
    }

    pub fn report(&self) -> UsageReport {
        let tokens = *self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        let speech_characters = *self.speech_chars.lock().unwrap_or_else(|e| e.into_inner());
        let images = *self.images.lock().unwrap_or_else(|e| e.into_inner());

        let estimated_cost = tokens.input as f64 * PRICE_PER_INPUT_TOKEN
            + tokens.output as f64 * PRICE_PER_OUTPUT_TOKEN
            + speech_characters as f64 * PRICE_PER_SPEECH_CHAR
            + images as f64 * PRICE_PER_IMAGE;

        UsageReport {
            input_tokens: tokens.input,
            output_tokens: tokens.output,
            speech_characters,
            images,
            estimated_cost,
        }
    }
}
