//! Scripted collaborators for tests.
//!
//! Each fake records what it was asked so tests can assert on prompts and call
//! order without any network access.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::batch::BatchConfig;
use crate::llm_client::{ChatMessage, LlmError, TextGenerator};
use crate::providers::{ImageGenerator, ProviderError, SpeechSynthesizer, Translator};
use crate::state::AppState;
use crate::story::engine::{Collaborators, EngineConfig, StoryEngine};
use crate::story::session::SessionRegistry;
use crate::story::store::StoryStore;
use crate::usage::UsageTracker;

/// Replies with queued answers in order; fails once the queue is empty.
#[derive(Default)]
pub struct ScriptedTextGenerator {
    replies: Mutex<VecDeque<Result<String, u16>>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedTextGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::default(),
        }
    }

    /// A generator whose every call fails with a server error.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Queues a transport failure after the already queued replies.
    pub fn then_fail(self) -> Self {
        self.replies.lock().unwrap().push_back(Err(500));
        self
    }

    /// Queues more replies.
    pub fn push<S: Into<String>>(&self, reply: S) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedTextGenerator {
    async fn generate(&self, history: &[ChatMessage], _temperature: f32) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(history.to_vec());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(status)) => Err(LlmError::Api {
                status,
                message: "scripted failure".into(),
            }),
            None => Err(LlmError::Api {
                status: 503,
                message: "no scripted reply left".into(),
            }),
        }
    }
}

/// Returns `image-<n>.png` references without touching the disk.
#[derive(Default)]
pub struct FakeImageGenerator {
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl FakeImageGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for FakeImageGenerator {
    async fn generate_image(&self, prompt: &str, out_dir: &Path) -> Result<String, ProviderError> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());
        if self.fail {
            return Err(ProviderError::Api {
                status: 400,
                message: "content policy".into(),
            });
        }
        Ok(out_dir
            .join(format!("image-{}.png", prompts.len()))
            .to_string_lossy()
            .into_owned())
    }
}

/// Returns `speech-<n>.mp3` references; fails for texts containing `fail_on`.
#[derive(Default)]
pub struct FakeSpeechSynthesizer {
    fail_on: Option<String>,
    texts: Mutex<Vec<String>>,
}

impl FakeSpeechSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
            ..Self::default()
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeechSynthesizer {
    async fn synthesize(&self, text: &str, out_dir: &Path) -> Result<String, ProviderError> {
        let mut texts = self.texts.lock().unwrap();
        texts.push(text.to_string());
        if self.fail_on.as_deref().is_some_and(|needle| text.contains(needle)) {
            return Err(ProviderError::Api {
                status: 500,
                message: "tts unavailable".into(),
            });
        }
        Ok(out_dir
            .join(format!("speech-{}.mp3", texts.len()))
            .to_string_lossy()
            .into_owned())
    }
}

/// Prefixes the text with `[<lang>] `; fails for texts containing `fail_on`.
#[derive(Default)]
pub struct FakeTranslator {
    fail_on: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.fail_on.as_deref().is_some_and(|needle| text.contains(needle)) {
            return Err(ProviderError::Api {
                status: 456,
                message: "quota exceeded".into(),
            });
        }
        Ok(format!("[{target_lang}] {text}"))
    }
}

/// Application state over scripted text and fake media collaborators.
pub fn app_state(text: ScriptedTextGenerator, data_dir: &Path) -> AppState {
    let engine = StoryEngine::new(
        Collaborators {
            text: Arc::new(text),
            images: Arc::new(FakeImageGenerator::new()),
            speech: Arc::new(FakeSpeechSynthesizer::new()),
            translator: Arc::new(FakeTranslator::new()),
        },
        StoryStore::new(data_dir),
        EngineConfig {
            batch: BatchConfig {
                max_concurrent: 2,
                inter_batch_delay: Duration::ZERO,
            },
            ..EngineConfig::default()
        },
    );
    AppState {
        engine: Arc::new(engine),
        sessions: Arc::new(SessionRegistry::new()),
        usage: Arc::new(UsageTracker::new()),
    }
}
