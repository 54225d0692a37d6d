//! Asset collaborators: image generation, speech synthesis, and translation.
//!
//! Each collaborator is a black box behind an async trait so the story engine
//! can be driven by fakes in tests. Text generation lives in `llm_client`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub mod openai;
pub mod translation;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Text generation failed: {0}")]
    Generation(String),
}

/// Produces an image from a prompt and returns a reference to the stored asset.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str, out_dir: &Path) -> Result<String, ProviderError>;
}

/// Produces audio for a text and returns a reference to the stored asset.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, out_dir: &Path) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError>;
}

/// A language a story can be translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

/// Languages offered to callers. `EN` is the language stories are written in.
pub const AVAILABLE_LANGUAGES: &[Language] = &[
    Language {
        code: "EN",
        name: "English",
    },
    Language {
        code: "FR",
        name: "French",
    },
];

pub fn is_supported_language(code: &str) -> bool {
    AVAILABLE_LANGUAGES
        .iter()
        .any(|lang| lang.code.eq_ignore_ascii_case(code))
}

pub fn language_name(code: &str) -> Option<&'static str> {
    AVAILABLE_LANGUAGES
        .iter()
        .find(|lang| lang.code.eq_ignore_ascii_case(code))
        .map(|lang| lang.name)
}

/// Writes `bytes` to a fresh uniquely-named file in `out_dir` and returns its path.
pub(crate) async fn write_asset(
    out_dir: &Path,
    extension: &str,
    bytes: &[u8],
) -> Result<String, ProviderError> {
    tokio::fs::create_dir_all(out_dir).await?;
    let path: PathBuf = out_dir.join(format!("{}.{extension}", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, bytes).await?;
    Ok(path.to_string_lossy().into_owned())
}
