//! Translators: DeepL when a key is configured, otherwise the chat model.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm_client::prompts::{fill_placeholders, json_answer, WRITER_PERSONA};
use crate::llm_client::structured::{StructuredClient, StructuredRequest};
use crate::llm_client::ChatMessage;
use crate::providers::{language_name, ProviderError, Translator};

const DEEPL_FREE_URL: &str = "https://api-free.deepl.com/v2/translate";
const DEEPL_PRO_URL: &str = "https://api.deepl.com/v2/translate";
/// Stories are always written in English.
const SOURCE_LANG: &str = "EN";

// ────────────────────────────────────────────────────────────────────────────
// DeepL
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DeeplRequest<'a> {
    text: [&'a str; 1],
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct DeeplResponse {
    translations: Vec<DeeplTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeeplTranslation {
    text: String,
}

#[derive(Clone)]
pub struct DeeplTranslator {
    client: Client,
    api_key: String,
}

impl DeeplTranslator {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            api_key,
        })
    }

    /// Free-plan keys carry a `:fx` suffix and use a separate host.
    fn endpoint(&self) -> &'static str {
        if self.api_key.ends_with(":fx") {
            DEEPL_FREE_URL
        } else {
            DEEPL_PRO_URL
        }
    }
}

#[async_trait]
impl Translator for DeeplTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError> {
        let request = DeeplRequest {
            text: [text],
            source_lang: SOURCE_LANG,
            target_lang,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: DeeplResponse = response.json().await?;
        body.translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| ProviderError::InvalidResponse("no translation returned".into()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Chat-model translator
// ────────────────────────────────────────────────────────────────────────────

const TRANSLATION_FORMAT: &str = r#"{
    "translated_text": "Translated text"
}"#;

const TRANSLATION_PROMPT: &str = "Translate the following text into {language}.

{text}
";

/// Translates through the structured chat client.
#[derive(Clone)]
pub struct LlmTranslator {
    structured: StructuredClient,
    max_attempts: u32,
}

impl LlmTranslator {
    pub fn new(structured: StructuredClient, max_attempts: u32) -> Self {
        Self {
            structured,
            max_attempts,
        }
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError> {
        let language = language_name(target_lang).unwrap_or(target_lang);
        let prompt = format!(
            "{WRITER_PERSONA}{}{}",
            fill_placeholders(TRANSLATION_PROMPT, &[("language", language), ("text", text)]),
            json_answer(TRANSLATION_FORMAT)
        );
        let mut history = vec![ChatMessage::system(prompt)];

        let record = self
            .structured
            .run_record(
                &mut history,
                StructuredRequest {
                    schema_keys: &["translated_text"],
                    format: TRANSLATION_FORMAT,
                    max_attempts: self.max_attempts,
                    temperature: 0.0,
                },
            )
            .await
            .map_err(|e| ProviderError::Generation(e.to_string()))?;

        debug!(target_lang, "Text translated by chat model");
        record["translated_text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::InvalidResponse("translated_text is not a string".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::testing::ScriptedTextGenerator;

    #[test]
    fn test_deepl_free_key_uses_free_host() {
        let free = DeeplTranslator::new("abc:fx".into()).unwrap();
        let pro = DeeplTranslator::new("abc".into()).unwrap();
        assert_eq!(free.endpoint(), DEEPL_FREE_URL);
        assert_eq!(pro.endpoint(), DEEPL_PRO_URL);
    }

    #[test]
    fn test_deepl_request_wraps_text_in_array() {
        let request = DeeplRequest {
            text: ["Hello"],
            source_lang: SOURCE_LANG,
            target_lang: "FR",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["text"][0], "Hello");
        assert_eq!(json["source_lang"], "EN");
    }

    #[tokio::test]
    async fn test_llm_translator_returns_translated_text() {
        let generator = Arc::new(ScriptedTextGenerator::new([
            r#"{"translated_text": "Bonjour"}"#,
        ]));
        let translator = LlmTranslator::new(StructuredClient::new(generator.clone()), 2);

        let text = translator.translate("Hello", "FR").await.unwrap();

        assert_eq!(text, "Bonjour");
        assert!(generator.calls()[0][0].content.contains("French"));
    }

    #[tokio::test]
    async fn test_llm_translator_rejects_non_string_answer() {
        let generator = Arc::new(ScriptedTextGenerator::new([r#"{"translated_text": 3}"#]));
        let translator = LlmTranslator::new(StructuredClient::new(generator), 1);

        let result = translator.translate("Hello", "FR").await;

        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }
}
