//! OpenAI media client: image generation (with download) and text-to-speech.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::providers::{write_asset, ImageGenerator, ProviderError, SpeechSynthesizer};
use crate::usage::UsageTracker;

const OPENAI_IMAGES_URL: &str = "https://api.openai.com/v1/images/generations";
const OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";

const IMAGE_MODEL: &str = "dall-e-3";
const IMAGE_SIZE: &str = "1024x1024";
const IMAGE_STYLE: &str = "vivid";
const SPEECH_MODEL: &str = "tts-1";
const SPEECH_VOICE: &str = "alloy";

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    style: &'a str,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// Client for the OpenAI image and speech endpoints.
#[derive(Clone)]
pub struct OpenAiMediaClient {
    client: Client,
    api_key: String,
    usage: Arc<UsageTracker>,
}

impl OpenAiMediaClient {
    pub fn new(api_key: String, usage: Arc<UsageTracker>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(180)).build()?,
            api_key,
            usage,
        })
    }

    /// Download a generated asset by URL.
    async fn download(&self, url: &str) -> Result<Bytes, ProviderError> {
        let response = check_status(self.client.get(url).send().await?).await?;
        Ok(response.bytes().await?)
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ImageGenerator for OpenAiMediaClient {
    async fn generate_image(&self, prompt: &str, out_dir: &Path) -> Result<String, ProviderError> {
        let request = ImageRequest {
            model: IMAGE_MODEL,
            prompt,
            size: IMAGE_SIZE,
            style: IMAGE_STYLE,
            n: 1,
        };

        let response = self
            .client
            .post(OPENAI_IMAGES_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let body: ImageResponse = check_status(response).await?.json().await?;

        let url = body
            .data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or_else(|| ProviderError::InvalidResponse("image response has no URL".into()))?;

        self.usage.add_image();
        debug!(%url, "Image generated, downloading");

        let bytes = self.download(&url).await?;
        let path = write_asset(out_dir, "png", &bytes).await?;
        info!(%path, "Image saved");
        Ok(path)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiMediaClient {
    async fn synthesize(&self, text: &str, out_dir: &Path) -> Result<String, ProviderError> {
        let request = SpeechRequest {
            model: SPEECH_MODEL,
            voice: SPEECH_VOICE,
            input: text,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(OPENAI_SPEECH_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let bytes = check_status(response).await?.bytes().await?;

        self.usage.add_speech_chars(text.chars().count() as u64);

        let path = write_asset(out_dir, "mp3", &bytes).await?;
        debug!(%path, chars = text.len(), "Speech saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_request_uses_vivid_style() {
        let request = ImageRequest {
            model: IMAGE_MODEL,
            prompt: "a lighthouse at dusk",
            size: IMAGE_SIZE,
            style: IMAGE_STYLE,
            n: 1,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["style"], "vivid");
        assert_eq!(json["prompt"], "a lighthouse at dusk");
    }

    #[test]
    fn test_image_response_without_url_parses() {
        let body: ImageResponse =
            serde_json::from_str(r#"{"created": 1, "data": [{"b64_json": "abc"}]}"#).unwrap();
        assert!(body.data[0].url.is_none());
    }
}
