// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remote vision-language recognition over HTTP.
//
// The region is sent as a base64 PNG together with a prompt asking for a JSON
// array of `{text, box: [left, top, right, bottom], confidence}` objects in
// region pixels. Replies are parsed leniently: code fences and any prose
// around the array are ignored.

use async_trait::async_trait;
use base64::Engine;
use examcut_core::config::{DetectionConfig, RemoteProvider};
use examcut_core::error::{ExamcutError, Result};
use examcut_core::traits::CredentialProvider;
use image::DynamicImage;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::backend::{RawLine, RecognitionBackend};
use crate::image::processor::ImageProcessor;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Confidence assumed when the model omits one.
const DEFAULT_REMOTE_CONFIDENCE: f32 = 0.85;

const PROMPT: &str = "You are an OCR engine for scanned exam pages. Read every line of text in \
this image from top to bottom. Reply with only a JSON array; each element must be \
{\"text\": string, \"box\": [left, top, right, bottom], \"confidence\": number between 0 and 1}, \
with box coordinates in pixels of this image. Keep question numbers and option labels \
such as \"A)\" exactly as printed.";

/// Recognition through a hosted vision-language model.
pub struct RemoteVisionBackend {
    provider: RemoteProvider,
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl RemoteVisionBackend {
    pub fn new(provider: RemoteProvider, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = match provider {
            RemoteProvider::OpenAi => OPENAI_BASE_URL,
            RemoteProvider::Gemini => GEMINI_BASE_URL,
        };
        Self {
            provider,
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.to_owned(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from configuration, resolving the API key through `credentials`.
    pub fn from_config(
        config: &DetectionConfig,
        provider: RemoteProvider,
        credentials: &dyn CredentialProvider,
    ) -> Result<Self> {
        let api_key = credentials
            .credential(provider)
            .ok_or_else(|| ExamcutError::MissingCredential {
                provider: provider.name().to_owned(),
                env_var: provider.credential_env_var().to_owned(),
            })?;
        Ok(Self::new(provider, config.remote_model_for(provider), api_key))
    }

    /// Point at a different endpoint (self-hosted gateways, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn ask_openai(&self, image_b64: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": PROMPT },
                    { "type": "image_url", "image_url": { "url": format!("data:image/png;base64,{image_b64}") } }
                ]
            }]
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExamcutError::Recognition(format!("openai request failed: {}", e)))?;
        let body = read_json(response, "openai").await?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ExamcutError::Recognition("openai reply has no message content".into()))
    }

    async fn ask_gemini(&self, image_b64: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let request = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": PROMPT },
                    { "inline_data": { "mime_type": "image/png", "data": image_b64 } }
                ]
            }],
            "generationConfig": { "temperature": 0 }
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| ExamcutError::Recognition(format!("gemini request failed: {}", e)))?;
        let body = read_json(response, "gemini").await?;

        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ExamcutError::Recognition("gemini reply has no text part".into()))
    }
}

#[async_trait]
impl RecognitionBackend for RemoteVisionBackend {
    fn name(&self) -> &str {
        self.provider.name()
    }

    #[instrument(skip_all, fields(provider = self.provider.name(), model = %self.model, column = column_index))]
    async fn recognize(&self, region: &DynamicImage, column_index: u32) -> Result<Vec<RawLine>> {
        let png = ImageProcessor::from_dynamic(region.clone()).to_png_bytes()?;
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(png);

        let reply = match self.provider {
            RemoteProvider::OpenAi => self.ask_openai(&image_b64).await?,
            RemoteProvider::Gemini => self.ask_gemini(&image_b64).await?,
        };
        let lines = parse_line_json(&reply)?;
        debug!(lines = lines.len(), "Remote recognition complete");
        Ok(lines)
    }
}

async fn read_json(response: reqwest::Response, provider: &str) -> Result<serde_json::Value> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ExamcutError::Recognition(format!(
            "{provider} returned {status}: {body}"
        )));
    }
    response
        .json()
        .await
        .map_err(|e| ExamcutError::Recognition(format!("{provider} reply is not JSON: {}", e)))
}

#[derive(Debug, Deserialize)]
struct RemoteLine {
    text: String,
    #[serde(rename = "box")]
    bbox: [f64; 4],
    #[serde(default)]
    confidence: Option<f32>,
}

/// Parse a model reply into raw lines.
///
/// Accepts the array bare, inside a code fence, or surrounded by prose.
/// Entries whose box has no area are dropped.
pub fn parse_line_json(reply: &str) -> Result<Vec<RawLine>> {
    let start = reply.find('[');
    let end = reply.rfind(']');
    let slice = match (start, end) {
        (Some(s), Some(e)) if e > s => &reply[s..=e],
        _ => {
            return Err(ExamcutError::Recognition(
                "remote reply contains no JSON array".into(),
            ));
        }
    };

    let entries: Vec<RemoteLine> = serde_json::from_str(slice)
        .map_err(|e| ExamcutError::Recognition(format!("remote reply is malformed: {}", e)))?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let [l, t, r, b] = entry.bbox.map(|v| v.round() as i32);
            if r <= l || b <= t {
                return None;
            }
            let confidence = entry
                .confidence
                .unwrap_or(DEFAULT_REMOTE_CONFIDENCE)
                .clamp(0.0, 1.0);
            Some(RawLine::new(entry.text, (l, t, r, b), confidence))
        })
        .collect())
}
