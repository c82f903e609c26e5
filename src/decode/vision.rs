//! Vision-model fallback.
//!
//! Sends the frame to a messages-style multimodal endpoint and asks for a
//! small JSON verdict. Transport errors are faults (the chain logs and skips
//! them); a reply that can't be understood is simply "no symbol".

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::capture::CapturedImage;
use crate::settings::VisionSettings;

use super::{Confidence, DecodeAttemptResult, DecodeStrategy, StrategyKind};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const API_VERSION: &str = "2023-06-01";

const PROMPT: &str = "Read the product barcode in this photo. \
Reply with JSON only, no markdown: {\"barcode\": \"<digits>\" or null, \
\"confidence\": \"HIGH\" | \"MEDIUM\" | \"LOW\"}. \
Use null when no barcode is legible. Never guess digits you cannot see.";

#[derive(Clone)]
pub struct VisionStrategy {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl VisionStrategy {
    pub fn new(api_key: String, settings: &VisionSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: settings.endpoint.clone(),
            api_key,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
        }
    }

    /// Reads the API key from the environment variable named in `settings`.
    pub fn from_settings(settings: &VisionSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .map_err(|_| anyhow!("{} environment variable not set", settings.api_key_env))?;
        Ok(Self::new(api_key, settings))
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    async fn call_api(&self, image: &CapturedImage) -> Result<String> {
        let body = request_body(&self.model, self.max_tokens, image.mime_type(), image.bytes());

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("vision request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("vision API error {}: {}", status, body));
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            content: Vec<ContentBlock>,
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .context("vision response was not valid JSON")?;
        Ok(api_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl DecodeStrategy for VisionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::VisionModel
    }

    async fn attempt(&self, image: &CapturedImage) -> Result<DecodeAttemptResult> {
        let reply = self.call_api(image).await?;
        log_debug!("vision reply for {}: {}", image.fingerprint().short(), reply);

        Ok(match parse_reply(&reply) {
            (Some(value), confidence) => DecodeAttemptResult::symbol(value, confidence),
            (None, _) => DecodeAttemptResult::NoSymbolFound,
        })
    }
}

pub fn request_body(model: &str, max_tokens: u32, mime_type: &str, bytes: &[u8]) -> Value {
    json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": [{
            "role": "user",
            "content": [
                {
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": mime_type,
                        "data": STANDARD.encode(bytes),
                    }
                },
                { "type": "text", "text": PROMPT }
            ]
        }]
    })
}

#[derive(Deserialize)]
struct VisionReply {
    #[serde(default)]
    barcode: Value,
    #[serde(default)]
    confidence: Option<String>,
}

/// Interpret the model's text. Anything unreadable is `(None, LOW)`.
pub fn parse_reply(text: &str) -> (Option<String>, Confidence) {
    let Some(reply) = extract_json(text) else {
        log_warn!("unparseable vision reply: {}", text.trim());
        return (None, Confidence::Low);
    };

    let barcode = match reply.barcode {
        Value::String(value) => Some(value.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
    .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("null"));

    let confidence = reply
        .confidence
        .and_then(|label| label.parse().ok())
        .unwrap_or(Confidence::Low);

    (barcode, confidence)
}

fn extract_json(text: &str) -> Option<VisionReply> {
    let stripped = strip_fences(text);
    if let Ok(reply) = serde_json::from_str(stripped) {
        return Some(reply);
    }

    // tolerate prose around the object
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&stripped[start..=end]).ok()
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (e.g. "json") on the opening fence line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
