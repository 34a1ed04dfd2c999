use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::MediaFile;
use crate::llm::{AdviceModel, GeneratedImage, ImageGenerationError, ImageGenerator};
use crate::utils::http::{get_http_client, truncate_for_log};
use crate::utils::timing::log_llm_timing;

const GEMINI_MAX_RETRY_ATTEMPTS: usize = 2;
const GEMINI_RETRY_BASE_DELAY_MS: u64 = 900;
const GEMINI_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    #[allow(dead_code)]
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone)]
struct GenerationSettings {
    temperature: f32,
    top_k: i32,
    top_p: f32,
    max_output_tokens: i32,
    safety_profile: String,
}

fn redact_api_key(text: &str, key: &str) -> String {
    let key = key.trim();
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

fn gemini_should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn gemini_should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn gemini_retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(GEMINI_RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "permissive" => "OFF",
        _ => "BLOCK_MEDIUM_AND_ABOVE",
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

fn summarize_gemini_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let summarized_contents = contents
            .iter()
            .map(|content| {
                let role = content
                    .get("role")
                    .and_then(|value| value.as_str())
                    .unwrap_or("user");
                let parts = content
                    .get("parts")
                    .and_then(|value| value.as_array())
                    .map(|parts| summarize_gemini_parts(parts))
                    .unwrap_or_default();
                json!({ "role": role, "parts": parts })
            })
            .collect();
        summary.insert("contents".to_string(), Value::Array(summarized_contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    if let Some(safety) = payload
        .get("safetySettings")
        .and_then(|value| value.as_array())
    {
        summary.insert("safetySettingsCount".to_string(), json!(safety.len()));
    }

    Value::Object(summary)
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

/// Image first, then the text parts; the model reads the photo before the instructions.
fn build_user_parts(parts: &[String], image: Option<&MediaFile>) -> Vec<Value> {
    let mut out = Vec::with_capacity(parts.len() + 1);
    if let Some(file) = image {
        out.push(json!({
            "inlineData": {
                "mimeType": file.mime_type,
                "data": general_purpose::STANDARD.encode(&file.bytes)
            }
        }));
    }
    out.extend(
        parts
            .iter()
            .filter(|text| !text.trim().is_empty())
            .map(|text| json!({ "text": text })),
    );
    out
}

fn candidate_parts(response: GeminiResponse) -> impl Iterator<Item = GeminiPart> {
    response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .filter_map(|content| content.parts)
        .flatten()
}

fn extract_text_from_response(response: GeminiResponse) -> String {
    candidate_parts(response)
        .filter_map(|part| match part {
            GeminiPart::Text { text } if !text.trim().is_empty() => Some(text),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_images_from_response(response: GeminiResponse) -> Vec<Vec<u8>> {
    candidate_parts(response)
        .filter_map(|part| match part {
            GeminiPart::InlineData { inline_data } if inline_data.mime_type.starts_with("image/") => {
                general_purpose::STANDARD.decode(inline_data.data).ok()
            }
            _ => None,
        })
        .collect()
}

async fn call_gemini_api(
    api_base: &str,
    api_key: &str,
    model: &str,
    payload: &Value,
) -> Result<GeminiResponse> {
    let client = get_http_client();
    let url = format!("{api_base}/models/{model}:generateContent");

    if tracing::enabled!(tracing::Level::DEBUG) {
        let payload_summary = summarize_gemini_payload(payload);
        debug!(target: "llm.gemini", model = model, payload = %payload_summary);
    }

    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let response = match client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .timeout(GEMINI_REQUEST_TIMEOUT)
            .json(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err_text = redact_api_key(&err.to_string(), api_key);
                let should_retry =
                    gemini_should_retry_error(&err) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, retrying={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    should_retry
                );
                if should_retry {
                    tokio::time::sleep(gemini_retry_delay(attempt)).await;
                    continue;
                }
                return Err(anyhow!("Gemini request failed: {}", err_text));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = redact_api_key(&response.text().await.unwrap_or_default(), api_key);
            let (message, body_summary) = summarize_error_body(&body);
            let should_retry =
                gemini_should_retry_status(status) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
            warn!(
                "Gemini API error: status={}, body={}, retrying={}",
                status, body_summary, should_retry
            );
            if should_retry {
                tokio::time::sleep(gemini_retry_delay(attempt)).await;
                continue;
            }
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                detail
            ));
        }

        return Ok(response.json::<GeminiResponse>().await?);
    }
}

/// Text and vision answers from a Gemini model.
pub struct GeminiClient {
    api_base: String,
    api_key: String,
    model: String,
    settings: GenerationSettings,
}

impl GeminiClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_base: config.gemini_api_base.clone(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            settings: GenerationSettings {
                temperature: config.gemini_temperature,
                top_k: config.gemini_top_k,
                top_p: config.gemini_top_p,
                max_output_tokens: config.gemini_max_output_tokens,
                safety_profile: config.gemini_safety_settings.clone(),
            },
        }
    }

    fn build_payload(&self, parts: &[String], image: Option<&MediaFile>) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": build_user_parts(parts, image) }],
            "generationConfig": {
                "temperature": self.settings.temperature,
                "topK": self.settings.top_k,
                "topP": self.settings.top_p,
                "maxOutputTokens": self.settings.max_output_tokens,
            },
            "safetySettings": build_safety_settings(&self.settings.safety_profile),
        })
    }
}

#[async_trait]
impl AdviceModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, parts: &[String], image: Option<&MediaFile>) -> Result<String> {
        let payload = self.build_payload(parts, image);
        let metadata = json!({ "with_image": image.is_some(), "parts": parts.len() });

        log_llm_timing("gemini", &self.model, "generate_content", Some(metadata), || async {
            let response =
                call_gemini_api(&self.api_base, &self.api_key, &self.model, &payload).await?;
            let text = extract_text_from_response(response);
            if text.trim().is_empty() {
                return Err(anyhow!("Gemini returned no text (model: {})", self.model));
            }
            Ok::<_, anyhow::Error>(text)
        })
        .await
    }
}

/// Product renders through a Gemini image model.
pub struct GeminiImageClient {
    api_base: String,
    api_key: String,
    model: String,
    safety_profile: String,
}

impl GeminiImageClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_base: config.gemini_api_base.clone(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_image_model.clone(),
            safety_profile: config.gemini_safety_settings.clone(),
        }
    }

    fn build_payload(&self, prompt: &str) -> Value {
        let instruction = format!(
            "Generate an image based on the prompt. CRITICAL: response must be an image, NOT TEXT.\n\n{prompt}"
        );
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": instruction }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
            "safetySettings": build_safety_settings(&self.safety_profile),
        })
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageGenerationError> {
        let payload = self.build_payload(prompt);
        let images = log_llm_timing("gemini", &self.model, "generate_image", None, || async {
            let response =
                call_gemini_api(&self.api_base, &self.api_key, &self.model, &payload).await?;
            Ok::<_, anyhow::Error>(extract_images_from_response(response))
        })
        .await
        .map_err(|err| ImageGenerationError(err.to_string()))?;

        images
            .into_iter()
            .next()
            .map(GeneratedImage::from_bytes)
            .ok_or_else(|| {
                ImageGenerationError(format!("No images returned by Gemini (model: {})", self.model))
            })
    }
}
