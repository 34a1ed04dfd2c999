use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::download_media;
use crate::llm::{GeneratedImage, ImageGenerationError, ImageGenerator};
use crate::prompts::NEGATIVE_PROMPT;
use crate::utils::http::{get_http_client, truncate_for_log};
use crate::utils::timing::log_llm_timing;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const PREDICTION_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, PartialEq)]
struct DiffusionSettings {
    width: u32,
    height: u32,
    num_inference_steps: u32,
    guidance_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PredictionStatus {
    Pending,
    Succeeded,
    Failed,
}

fn prediction_status(prediction: &Value) -> PredictionStatus {
    let status = prediction
        .get("status")
        .and_then(Value::as_str)
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match status.as_str() {
        "succeeded" => PredictionStatus::Succeeded,
        "starting" | "processing" => PredictionStatus::Pending,
        _ => PredictionStatus::Failed,
    }
}

fn poll_url(prediction: &Value) -> Option<&str> {
    prediction
        .pointer("/urls/get")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn prediction_error(prediction: &Value) -> String {
    prediction
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| truncate_for_log(&prediction.to_string(), 500))
}

/// Collects http(s) URLs from the `output` field, which may be a string, list or object.
fn extract_output_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            if trimmed.starts_with("http") && !out.iter().any(|existing| existing == trimmed) {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(rows) => {
            for row in rows {
                extract_output_urls(row, out);
            }
        }
        Value::Object(obj) => {
            if let Some(url) = obj.get("url") {
                extract_output_urls(url, out);
            }
        }
        _ => {}
    }
}

async fn response_json_or_error(label: &str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .get("detail")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| truncate_for_log(body.trim(), 800));
        bail!("{label} failed with status {status}: {detail}");
    }
    serde_json::from_str(&body).map_err(|err| anyhow!("{label} returned invalid JSON: {err}"))
}

/// Text-to-image through the Replicate predictions API.
pub struct ReplicateClient {
    api_base: String,
    api_token: String,
    version: String,
    settings: DiffusionSettings,
    poll_timeout: Duration,
    poll_interval: Duration,
}

impl ReplicateClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_base: config.replicate_api_base.clone(),
            api_token: config.replicate_api_token.clone(),
            version: config.replicate_model_version.clone(),
            settings: DiffusionSettings {
                width: config.image_width,
                height: config.image_height,
                num_inference_steps: config.image_inference_steps,
                guidance_scale: config.image_guidance_scale,
            },
            poll_timeout: Duration::from_secs(config.replicate_poll_timeout_seconds.max(1)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    fn build_request(&self, prompt: &str) -> Value {
        json!({
            "version": self.version,
            "input": {
                "prompt": prompt,
                "negative_prompt": NEGATIVE_PROMPT,
                "width": self.settings.width,
                "height": self.settings.height,
                "num_inference_steps": self.settings.num_inference_steps,
                "guidance_scale": self.settings.guidance_scale,
                "num_outputs": 1,
            }
        })
    }

    async fn wait_for_prediction(&self, mut prediction: Value) -> Result<Value> {
        let started = Instant::now();
        loop {
            match prediction_status(&prediction) {
                PredictionStatus::Succeeded => return Ok(prediction),
                PredictionStatus::Failed => {
                    bail!("Replicate prediction failed: {}", prediction_error(&prediction))
                }
                PredictionStatus::Pending => {}
            }
            if started.elapsed() >= self.poll_timeout {
                bail!(
                    "Replicate polling timed out after {:.1}s",
                    self.poll_timeout.as_secs_f64()
                );
            }

            let url = poll_url(&prediction)
                .ok_or_else(|| anyhow!("Replicate prediction missing poll URL"))?
                .to_string();
            tokio::time::sleep(self.poll_interval).await;
            debug!(target: "llm.replicate", url = %url, "polling prediction");
            let response = get_http_client()
                .get(&url)
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|err| anyhow!("Replicate poll request failed: {err}"))?;
            prediction = response_json_or_error("Replicate poll", response).await?;
        }
    }

    async fn run_prediction(&self, prompt: &str) -> Result<Vec<u8>> {
        let endpoint = format!("{}/predictions", self.api_base);
        let response = get_http_client()
            .post(&endpoint)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .timeout(PREDICTION_REQUEST_TIMEOUT)
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|err| anyhow!("Replicate request failed ({endpoint}): {err}"))?;
        let prediction = response_json_or_error("Replicate", response).await?;
        let prediction = self.wait_for_prediction(prediction).await?;

        let mut urls = Vec::new();
        if let Some(output) = prediction.get("output") {
            extract_output_urls(output, &mut urls);
        }
        let url = urls
            .first()
            .ok_or_else(|| anyhow!("Replicate response returned no image URLs"))?;
        if urls.len() > 1 {
            warn!("Replicate returned {} images; using the first", urls.len());
        }

        download_media(url)
            .await
            .ok_or_else(|| anyhow!("failed downloading Replicate image ({url})"))
    }
}

#[async_trait]
impl ImageGenerator for ReplicateClient {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageGenerationError> {
        let metadata = json!({ "version": truncate_for_log(&self.version, 12) });
        log_llm_timing("replicate", &self.version, "create_prediction", Some(metadata), || {
            self.run_prediction(prompt)
        })
        .await
        .map(GeneratedImage::from_bytes)
        .map_err(|err| ImageGenerationError(err.to_string()))
    }
}
