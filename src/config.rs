use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use tracing::warn;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const DEFAULT_REPLICATE_SDXL_VERSION: &str =
    "39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProvider {
    Replicate,
    Gemini,
}

impl ImageProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageProvider::Replicate => "replicate",
            ImageProvider::Gemini => "gemini",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub sqlx_log_level: String,
    pub http_log_level: String,
    pub log_dir: PathBuf,
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub gemini_api_base: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_image_model: String,
    pub gemini_temperature: f32,
    pub gemini_top_k: i32,
    pub gemini_top_p: f32,
    pub gemini_max_output_tokens: i32,
    pub gemini_safety_settings: String,
    pub image_provider: ImageProvider,
    pub replicate_api_token: String,
    pub replicate_api_base: String,
    pub replicate_model_version: String,
    pub replicate_poll_timeout_seconds: u64,
    pub image_width: u32,
    pub image_height: u32,
    pub image_inference_steps: u32,
    pub image_guidance_scale: f32,
    pub upload_max_bytes: usize,
    pub upload_max_dimension: u32,
    pub default_body_type: String,
    pub static_dir: PathBuf,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn trim_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

pub(crate) fn normalize_database_url(value: String) -> String {
    if value.starts_with("sqlite+aiosqlite://") {
        return value.replacen("sqlite+aiosqlite://", "sqlite://", 1);
    }
    value
}

pub(crate) fn normalize_gemini_safety_settings(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "standard".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            "standard".to_string()
        }
    }
}

pub(crate) fn parse_image_provider(value: &str) -> ImageProvider {
    match value.trim().to_lowercase().as_str() {
        "gemini" => ImageProvider::Gemini,
        "replicate" | "" => ImageProvider::Replicate,
        other => {
            warn!("Unknown IMAGE_PROVIDER value '{}'; using replicate.", other);
            ImageProvider::Replicate
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let bind_raw = env_string("BIND_ADDRESS", "127.0.0.1:5000");
        let bind_address = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|err| anyhow!("Invalid BIND_ADDRESS '{bind_raw}': {err}"))?;

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            sqlx_log_level: env_string("SQLX_LOG_LEVEL", "warn").to_lowercase(),
            http_log_level: env_string("HTTP_LOG_LEVEL", "warn").to_lowercase(),
            log_dir: PathBuf::from(env_string("LOG_DIR", "logs")),
            bind_address,
            database_url: normalize_database_url(env_string(
                "DATABASE_URL",
                "sqlite://style_synth.db",
            )),
            gemini_api_base: trim_base_url(&env_string(
                "GEMINI_API_BASE",
                DEFAULT_GEMINI_API_BASE,
            )),
            gemini_api_key: env_string("GEMINI_API_KEY", ""),
            gemini_model: env_string("GEMINI_MODEL", "gemini-1.5-flash"),
            gemini_image_model: env_string(
                "GEMINI_IMAGE_MODEL",
                "gemini-2.0-flash-preview-image-generation",
            ),
            gemini_temperature: env_f32("GEMINI_TEMPERATURE", 0.7),
            gemini_top_k: env_i32("GEMINI_TOP_K", 40),
            gemini_top_p: env_f32("GEMINI_TOP_P", 0.95),
            gemini_max_output_tokens: env_i32("GEMINI_MAX_OUTPUT_TOKENS", 2048),
            gemini_safety_settings: normalize_gemini_safety_settings(&env_string(
                "GEMINI_SAFETY_SETTINGS",
                "standard",
            )),
            image_provider: parse_image_provider(&env_string("IMAGE_PROVIDER", "replicate")),
            replicate_api_token: env_string("REPLICATE_API_TOKEN", ""),
            replicate_api_base: trim_base_url(&env_string(
                "REPLICATE_API_BASE",
                "https://api.replicate.com/v1",
            )),
            replicate_model_version: env_string(
                "REPLICATE_MODEL_VERSION",
                DEFAULT_REPLICATE_SDXL_VERSION,
            ),
            replicate_poll_timeout_seconds: env_u64("REPLICATE_POLL_TIMEOUT_SECONDS", 120),
            image_width: env_u32("IMAGE_WIDTH", 1024),
            image_height: env_u32("IMAGE_HEIGHT", 1024),
            image_inference_steps: env_u32("IMAGE_INFERENCE_STEPS", 40),
            image_guidance_scale: env_f32("IMAGE_GUIDANCE_SCALE", 8.0),
            upload_max_bytes: env_usize("UPLOAD_MAX_BYTES", 10 * 1024 * 1024),
            upload_max_dimension: env_u32("UPLOAD_MAX_DIMENSION", 1536),
            default_body_type: env_string("DEFAULT_BODY_TYPE", "стандартный"),
            static_dir: PathBuf::from(env_string("STATIC_DIR", "static")),
        })
    }

    /// Keys the service cannot start without.
    pub fn missing_required_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.gemini_api_key.trim().is_empty() {
            missing.push("GEMINI_API_KEY");
        }
        if self.image_provider == ImageProvider::Replicate
            && self.replicate_api_token.trim().is_empty()
        {
            missing.push("REPLICATE_API_TOKEN");
        }
        missing
    }
}
