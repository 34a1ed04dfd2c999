pub mod gemini;
pub mod media;
pub mod replicate;

use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};

use crate::llm::media::MediaFile;

pub use gemini::{GeminiClient, GeminiImageClient};
pub use replicate::ReplicateClient;

#[derive(Debug, thiserror::Error)]
#[error("Image generation failed: {0}")]
pub struct ImageGenerationError(pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime_type = media::detect_mime_type(&bytes)
            .filter(|mime| mime.starts_with("image/"))
            .unwrap_or_else(|| "image/png".to_string());
        Self { bytes, mime_type }
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Hosted text/vision model that answers styling questions.
#[async_trait]
pub trait AdviceModel: Send + Sync {
    fn name(&self) -> &str;

    /// `parts` are sent in order after the optional image.
    async fn generate(&self, parts: &[String], image: Option<&MediaFile>) -> Result<String>;
}

/// Hosted diffusion model that renders product pictures.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageGenerationError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_uses_detected_mime() {
        let png = media::png_fixture(1, 1);
        let image = GeneratedImage::from_bytes(png.clone());
        assert_eq!(image.mime_type, "image/png");
        let uri = image.to_data_uri();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(
            general_purpose::STANDARD
                .decode(uri.trim_start_matches("data:image/png;base64,"))
                .unwrap(),
            png
        );
    }

    #[test]
    fn unknown_bytes_default_to_png() {
        let image = GeneratedImage::from_bytes(vec![1, 2, 3]);
        assert_eq!(image.mime_type, "image/png");
    }
}
