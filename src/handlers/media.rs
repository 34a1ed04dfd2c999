use anyhow::anyhow;
use tracing::{info, warn};

use crate::error::AppError;
use crate::llm::media::{decode_base64_image, prepare_upload, MediaFile};
use crate::prompts::product_image_prompt;
use crate::state::AppState;

/// Decodes a base64 upload and readies it for the vision model.
pub async fn prepare_image(state: &AppState, encoded: &str) -> Result<MediaFile, AppError> {
    let bytes = decode_base64_image(encoded, state.settings.upload_max_bytes)?;
    let max_dimension = state.settings.upload_max_dimension;
    let file = tokio::task::spawn_blocking(move || prepare_upload(bytes, max_dimension))
        .await
        .map_err(|err| AppError::Internal(anyhow!("image preparation task failed: {err}")))??;
    Ok(file)
}

/// Renders a product picture; failures are logged and yield `None`.
pub async fn render_product(state: &AppState, description: &str) -> Option<String> {
    let prompt = product_image_prompt(description);
    info!(
        "Generating product image with {} using prompt: {}",
        state.images.name(),
        prompt
    );
    match state.images.generate(&prompt).await {
        Ok(image) => {
            info!("Product image generated ({} bytes)", image.bytes.len());
            Some(image.to_data_uri())
        }
        Err(err) => {
            warn!("Failed to generate product image: {err}");
            None
        }
    }
}
