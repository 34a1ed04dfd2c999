use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::error::AppError;
use crate::handlers::{non_blank, AppJson};
use crate::prompts::product_image_prompt;
use crate::state::AppState;
use crate::utils::timing::start_request_timer;

#[derive(Debug, Deserialize)]
pub struct VisualizeRequest {
    pub product_id: String,
    /// Occasion key such as `office`; the casual look when absent.
    #[serde(default)]
    pub style: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VisualizeResponse {
    pub product_id: &'static str,
    pub prompt: String,
    pub image_url: String,
}

pub async fn visualize(
    State(state): State<AppState>,
    AppJson(request): AppJson<VisualizeRequest>,
) -> Result<Json<VisualizeResponse>, AppError> {
    let mut timer = start_request_timer("POST /visualize", None);
    let result = handle_visualize(&state, request).await;
    timer.record_result(&result);
    result.map(Json)
}

async fn handle_visualize(
    state: &AppState,
    request: VisualizeRequest,
) -> Result<VisualizeResponse, AppError> {
    let product = catalog::get(&request.product_id).ok_or_else(|| {
        AppError::NotFound(format!("Товар {} не найден.", request.product_id.trim()))
    })?;

    let description = match non_blank(request.style.as_deref()) {
        Some(style) => product.style(&style).ok_or_else(|| {
            AppError::BadRequest(format!(
                "У товара {} нет варианта '{style}'.",
                product.id
            ))
        })?,
        None => product.visual_description(),
    };

    let prompt = product_image_prompt(description);
    let image = state
        .images
        .generate(&prompt)
        .await
        .map_err(|err| AppError::BadGateway(err.to_string()))?;

    Ok(VisualizeResponse {
        product_id: product.id,
        prompt,
        image_url: image.to_data_uri(),
    })
}
