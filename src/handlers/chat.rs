use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog;
use crate::error::AppError;
use crate::handlers::media::{prepare_image, render_product};
use crate::handlers::{non_blank, AppJson};
use crate::prompts::{
    stylist_prompt, user_request_part, ProfileContext, DEFAULT_IMAGE_MESSAGE,
    EMPTY_REQUEST_ERROR, MODEL_FALLBACK_TEXT,
};
use crate::state::AppState;
use crate::utils::timing::start_request_timer;

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub body_type: Option<String>,
    /// Base64 photo, optionally as a data URI.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub response: String,
    pub image_url: Option<String>,
}

pub async fn chat(
    State(state): State<AppState>,
    AppJson(request): AppJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let mut timer = start_request_timer("POST /chat", request.user_id);
    let result = handle_chat(&state, request).await;
    timer.record_result(&result);
    result.map(Json)
}

async fn handle_chat(state: &AppState, request: ChatRequest) -> Result<ChatResponse, AppError> {
    let message = non_blank(request.message.as_deref());
    let encoded_image = non_blank(request.image.as_deref());

    let message = match (message, &encoded_image) {
        (Some(message), _) => message,
        (None, Some(_)) => DEFAULT_IMAGE_MESSAGE.to_string(),
        (None, None) => return Err(AppError::BadRequest(EMPTY_REQUEST_ERROR.to_string())),
    };

    let image = match encoded_image.as_deref() {
        Some(encoded) => Some(prepare_image(state, encoded).await?),
        None => None,
    };

    let (user, wardrobe) = match request.user_id {
        Some(user_id) => {
            let user = state
                .db
                .get_user(user_id)
                .await
                .map_err(AppError::Database)?
                .ok_or_else(|| AppError::user_not_found(user_id))?;
            let wardrobe = state
                .db
                .list_wardrobe_items(user_id)
                .await
                .map_err(AppError::Database)?;
            (Some(user), wardrobe)
        }
        None => (None, Vec::new()),
    };

    let body_type = non_blank(request.body_type.as_deref())
        .or_else(|| user.as_ref().map(|user| user.body_type.clone()))
        .unwrap_or_else(|| state.settings.default_body_type.clone());

    let profile = user.as_ref().map(|user| ProfileContext {
        user,
        wardrobe: &wardrobe,
    });
    let parts = vec![
        stylist_prompt(&body_type, catalog::all(), profile.as_ref()),
        user_request_part(&message),
    ];

    let response_text = match state.advice.generate(&parts, image.as_ref()).await {
        Ok(text) => text,
        Err(err) => {
            warn!("Error getting {} response: {err:#}", state.advice.name());
            MODEL_FALLBACK_TEXT.to_string()
        }
    };

    let image_url = match catalog::find_mentioned(&response_text) {
        Some(product) => render_product(state, product.visual_description()).await,
        None => {
            info!("No product id found in model response, skipping image generation.");
            None
        }
    };

    Ok(ChatResponse {
        response: response_text,
        image_url,
    })
}
