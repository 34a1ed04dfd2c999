use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::{info, warn};

use crate::analysis::parse_wardrobe_analysis;
use crate::db::models::{WardrobeItemInsert, WardrobeItemRow};
use crate::error::AppError;
use crate::handlers::media::prepare_image;
use crate::handlers::{non_blank, AppJson};
use crate::prompts::wardrobe_analysis_prompt;
use crate::state::AppState;
use crate::utils::timing::start_request_timer;

/// Either the garment fields, a photo to analyse, or both (explicit fields win).
#[derive(Debug, Default, Deserialize)]
pub struct AddWardrobeItemRequest {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

async fn ensure_user(state: &AppState, user_id: i64) -> Result<(), AppError> {
    match state
        .db
        .get_user(user_id)
        .await
        .map_err(AppError::Database)?
    {
        Some(_) => Ok(()),
        None => Err(AppError::user_not_found(user_id)),
    }
}

pub async fn list_items(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<WardrobeItemRow>>, AppError> {
    let mut timer = start_request_timer("GET /users/:id/wardrobe", Some(user_id));
    let result = match ensure_user(&state, user_id).await {
        Ok(()) => state
            .db
            .list_wardrobe_items(user_id)
            .await
            .map_err(AppError::Database),
        Err(err) => Err(err),
    };
    timer.record_result(&result);
    result.map(Json)
}

pub async fn add_item(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    AppJson(request): AppJson<AddWardrobeItemRequest>,
) -> Result<(StatusCode, Json<WardrobeItemRow>), AppError> {
    let mut timer = start_request_timer("POST /users/:id/wardrobe", Some(user_id));
    let result = handle_add_item(&state, user_id, request).await;
    timer.record_result(&result);
    result.map(|item| (StatusCode::CREATED, Json(item)))
}

async fn handle_add_item(
    state: &AppState,
    user_id: i64,
    request: AddWardrobeItemRequest,
) -> Result<WardrobeItemRow, AppError> {
    ensure_user(state, user_id).await?;

    let category = non_blank(request.category.as_deref());
    let color = non_blank(request.color.as_deref());
    let style = non_blank(request.style.as_deref());
    let description = non_blank(request.description.as_deref());

    let item = match non_blank(request.image.as_deref()) {
        Some(encoded) => {
            let analysed = analyse_photo(state, &encoded).await?;
            WardrobeItemInsert {
                category: category.unwrap_or(analysed.category),
                color: color.unwrap_or(analysed.color),
                style: style.unwrap_or(analysed.style),
                description: description.or(analysed.description),
            }
        }
        None => match (category, color, style) {
            (Some(category), Some(color), Some(style)) => WardrobeItemInsert {
                category,
                color,
                style,
                description,
            },
            _ => {
                return Err(AppError::BadRequest(
                    "Укажите category, color и style или загрузите фотографию вещи.".to_string(),
                ))
            }
        },
    };

    let row = state
        .db
        .insert_wardrobe_item(user_id, &item)
        .await
        .map_err(AppError::Database)?;
    info!(
        "Added wardrobe item {} ({}, {}) for user {user_id}",
        row.id, row.category, row.color
    );
    Ok(row)
}

async fn analyse_photo(state: &AppState, encoded: &str) -> Result<WardrobeItemInsert, AppError> {
    let image = prepare_image(state, encoded).await?;
    let parts = vec![wardrobe_analysis_prompt().to_string()];
    let answer = state
        .advice
        .generate(&parts, Some(&image))
        .await
        .map_err(|err| {
            warn!("Wardrobe analysis with {} failed: {err:#}", state.advice.name());
            AppError::BadGateway("Не удалось распознать вещь на фото.".to_string())
        })?;
    parse_wardrobe_analysis(&answer).map_err(|err| {
        warn!("Unusable wardrobe analysis: {err:#}");
        AppError::BadGateway("Не удалось распознать вещь на фото.".to_string())
    })
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    let mut timer = start_request_timer("DELETE /users/:id/wardrobe/:item_id", Some(user_id));
    let result = match state.db.delete_wardrobe_item(user_id, item_id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(AppError::NotFound(format!(
            "Вещь {item_id} не найдена в гардеробе пользователя {user_id}."
        ))),
        Err(err) => Err(AppError::Database(err)),
    };
    timer.record_result(&result);
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};
    use base64::{engine::general_purpose, Engine as _};
    use serde_json::json;

    use crate::db::models::UserInsert;
    use crate::handlers::test_support::{app, send, state_with};
    use crate::llm::media::png_fixture;
    use crate::llm::testing::{StubAdvice, StubImages};
    use crate::prompts::wardrobe_analysis_prompt;
    use crate::state::AppState;

    async fn state_and_user(advice: Arc<StubAdvice>) -> (AppState, i64) {
        let state = state_with(advice, Arc::new(StubImages::failing())).await;
        let user = state
            .db
            .create_user(&UserInsert {
                username: "kira".to_string(),
                body_type: "стандартный".to_string(),
                gender: None,
            })
            .await
            .unwrap();
        (state, user.id)
    }

    fn photo() -> String {
        general_purpose::STANDARD.encode(png_fixture(8, 8))
    }

    #[tokio::test]
    async fn explicit_items_are_listed_and_removed() {
        let (state, user_id) = state_and_user(Arc::new(StubAdvice::answering("unused"))).await;
        let router = app(state);
        let base = format!("/users/{user_id}/wardrobe");

        let (status, created) = send(
            &router,
            Method::POST,
            &base,
            Some(json!({ "category": "рубашка", "color": "белый", "style": "office" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["user_id"], user_id);
        assert!(created["description"].is_null());

        let (status, listed) = send(&router, Method::GET, &base, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["category"], "рубашка");

        let item_id = created["id"].as_i64().unwrap();
        let (status, _) = send(&router, Method::DELETE, &format!("{base}/{item_id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&router, Method::DELETE, &format!("{base}/{item_id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn incomplete_item_without_photo_is_rejected() {
        let (state, user_id) = state_and_user(Arc::new(StubAdvice::answering("unused"))).await;
        let (status, _) = send(
            &app(state),
            Method::POST,
            &format!("/users/{user_id}/wardrobe"),
            Some(json!({ "category": "брюки" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn photo_is_analysed_by_the_model() {
        let advice = Arc::new(StubAdvice::answering(
            "```json\n{\"category\": \"платье\", \"color\": \"красный\", \"style\": \"party\", \"description\": \"коктейльное\"}\n```",
        ));
        let (state, user_id) = state_and_user(advice.clone()).await;

        let (status, created) = send(
            &app(state),
            Method::POST,
            &format!("/users/{user_id}/wardrobe"),
            Some(json!({ "image": photo(), "color": "алый" })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["category"], "платье");
        assert_eq!(created["color"], "алый");
        assert_eq!(created["description"], "коктейльное");

        let calls = advice.calls.lock();
        assert_eq!(calls[0].0, vec![wardrobe_analysis_prompt().to_string()]);
        assert_eq!(calls[0].1.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn unusable_analysis_is_a_gateway_error() {
        let (state, user_id) =
            state_and_user(Arc::new(StubAdvice::answering("Это, кажется, шарф."))).await;
        let (status, _) = send(
            &app(state),
            Method::POST,
            &format!("/users/{user_id}/wardrobe"),
            Some(json!({ "image": photo() })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (state, user_id) = state_and_user(Arc::new(StubAdvice::failing())).await;
        let (status, _) = send(
            &app(state),
            Method::POST,
            &format!("/users/{user_id}/wardrobe"),
            Some(json!({ "image": photo() })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn unknown_user_has_no_wardrobe() {
        let (state, _) = state_and_user(Arc::new(StubAdvice::answering("unused"))).await;
        let (status, _) = send(&app(state), Method::GET, "/users/404/wardrobe", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
