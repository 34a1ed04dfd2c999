use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::db::models::{UserInsert, UserRow, UserUpdate};
use crate::error::AppError;
use crate::handlers::{non_blank, AppJson};
use crate::state::AppState;
use crate::utils::timing::start_request_timer;

const MAX_USERNAME_CHARS: usize = 64;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub body_type: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub body_type: Option<String>,
    /// Absent keeps the stored gender; `null` or a blank string clears it.
    #[serde(default, deserialize_with = "present")]
    pub gender: Option<Option<String>>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn validate_username(raw: Option<&str>) -> Result<String, AppError> {
    let username = non_blank(raw)
        .ok_or_else(|| AppError::BadRequest("Необходимо указать имя пользователя.".to_string()))?;
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(AppError::BadRequest(format!(
            "Имя пользователя не может быть длиннее {MAX_USERNAME_CHARS} символов."
        )));
    }
    Ok(username)
}

pub async fn create_user(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserRow>), AppError> {
    let mut timer = start_request_timer("POST /users", None);
    let result = insert_user(&state, request).await;
    timer.record_result(&result);
    result.map(|user| (StatusCode::CREATED, Json(user)))
}

async fn insert_user(state: &AppState, request: CreateUserRequest) -> Result<UserRow, AppError> {
    let username = validate_username(request.username.as_deref())?;
    let insert = UserInsert {
        username,
        body_type: non_blank(request.body_type.as_deref())
            .unwrap_or_else(|| state.settings.default_body_type.clone()),
        gender: non_blank(request.gender.as_deref()),
    };
    let user = state.db.create_user(&insert).await?;
    info!("Created user {} ({})", user.id, user.username);
    Ok(user)
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserRow>, AppError> {
    let mut timer = start_request_timer("GET /users/:id", Some(user_id));
    let result = state
        .db
        .get_user(user_id)
        .await
        .map_err(AppError::Database)
        .and_then(|user| user.ok_or_else(|| AppError::user_not_found(user_id)));
    timer.record_result(&result);
    result.map(Json)
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    AppJson(request): AppJson<UpdateUserRequest>,
) -> Result<Json<UserRow>, AppError> {
    let mut timer = start_request_timer("PATCH /users/:id", Some(user_id));
    let result = apply_update(&state, user_id, request).await;
    timer.record_result(&result);
    result.map(Json)
}

async fn apply_update(
    state: &AppState,
    user_id: i64,
    request: UpdateUserRequest,
) -> Result<UserRow, AppError> {
    let update = UserUpdate {
        body_type: non_blank(request.body_type.as_deref()),
        gender: request.gender.map(|gender| non_blank(gender.as_deref())),
    };
    if update.is_empty() {
        return Err(AppError::BadRequest(
            "Нужно указать body_type или gender.".to_string(),
        ));
    }
    state
        .db
        .update_user(user_id, &update)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::user_not_found(user_id))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let mut timer = start_request_timer("DELETE /users/:id", Some(user_id));
    let result = match state.db.delete_user(user_id).await {
        Ok(true) => {
            info!("Deleted user {user_id}");
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(AppError::user_not_found(user_id)),
        Err(err) => Err(AppError::Database(err)),
    };
    timer.record_result(&result);
    result
}
