use std::path::PathBuf;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers::{catalog, chat, health, users, visualize, wardrobe};
use crate::state::AppState;

/// Room for the JSON envelope and text fields around a base64 upload.
const BODY_HEADROOM_BYTES: usize = 64 * 1024;

fn body_limit(upload_max_bytes: usize) -> usize {
    upload_max_bytes
        .saturating_mul(4)
        .div_ceil(3)
        .saturating_add(BODY_HEADROOM_BYTES)
}

pub fn build_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let limit = body_limit(state.settings.upload_max_bytes);

    let router = Router::new()
        .route("/health", get(health::health))
        .route("/catalog", get(catalog::list_products))
        .route("/chat", post(chat::chat))
        .route("/visualize", post(visualize::visualize))
        .route("/users", post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/users/:id/wardrobe",
            get(wardrobe::list_items).post(wardrobe::add_item),
        )
        .route("/users/:id/wardrobe/:item_id", delete(wardrobe::delete_item))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(DefaultBodyLimit::max(limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::handlers::test_support::{send, state_with};
    use crate::llm::testing::{StubAdvice, StubImages};

    #[test]
    fn body_limit_covers_base64_overhead() {
        assert_eq!(body_limit(3), 4 + BODY_HEADROOM_BYTES);
        assert!(body_limit(10 * 1024 * 1024) > 10 * 1024 * 1024 * 4 / 3);
    }

    async fn state() -> AppState {
        state_with(
            Arc::new(StubAdvice::answering("unused")),
            Arc::new(StubImages::failing()),
        )
        .await
    }

    #[tokio::test]
    async fn serves_index_from_static_dir() {
        let dir = std::env::temp_dir().join(format!("style-synth-static-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), "<h1>StyleSynth</h1>").unwrap();

        let router = build_router(state().await, Some(dir.clone()));
        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"<h1>StyleSynth</h1>");

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected_as_too_large() {
        let router = build_router(state().await, None);
        let (status, body) = send(
            &router,
            Method::POST,
            "/chat",
            Some(serde_json::json!({ "image": "A".repeat(2 * 1024 * 1024) })),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found_without_static_dir() {
        let router = build_router(state().await, None);
        let (status, _) = send(&router, Method::GET, "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let router = build_router(state().await, None);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/catalog")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }
}
