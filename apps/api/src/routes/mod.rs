pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::Redirect,
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

use crate::attachments::handlers as attachments;
use crate::auth::handlers as auth;
use crate::auth::middleware::require_login;
use crate::jobs::handlers as jobs;
use crate::jobs::marketplace::handle_marketplace;
use crate::state::AppState;

/// Room for the multipart framing and the `kind` field around an upload.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.upload_max_bytes + MULTIPART_OVERHEAD_BYTES;

    let protected = Router::new()
        .route("/marketplace", get(handle_marketplace))
        .route("/jobs", get(jobs::handle_index).post(jobs::handle_store))
        .route("/jobs/create", get(jobs::handle_create_form))
        .route(
            "/jobs/:id",
            get(jobs::handle_show)
                .post(jobs::handle_update)
                .put(jobs::handle_update)
                .delete(jobs::handle_destroy),
        )
        .route("/jobs/:id/edit", get(jobs::handle_edit_form))
        .route("/jobs/:id/delete", post(jobs::handle_destroy))
        .route("/jobs/:id/apply", post(jobs::handle_apply))
        .route("/attachments", post(attachments::handle_upload))
        .route("/dmz-assets/:file", get(attachments::handle_serve))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_login));

    Router::new()
        .route("/", get(|| async { Redirect::to("/marketplace") }))
        .route("/health", get(health::health_handler))
        .route("/login", get(auth::handle_login_page).post(auth::handle_login))
        .route("/logout", post(auth::handle_logout))
        .merge(protected)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::store::memory::MemoryStore;

    fn app() -> Router {
        build_router(AppState::for_tests(Arc::new(MemoryStore::new())))
    }

    async fn get(uri: &str) -> axum::response::Response {
        app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn location(response: &axum::response::Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "jobboard");
    }

    #[tokio::test]
    async fn test_root_redirects_to_marketplace() {
        let response = get("/").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/marketplace");
    }

    #[tokio::test]
    async fn test_protected_routes_redirect_to_login() {
        for uri in ["/marketplace", "/jobs", "/jobs/create", "/jobs/1/edit", "/dmz-assets/a.png"] {
            let response = get(uri).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
            assert_eq!(location(&response), "/login", "{uri}");
        }
    }

    #[tokio::test]
    async fn test_login_page_renders_without_session() {
        let response = get("/login").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("name=\"password\""));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        assert_eq!(get("/nope").await.status(), StatusCode::NOT_FOUND);
    }
}
