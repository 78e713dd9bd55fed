// ABOUTME: Route definitions for the readmark HTTP server.
// ABOUTME: Assembles sync, user, and web UI routes with auth, CORS, request ids, and tracing into one Axum Router.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post, put};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use ulid::Ulid;

use crate::api::{documents, syncs, users};
use crate::app_state::SharedState;
use crate::auth::AuthLayer;

const WEB_UI_DISABLED: &str =
    "readmark is running. The web UI is disabled; set enable_webui in the database config or pass --webui.";

/// Stamps every request with a fresh ULID unless the client sent an id.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUlid;

impl MakeRequestId for MakeRequestUlid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = HeaderValue::from_str(&Ulid::new().to_string()).ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the complete Axum router with all routes and shared state.
pub fn create_router(state: SharedState) -> Router {
    let web_ui = Router::new()
        .route("/api/documents.all", get(documents::list_documents))
        .route(
            "/api/documents/{document}/pretty-name",
            put(documents::set_pretty_name),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let mut router = Router::new()
        .route("/", get(index))
        .route("/healthcheck", get(health))
        .route("/users/create", post(users::create_user))
        .route("/users/auth", get(users::auth_user))
        .route(
            "/syncs/progress",
            put(syncs::update_progress).post(syncs::update_progress),
        )
        .route("/syncs/progress/{document}", get(syncs::get_progress))
        .merge(web_ui);

    if let Some(root) = &state.web_root {
        tracing::info!(root = %root.display(), "serving web UI under /web");
        let index = ServeFile::new(root.join("index.html"));
        router = router.nest_service("/web", ServeDir::new(root).fallback(index));
    }

    router
        .layer(AuthLayer::new(Arc::clone(&state.store)))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUlid))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("-");
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id
                        )
                    }),
                )
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// Health check handler. Returns 200 OK with a simple JSON body.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "state": "OK" }))
}

/// GET / - Send browsers to the web UI, or explain that it is off.
async fn index(State(state): State<SharedState>) -> Response {
    if state.web_root.is_some() {
        Redirect::temporary("/web/").into_response()
    } else {
        WEB_UI_DISABLED.into_response()
    }
}
