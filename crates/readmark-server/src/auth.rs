// ABOUTME: Header authentication middleware for the sync and web UI APIs.
// ABOUTME: Checks x-auth-user / x-auth-key against the store on /users/auth, /syncs/*, and /api/* routes.

use axum::Json;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use readmark_store::RecordStore;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

pub const USER_HEADER: &str = "x-auth-user";
pub const KEY_HEADER: &str = "x-auth-key";

/// Username of the caller, inserted as a request extension once the headers check out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// A tower Layer that authenticates requests against the user records in the store.
#[derive(Clone)]
pub struct AuthLayer {
    store: Arc<RecordStore>,
}

impl AuthLayer {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            store: Arc::clone(&self.store),
        }
    }
}

/// The middleware service behind [`AuthLayer`].
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    store: Arc<RecordStore>,
}

/// Routes that need credentials. Registration, health, and the static UI stay open.
fn requires_auth(path: &str) -> bool {
    let under = |prefix: &str| {
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    };
    path == "/users/auth" || under("/syncs") || under("/api")
}

fn header_value<'a>(req: &'a Request<Body>, name: &str) -> &'a str {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn unauthorized() -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "message": "Unauthorized" })),
    )
        .into_response()
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // The clone has not been polled ready; keep it and use the one that was.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        // CORS preflights carry no credentials.
        if req.method() == Method::OPTIONS || !requires_auth(req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        let username = header_value(&req, USER_HEADER).to_string();
        let key = header_value(&req, KEY_HEADER).to_string();
        let store = Arc::clone(&self.store);

        Box::pin(async move {
            if username.is_empty() || !store.authenticate(&username, &key).await {
                tracing::debug!(user = %username, path = %req.uri().path(), "unauthorized request");
                return Ok(unauthorized());
            }

            tracing::debug!(user = %username, "authorized request");
            req.extensions_mut().insert(AuthenticatedUser(username));
            inner.call(req).await
        })
    }
}
