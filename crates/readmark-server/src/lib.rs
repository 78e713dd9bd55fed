// ABOUTME: HTTP server for readmark, exposing the kosync-compatible sync API and the web UI API.
// ABOUTME: Uses Axum with a shared record store, header authentication, and optional static web UI serving.

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod routes;
pub mod startup;

pub use app_state::{AppState, SharedState};
pub use auth::{AuthLayer, AuthenticatedUser};
pub use config::{ConfigError, DEFAULT_WEB_ROOT, ServerConfig, ServerOverrides, parse_listen_address};
pub use routes::create_router;
pub use startup::{StartupError, load_store, prepare_store, resolve_database_path};
