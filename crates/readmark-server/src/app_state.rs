// ABOUTME: Shared application state for the readmark HTTP server.
// ABOUTME: Holds the record store handle and the web UI directory, with constructors for prod and test use.

use std::path::PathBuf;
use std::sync::Arc;

use readmark_store::RecordStore;

/// Shared application state accessible by all Axum handlers.
pub struct AppState {
    pub store: Arc<RecordStore>,
    /// Directory served under `/web`. `None` keeps the web UI off.
    pub web_root: Option<PathBuf>,
}

/// Type alias for the Arc-wrapped state used with Axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Create state for the given store with the web UI disabled.
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            web_root: None,
        }
    }

    pub fn with_web_root(mut self, web_root: Option<PathBuf>) -> Self {
        self.web_root = web_root;
        self
    }
}
