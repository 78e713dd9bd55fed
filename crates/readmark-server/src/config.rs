// ABOUTME: Runtime server configuration: the socket to bind and whether and where to serve the web UI.
// ABOUTME: Combines the store's persisted config with command-line overrides and validates the listen address.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use readmark_core::{Config, DEFAULT_LISTEN_ADDRESS};
use thiserror::Error;

/// Where the bundled web UI is looked for unless overridden.
pub const DEFAULT_WEB_ROOT: &str = "./webui/dist";

/// Errors that can occur while resolving the server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("listen address is not a valid socket address: {0}")]
    InvalidListenAddress(String),
}

/// Values from the command line that take precedence over the stored config.
#[derive(Debug, Clone)]
pub struct ServerOverrides {
    pub listen: Option<String>,
    pub force_web_ui: bool,
    pub web_root: PathBuf,
}

impl Default for ServerOverrides {
    fn default() -> Self {
        Self {
            listen: None,
            force_web_ui: false,
            web_root: PathBuf::from(DEFAULT_WEB_ROOT),
        }
    }
}

/// Settings the HTTP server is started with.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub web_root: Option<PathBuf>,
}

impl ServerConfig {
    /// Resolve the bind address and web UI directory.
    ///
    /// The `--listen` override wins over `listen_address`, and the web UI is
    /// on when either `enable_webui` or `--webui` asks for it.
    pub fn resolve(stored: &Config, overrides: &ServerOverrides) -> Result<Self, ConfigError> {
        let listen = overrides
            .listen
            .as_deref()
            .filter(|addr| !addr.is_empty())
            .unwrap_or(&stored.listen_address);
        let listen = parse_listen_address(listen)?;

        let web_root = (stored.web_ui || overrides.force_web_ui).then(|| overrides.web_root.clone());

        Ok(Self { listen, web_root })
    }
}

/// Parse a listen address in `host:port` form.
///
/// A bare `:port` binds every interface, and an empty string falls back to
/// the default `:8080`. Host names are resolved and the first address wins.
pub fn parse_listen_address(addr: &str) -> Result<SocketAddr, ConfigError> {
    let addr = addr.trim();
    let addr = if addr.is_empty() { DEFAULT_LISTEN_ADDRESS } else { addr };

    let normalized = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    };

    if let Ok(socket) = normalized.parse::<SocketAddr>() {
        return Ok(socket);
    }

    normalized
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::InvalidListenAddress(addr.to_string()))
}
