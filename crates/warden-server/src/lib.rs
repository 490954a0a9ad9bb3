//! Warden Server - localhost HTTP bridge.
//!
//! The browser extension forwards host callbacks here and drains the
//! agent's command queue; the popup reads state and answers prompts.
//!
//! ## Endpoints
//!
//! - `POST /hook/download/pre-start` - pre-start hook; withheld decisions
//!   are awaited up to the bridge deadline
//! - `POST /hook/download/created` - safety-net hook, returns allow/cancel
//! - `POST /hook/download/{changed,removed,cancel-failed,reinit-failed}`
//! - `POST /hook/navigation/committed`, `POST /hook/tab/removed`
//! - `GET  /api/commands` - drain queued host commands
//! - `POST /api/prompts/{id}/respond` - prompt responses
//! - `GET/PUT /api/protection`, `POST/DELETE /api/auth/token`
//! - `GET /api/events`, `GET/DELETE /api/logs`, `GET /api/status`
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use warden_agent::{Warden, WardenConfig};
//! use warden_core::credentials::CredentialStore;
//! use warden_scan::ScanClient;
//! use warden_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let credentials = CredentialStore::new();
//!     let client = ScanClient::new("https://scan.example.com/api/", credentials.clone()).unwrap();
//!     let agent = Warden::new(Arc::new(client), credentials, None, WardenConfig::default());
//!     let server = Server::new(ServerConfig::default(), agent).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::net::SocketAddr;

use axum::routing::{delete, get, post, put};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use warden_agent::Warden;

pub use error::{ApiError, Result};
pub use state::{AppState, DEFAULT_DECISION_WAIT};

/// Default server port.
pub const DEFAULT_PORT: u16 = 48810;

/// Default server host (localhost only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    Bind(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// The bridge server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server over an agent.
    pub fn new(config: ServerConfig, agent: Warden) -> std::result::Result<Self, ServerError> {
        Self::with_state(config, AppState::new(agent))
    }

    /// Creates a server with custom state.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {e}")))?;

        Ok(Self {
            router: build_router(state),
            addr,
        })
    }

    /// Returns the bind address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting Warden bridge on {}", self.addr);

        // SO_REUSEADDR lets a restarted agent rebind while old sockets
        // linger in TIME_WAIT.
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::Bind(self.addr, e))?;

        let listener = tokio::net::TcpListener::from_std(socket.into())
            .map_err(|e| ServerError::Bind(self.addr, e))?;

        axum::serve(listener, self.router)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))
    }
}

/// Builds the router. Exposed for in-process tests.
pub fn build_router(state: AppState) -> Router {
    // The extension and popup run on extension origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/hook/download/pre-start", post(handlers::download_pre_start))
        .route("/hook/download/created", post(handlers::download_created))
        .route("/hook/download/changed", post(handlers::download_changed))
        .route("/hook/download/removed", post(handlers::download_removed))
        .route(
            "/hook/download/cancel-failed",
            post(handlers::download_cancel_failed),
        )
        .route(
            "/hook/download/reinit-failed",
            post(handlers::download_reinit_failed),
        )
        .route(
            "/hook/navigation/committed",
            post(handlers::navigation_committed),
        )
        .route("/hook/tab/removed", post(handlers::tab_removed))
        .route("/api/commands", get(handlers::get_commands))
        .route(
            "/api/prompts/{id}/respond",
            post(handlers::respond_prompt),
        )
        .route("/api/protection", get(handlers::get_protection))
        .route("/api/protection", put(handlers::set_protection))
        .route("/api/auth/token", post(handlers::set_auth_token))
        .route("/api/auth/token", delete(handlers::clear_auth_token))
        .route("/api/events", get(handlers::get_events))
        .route("/api/logs", get(handlers::get_logs))
        .route("/api/logs", delete(handlers::clear_logs))
        .route("/api/status", get(handlers::get_status))
        .layer(cors)
        .with_state(state)
}
