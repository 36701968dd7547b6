//! Control server
//!
//! HTTP surface for a host that drives the queue remotely and for operator
//! bridges that post replies back.
//!
//! ```text
//! GET  /api/health
//! POST /api/queue/start
//! POST /api/queue/cancel
//! GET  /api/queue/status
//! POST /api/operator/replies
//! GET  /metrics
//! ```

pub mod api;

use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::approval::ReplyInbox;
use crate::config::ServerConfig;
use crate::queue::PublishQueue;
use crate::schedule::ScheduleConfig;

pub use api::{create_router, ApiResponse, StartRequest};

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Queue driven by the API
    pub queue: PublishQueue,

    /// Inbox for operator replies; absent without an operator channel
    pub inbox: Option<ReplyInbox>,

    /// Schedule used when a start request brings none
    pub default_schedule: ScheduleConfig,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create application state
    pub fn new(queue: PublishQueue, inbox: Option<ReplyInbox>, default_schedule: ScheduleConfig) -> Self {
        Self {
            queue,
            inbox,
            default_schedule,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Control Server
// ============================================================================

/// Control server
pub struct ControlServer {
    config: ServerConfig,
    state: AppState,
}

impl ControlServer {
    /// Create a new control server
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Serve until `shutdown_signal` resolves
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.config.bind_address;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind { addr, source: e })?;

        tracing::info!(address = %addr, "Control server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(ServerError::Serve)?;

        tracing::info!("Control server shutdown complete");
        Ok(())
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.config.bind_address,
            cors_enabled: self.config.enable_cors,
            request_logging_enabled: self.config.enable_request_logging,
            operator_replies_enabled: self.state.inbox.is_some(),
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
    pub operator_replies_enabled: bool,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Control Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             CORS: {}\n\
             Request Logging: {}\n\
             Operator Replies: {}",
            "",
            self.bind_address,
            if self.cors_enabled { "enabled" } else { "disabled" },
            if self.request_logging_enabled { "enabled" } else { "disabled" },
            if self.operator_replies_enabled { "enabled" } else { "disabled" }
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Server stopped with an error
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}
