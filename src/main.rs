//! Quizline backend
//!
//! - Axum HTTP + WebSocket API
//! - Optional remote store and OpenAI generator (via environment variables)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   DATA_DIR            : cache database + content version token (default ./data)
//!   REMOTE_BASE_URL     : enables the remote store tier and score recording
//!   OPENAI_API_KEY      : enables the generator tier and custom topics
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL   : default "gpt-4o-mini" (topic validation)
//!   OPENAI_STRONG_MODEL : default "gpt-4o" (question generation)
//!   QUIZ_CONFIG_PATH    : path to TOML config (game settings, languages, prompts)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{error, info};

use quizline_backend::config::AppConfig;
use quizline_backend::routes::build_router;
use quizline_backend::state::AppState;
use quizline_backend::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = AppConfig::from_env();
  let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

  // The version gate must finish before anything is served.
  let state = match AppState::initialize(config).await {
    Ok(state) => Arc::new(state),
    Err(e) => {
      error!(target: "quizline_backend", error = %e, "Startup cache gate failed; refusing to start");
      return Err(e.into());
    }
  };

  let app = build_router(state);
  let listener = TcpListener::bind(addr).await?;
  info!(target: "quizline_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(target: "quizline_backend", error = %e, "Cannot listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "quizline_backend", "Shutdown signal received");
}
