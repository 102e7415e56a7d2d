//! HTTP surface: the `/ws` endpoint and a thin REST API in front of the
//! console loop.

pub mod api;
pub mod ws;

use axum::{
   Router,
   routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{Result, console::ConsoleHandle, error::Error};

#[derive(Clone)]
pub struct AppState {
   pub console: ConsoleHandle,
}

pub fn router(console: ConsoleHandle) -> Router {
   Router::new()
      .route("/ws", get(ws::ws_handler))
      .route("/api/projects/choose", post(api::choose_project))
      .route("/api/projects/close", post(api::close_project))
      .route("/api/projects/current", get(api::current_project))
      .route("/api/projects/recent", get(api::recent_projects))
      .route("/api/settings", get(api::get_settings).patch(api::patch_settings))
      .route("/api/{kind}/{id}/status", get(api::asset_status))
      .route("/api/{kind}/{id}/status-change", post(api::change_asset_status))
      .route("/api/{kind}/{id}/rename", post(api::rename_asset))
      .with_state(AppState { console })
}

/// Serves until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, console: ConsoleHandle, shutdown: CancellationToken) -> Result<()> {
   axum::serve(listener, router(console))
      .with_graceful_shutdown(async move { shutdown.cancelled().await })
      .await
      .map_err(|e| Error::Server { op: "serve", reason: e.to_string() })
}
