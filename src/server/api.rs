//! REST handlers. Each one forwards to the console loop and maps the reply.

use std::path::PathBuf;

use axum::{
   Json,
   extract::{Path, State},
   http::StatusCode,
   response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
   console::SettingsView,
   error::Error,
   project::RecentProject,
   protocol::ProjectInfo,
   server::AppState,
   settings::{AssetKind, AssetStatus, PartialSettings},
};

pub struct ApiError(Error);

impl From<Error> for ApiError {
   fn from(err: Error) -> Self {
      Self(err)
   }
}

#[derive(Serialize)]
struct ErrorBody {
   error: String,
}

impl IntoResponse for ApiError {
   fn into_response(self) -> Response {
      let status = match &self.0 {
         Error::NotFound { .. } => StatusCode::NOT_FOUND,
         Error::Busy(_) | Error::LockHeld { .. } => StatusCode::CONFLICT,
         _ => StatusCode::INTERNAL_SERVER_ERROR,
      };
      if status.is_server_error() {
         tracing::error!("request failed: {}", self.0);
      }
      (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
   }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn asset_kind(raw: &str) -> Result<AssetKind, ApiError> {
   AssetKind::from_plural(raw).ok_or_else(|| Error::not_found("asset type", raw).into())
}

#[derive(Debug, Deserialize)]
pub struct ChooseProjectRequest {
   pub directory: PathBuf,
}

pub async fn choose_project(
   State(state): State<AppState>,
   Json(req): Json<ChooseProjectRequest>,
) -> ApiResult<ProjectInfo> {
   Ok(Json(state.console.choose_project(req.directory).await?))
}

pub async fn close_project(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
   state.console.close_project().await?;
   Ok(StatusCode::NO_CONTENT)
}

pub async fn current_project(State(state): State<AppState>) -> ApiResult<Option<ProjectInfo>> {
   Ok(Json(state.console.current_project().await?))
}

pub async fn recent_projects(State(state): State<AppState>) -> ApiResult<Vec<RecentProject>> {
   Ok(Json(state.console.recent_projects().await?))
}

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<SettingsView> {
   Ok(Json(state.console.settings().await?))
}

#[derive(Debug, Deserialize)]
pub struct PatchSettingsRequest {
   #[serde(flatten)]
   pub partial:   PartialSettings,
   #[serde(default)]
   pub to_global: bool,
}

pub async fn patch_settings(
   State(state): State<AppState>,
   Json(req): Json<PatchSettingsRequest>,
) -> ApiResult<SettingsView> {
   Ok(Json(state.console.patch_settings(req.partial, req.to_global).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusBody {
   pub status: AssetStatus,
}

pub async fn asset_status(
   State(state): State<AppState>,
   Path((kind, id)): Path<(String, String)>,
) -> ApiResult<StatusBody> {
   let kind = asset_kind(&kind)?;
   let status = state.console.asset_status(kind, id).await?;
   Ok(Json(StatusBody { status }))
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
   pub status:    AssetStatus,
   #[serde(default)]
   pub to_global: bool,
}

pub async fn change_asset_status(
   State(state): State<AppState>,
   Path((kind, id)): Path<(String, String)>,
   Json(req): Json<StatusChangeRequest>,
) -> ApiResult<StatusBody> {
   let kind = asset_kind(&kind)?;
   state
      .console
      .set_asset_status(kind, id, req.status, req.to_global)
      .await?;
   Ok(Json(StatusBody { status: req.status }))
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
   pub new_id: String,
}

#[derive(Debug, Serialize)]
pub struct RenameBody {
   pub renamed: bool,
}

pub async fn rename_asset(
   State(state): State<AppState>,
   Path((kind, id)): Path<(String, String)>,
   Json(req): Json<RenameRequest>,
) -> ApiResult<RenameBody> {
   let kind = asset_kind(&kind)?;
   let renamed = state.console.rename_asset(kind, id, req.new_id).await?;
   Ok(Json(RenameBody { renamed }))
}
