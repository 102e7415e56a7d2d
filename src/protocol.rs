//! Messages exchanged with console clients over the WebSocket.
//!
//! Every message is a JSON object whose `type` field names the variant.

use serde::{Deserialize, Serialize};

use crate::settings::AssetKind;

/// Server → client messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
   InitialProjectStatus {
      project_path: Option<String>,
      project_name: Option<String>,
   },
   ProjectLoading,
   ProjectOpened {
      path: String,
      name: String,
   },
   ProjectClosed,
   SettingsChanged {
      initial: bool,
      refresh: bool,
   },
   AssetsChanged {
      asset_kind: AssetKind,
      initial:    bool,
      count:      usize,
   },
   LockReleased {
      chat_id:    String,
      request_id: String,
   },
   Error {
      message: String,
   },
}

impl ServerMessage {
   pub fn error(message: impl Into<String>) -> Self {
      Self::Error { message: message.into() }
   }

   pub const fn type_name(&self) -> &'static str {
      match self {
         Self::InitialProjectStatus { .. } => "initial_project_status",
         Self::ProjectLoading => "project_loading",
         Self::ProjectOpened { .. } => "project_opened",
         Self::ProjectClosed => "project_closed",
         Self::SettingsChanged { .. } => "settings_changed",
         Self::AssetsChanged { .. } => "assets_changed",
         Self::LockReleased { .. } => "lock_released",
         Self::Error { .. } => "error",
      }
   }
}

/// Client → server messages handled by the console itself. Chat processing
/// messages belong to other handlers and are rejected here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
   OpenChat { chat_id: String },
   CloseChat { chat_id: String },
   AcquireLock { chat_id: String, request_id: String },
   ReleaseLock { chat_id: String, request_id: String },
}

/// Currently opened project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
   pub path: String,
   pub name: String,
}
