use std::{io, path::PathBuf};

use thiserror::Error;

/// Main error type for the aicd backend.
///
/// Variants map onto the failure classes the console distinguishes:
/// configuration mistakes (fatal to the caller), missing paths or assets
/// (reported to the immediate caller only), persistence failures, delivery
/// failures on a single connection, and background task failures that are
/// only ever logged.
#[derive(Debug, Error)]
pub enum Error {
   /// I/O error occurred during file or network operations.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// JSON serialization or deserialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// TOML deserialization error occurred.
   #[error("toml error: {0}")]
   Toml(#[from] toml::de::Error),

   /// Settings were used before `configure` was called.
   #[error("settings are not configured; call configure() first")]
   NotConfigured,

   /// A path or asset requested by the caller does not exist.
   #[error("{what} not found: {name}")]
   NotFound { what: &'static str, name: String },

   /// Reading or writing a settings document failed.
   #[error("settings store error: {0}")]
   Store(#[from] StoreError),

   /// Delivering a message to one connection failed.
   #[error("delivery error: {0}")]
   Delivery(#[from] DeliveryError),

   /// A topic lock is already held by another connection.
   #[error("chat {topic} is locked by request {request_id}")]
   LockHeld { topic: String, request_id: String },

   /// A project switch or close is already running.
   #[error("a project {0} is already in progress")]
   Busy(&'static str),

   /// Provisioning the dedicated project environment failed.
   #[error("environment provisioning failed: {reason}")]
   Provision { reason: String },

   /// File watching could not be set up.
   #[error("watch error: {0}")]
   Watch(#[from] notify::Error),

   /// Server error occurred during a specific operation.
   #[error("server error during {op}: {reason}")]
   Server { op: &'static str, reason: String },
}

impl Error {
   pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
      Self::NotFound { what, name: name.into() }
   }

   pub fn exit_code(&self) -> i32 {
      match self {
         Self::NotFound { .. } => 2,
         Self::Store(_) | Self::Toml(_) => 3,
         Self::Busy(_) | Self::LockHeld { .. } => 10,
         Self::NotConfigured => 70,
         _ => 1,
      }
   }
}

/// Errors raised by the layered settings document store.
#[derive(Debug, Error)]
pub enum StoreError {
   /// Failed to read a settings document from disk.
   #[error("failed to read {}: {source}", path.display())]
   Read {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },

   /// A settings document exists but is not valid TOML.
   #[error("failed to parse {}: {source}", path.display())]
   Parse {
      path:   PathBuf,
      #[source]
      source: toml::de::Error,
   },

   /// Failed to serialize a settings document.
   #[error("failed to serialize settings: {0}")]
   Serialize(#[from] toml::ser::Error),

   /// Failed to persist a settings document.
   #[error("failed to write {}: {source}", path.display())]
   Write {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },

   /// A project-tier write was requested while no project is open.
   #[error("cannot write project settings: no project is open")]
   NoProject,
}

/// Errors that can occur while delivering a message to a single connection.
#[derive(Debug, Error)]
pub enum DeliveryError {
   /// The connection's transport has gone away.
   #[error("connection {0} is closed")]
   Closed(String),

   /// The connection is not (or no longer) registered.
   #[error("unknown connection {0}")]
   UnknownConnection(String),
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
