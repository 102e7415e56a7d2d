//! Real-time synchronization backend for the AI console: connection registry,
//! layered settings with live reload and the project lifecycle.

pub mod cmd;
pub mod config;
pub mod console;
pub mod error;
pub mod project;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod settings;
pub mod util;

pub use error::{Error, Result};
