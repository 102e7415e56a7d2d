//! Server configuration: listen address, settings locations, watcher and
//! suppression timings, environment provisioning.

use std::{
   fs,
   path::{Path, PathBuf},
   sync::OnceLock,
   time::Duration,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8000;
pub const MIN_WATCH_DEBOUNCE_MS: u64 = 50;

/// Server configuration loaded from the config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub host: String,
   pub port: u16,

   /// Location of the global settings document. Defaults to the user config
   /// directory.
   pub global_settings_path: Option<PathBuf>,
   pub recent_projects_path: Option<PathBuf>,
   pub recent_projects_limit: usize,

   pub watch_debounce_ms:       u64,
   pub suppression_window_secs: u64,

   pub python:        String,
   pub provision_env: bool,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         host: "127.0.0.1".to_string(),
         port: DEFAULT_PORT,
         global_settings_path: None,
         recent_projects_path: None,
         recent_projects_limit: 15,
         watch_debounce_ms: 250,
         suppression_window_secs: 30,
         python: "python3".to_string(),
         provision_env: true,
      }
   }
}

impl Config {
   pub fn load() -> Self {
      let config_path = ensure_config_file();

      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(config_path))
         .merge(Env::prefixed("AICD_").lowercase(true))
         .extract()
         .inspect_err(|e| tracing::warn!("failed to parse config: {e}"))
         .unwrap_or_default()
   }

   fn create_default_config(path: &Path) {
      if let Some(parent) = path.parent() {
         let _ = fs::create_dir_all(parent);
      }
      let default_config = Self::default();
      if let Ok(toml) = toml::to_string_pretty(&default_config) {
         let _ = fs::write(path, toml);
      }
   }

   pub fn global_settings_path(&self) -> PathBuf {
      self
         .global_settings_path
         .clone()
         .unwrap_or_else(|| user_config_dir().join("settings.toml"))
   }

   pub fn recent_projects_path(&self) -> PathBuf {
      self
         .recent_projects_path
         .clone()
         .unwrap_or_else(|| base_dir().join("recent_projects.json"))
   }

   pub fn watch_debounce(&self) -> Duration {
      Duration::from_millis(self.watch_debounce_ms.max(MIN_WATCH_DEBOUNCE_MS))
   }

   pub fn suppression_window(&self) -> Duration {
      Duration::from_secs(self.suppression_window_secs)
   }

   pub fn listen_addr(&self) -> String {
      format!("{}:{}", self.host, self.port)
   }
}

/// Returns the base directory for aicd data and the server config file
pub fn base_dir() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| resolve_home_dir(".aicd"))
}

pub fn config_file_path() -> PathBuf {
   base_dir().join("server.toml")
}

/// Directory holding the global settings document shared by every project.
pub fn user_config_dir() -> PathBuf {
   BaseDirs::new()
      .map(|d| d.config_dir().join("aiconsole"))
      .unwrap_or_else(|| resolve_home_dir(".config").join("aiconsole"))
}

fn ensure_config_file() -> PathBuf {
   let config_path = config_file_path();
   if !config_path.exists() {
      Config::create_default_config(&config_path);
   }
   config_path
}

fn resolve_home_dir(dir_name: &str) -> PathBuf {
   BaseDirs::new()
      .map(|d| d.home_dir().join(dir_name))
      .or_else(|| {
         std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(dir_name))
      })
      .unwrap_or_else(|| {
         std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(dir_name)
      })
}
