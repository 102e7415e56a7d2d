//! Two-tier settings document store (global + project).

use std::{
   fs, io,
   path::{Path, PathBuf},
};

use toml::{Table, Value};

use crate::{
   error::StoreError,
   settings::model::{AssetKind, PartialSettings, UserProfileSettings},
   util,
};

/// File name of the project-tier settings document inside a project directory.
pub const PROJECT_SETTINGS_FILE: &str = "settings.toml";

/// Precedence level of a settings document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
   Global,
   Project,
}

impl Tier {
   pub const fn from_global_flag(to_global: bool) -> Self {
      if to_global { Self::Global } else { Self::Project }
   }
}

/// Reads and writes the global and project settings documents.
#[derive(Debug, Clone)]
pub struct SettingsStore {
   global_path:  PathBuf,
   project_path: Option<PathBuf>,
}

impl SettingsStore {
   pub fn new(global_path: impl Into<PathBuf>) -> Self {
      Self { global_path: global_path.into(), project_path: None }
   }

   pub fn with_project(mut self, project_dir: &Path) -> Self {
      self.set_project(Some(project_dir));
      self
   }

   /// Points the project tier at `<project_dir>/settings.toml`, or detaches it.
   pub fn set_project(&mut self, project_dir: Option<&Path>) {
      self.project_path = project_dir.map(|dir| dir.join(PROJECT_SETTINGS_FILE));
   }

   pub fn global_path(&self) -> &Path {
      &self.global_path
   }

   pub fn project_path(&self) -> Option<&Path> {
      self.project_path.as_deref()
   }

   /// Files whose changes should trigger a reload.
   pub fn watched_paths(&self) -> Vec<PathBuf> {
      let mut paths = vec![self.global_path.clone()];
      paths.extend(self.project_path.clone());
      paths
   }

   pub fn path_for(&self, tier: Tier) -> Result<&Path, StoreError> {
      match tier {
         Tier::Global => Ok(&self.global_path),
         Tier::Project => self.project_path.as_deref().ok_or(StoreError::NoProject),
      }
   }

   /// Returns one tier's document as stored on disk.
   pub fn read(&self, tier: Tier) -> Result<Table, StoreError> {
      match tier {
         Tier::Global => read_document(&self.global_path),
         Tier::Project => self
            .project_path
            .as_deref()
            .map_or_else(|| Ok(Table::new()), read_document),
      }
   }

   /// Returns the merged document: project keys over global keys.
   pub fn load(&self) -> Result<Table, StoreError> {
      let mut merged = self.read(Tier::Global)?;
      let project = self.read(Tier::Project)?;
      merge_tables(&mut merged, project);
      Ok(merged)
   }

   /// Applies the present keys of `partial` to the document of `tier` and
   /// persists it atomically.
   pub fn write(&self, partial: &PartialSettings, tier: Tier) -> Result<(), StoreError> {
      let path = self.path_for(tier)?;
      let mut document = read_document(path)?;
      apply_partial(&mut document, partial)?;

      let data = toml::to_string_pretty(&document)?;
      util::write_atomic(path, data.as_bytes())
         .map_err(|source| StoreError::Write { path: path.to_path_buf(), source })?;
      tracing::debug!("wrote settings to {}", path.display());
      Ok(())
   }
}

/// Reads a document; a missing file is an empty document.
pub fn read_document(path: &Path) -> Result<Table, StoreError> {
   let raw = match fs::read_to_string(path) {
      Ok(raw) => raw,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Table::new()),
      Err(source) => return Err(StoreError::Read { path: path.to_path_buf(), source }),
   };
   toml::from_str(&raw).map_err(|source| StoreError::Parse { path: path.to_path_buf(), source })
}

/// Deep-merges `overlay` into `base`: tables merge recursively, arrays are
/// concatenated base-then-overlay, anything else is replaced by the overlay.
pub fn merge_tables(base: &mut Table, overlay: Table) {
   for (key, value) in overlay {
      match (base.get_mut(&key), value) {
         (Some(Value::Table(existing)), Value::Table(incoming)) => merge_tables(existing, incoming),
         (Some(Value::Array(existing)), Value::Array(incoming)) => existing.extend(incoming),
         (_, value) => {
            base.insert(key, value);
         },
      }
   }
}

fn apply_partial(document: &mut Table, partial: &PartialSettings) -> Result<(), StoreError> {
   if let Some(autorun) = partial.code_autorun {
      document.insert("code_autorun".to_string(), Value::Boolean(autorun));
   }
   if let Some(key) = &partial.openai_api_key {
      document.insert("openai_api_key".to_string(), Value::String(key.clone()));
   }
   if let Some(profile) = &partial.user_profile {
      apply_profile(document, profile)?;
   }

   for kind in AssetKind::ALL {
      let overrides = partial.overrides(kind);
      let resets = partial.resets(kind);
      if overrides.is_empty() && resets.is_empty() {
         continue;
      }

      let entry = document
         .entry(kind.plural().to_string())
         .or_insert_with(|| Value::Table(Table::new()));
      if !entry.is_table() {
         *entry = Value::Table(Table::new());
      }
      let Value::Table(statuses) = entry else {
         continue;
      };

      for id in resets {
         statuses.remove(id);
      }
      for (id, status) in overrides.iter() {
         statuses.insert(id.to_string(), Value::String(status.as_str().to_string()));
      }
   }
   Ok(())
}

fn apply_profile(document: &mut Table, profile: &UserProfileSettings) -> Result<(), StoreError> {
   let Value::Table(fields) = Value::try_from(profile)? else {
      return Ok(());
   };
   let entry = document
      .entry("user_profile".to_string())
      .or_insert_with(|| Value::Table(Table::new()));
   match entry {
      Value::Table(existing) => {
         for (key, value) in fields {
            existing.insert(key, value);
         }
      },
      other => *other = Value::Table(fields),
   }
   Ok(())
}
