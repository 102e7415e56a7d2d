//! Most-recently-opened projects, persisted as JSON.

use std::{
   fs, io,
   path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, util};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentProject {
   pub path:      PathBuf,
   pub name:      String,
   pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecentProjects {
   path:  PathBuf,
   limit: usize,
}

impl RecentProjects {
   pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
      Self { path: path.into(), limit: limit.max(1) }
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Most recent first. A missing file is an empty list.
   pub fn list(&self) -> Result<Vec<RecentProject>> {
      match fs::read(&self.path) {
         Ok(raw) => Ok(serde_json::from_slice(&raw)?),
         Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
         Err(e) => Err(e.into()),
      }
   }

   /// Moves `dir` to the front, dropping entries beyond the limit.
   pub fn add(&self, dir: &Path) -> Result<()> {
      let mut entries = self.list().unwrap_or_else(|e| {
         tracing::warn!("recent projects list unreadable, starting over: {e}");
         Vec::new()
      });

      entries.retain(|entry| entry.path != dir);
      entries.insert(0, RecentProject {
         path:      dir.to_path_buf(),
         name:      util::project_name(dir),
         opened_at: Utc::now(),
      });
      entries.truncate(self.limit);

      let data = serde_json::to_vec_pretty(&entries)?;
      util::write_atomic(&self.path, &data)?;
      Ok(())
   }
}
