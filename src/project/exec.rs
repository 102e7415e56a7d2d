//! Code execution context shared by the project's interpreters.

use std::{
   path::{Path, PathBuf},
   sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::RwLock;

use crate::Result;

pub trait ExecutionContext: Send + Sync {
   /// Directory that code runs in.
   fn set_working_dir(&self, dir: &Path) -> Result<()>;

   /// API key handed to interpreters; `None` clears it.
   fn set_credential(&self, key: Option<&str>);

   /// Drops every running interpreter.
   fn reset(&self);
}

/// Runs code in this process: the working directory is the process cwd.
#[derive(Debug, Default)]
pub struct ProcessExecution {
   working_dir: RwLock<Option<PathBuf>>,
   credential:  RwLock<Option<String>>,
   epoch:       AtomicU64,
}

impl ProcessExecution {
   pub fn new() -> Self {
      Self::default()
   }

   /// Incremented on every reset; interpreters started in an older epoch are
   /// stale.
   pub fn epoch(&self) -> u64 {
      self.epoch.load(Ordering::Acquire)
   }

   pub fn working_dir(&self) -> Option<PathBuf> {
      self.working_dir.read().clone()
   }

   pub fn has_credential(&self) -> bool {
      self.credential.read().is_some()
   }
}

impl ExecutionContext for ProcessExecution {
   fn set_working_dir(&self, dir: &Path) -> Result<()> {
      std::env::set_current_dir(dir)?;
      *self.working_dir.write() = Some(dir.to_path_buf());
      tracing::info!("working directory is now {}", dir.display());
      Ok(())
   }

   fn set_credential(&self, key: Option<&str>) {
      let mut credential = self.credential.write();
      if credential.as_deref() != key {
         tracing::debug!("execution credential {}", if key.is_some() { "updated" } else { "cleared" });
         *credential = key.map(String::from);
      }
   }

   fn reset(&self) {
      let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
      tracing::debug!("code interpreters reset (epoch {epoch})");
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn reset_bumps_epoch() {
      let exec = ProcessExecution::new();
      exec.reset();
      exec.reset();
      assert_eq!(exec.epoch(), 2);
   }

   #[test]
   fn credential_can_be_cleared() {
      let exec = ProcessExecution::new();
      exec.set_credential(Some("sk-test"));
      assert!(exec.has_credential());
      exec.set_credential(None);
      assert!(!exec.has_credential());
   }
}
