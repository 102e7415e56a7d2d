//! Debounced watcher for settings documents.
//!
//! Each file is observed through its parent directory so that editors which
//! replace a file (delete + recreate, or write + rename) are still noticed.
//! Only events for the exact watched paths count; other files in the same
//! directory are ignored.

use std::{
   fs,
   path::{Path, PathBuf},
   sync::Arc,
   time::Duration,
};

use notify_debouncer_mini::{
   DebounceEventResult, Debouncer, new_debouncer,
   notify::{RecommendedWatcher, RecursiveMode, Watcher},
};

use crate::Result;

/// Invoked on the watcher thread once per debounced batch of relevant events.
/// Implementations must only enqueue work.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

pub struct SettingsWatcher {
   debounce:  Duration,
   debouncer: Option<Debouncer<RecommendedWatcher>>,
   observing: Vec<PathBuf>,
}

impl SettingsWatcher {
   pub fn new(debounce: Duration) -> Self {
      Self { debounce, debouncer: None, observing: Vec::new() }
   }

   pub fn is_running(&self) -> bool {
      self.debouncer.is_some()
   }

   pub fn observing(&self) -> &[PathBuf] {
      &self.observing
   }

   /// Starts watching `paths`, replacing any previous watch.
   pub fn start(&mut self, paths: &[PathBuf], on_change: ChangeCallback) -> Result<()> {
      if self.is_running() {
         self.stop();
      }

      let mut parents: Vec<&Path> = Vec::new();
      for path in paths {
         let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            tracing::error!("not a valid settings file path: {}", path.display());
            continue;
         };
         if let Err(e) = fs::create_dir_all(parent) {
            tracing::error!("failed to create directory {}: {e}", parent.display());
         }
         if !parents.contains(&parent) {
            parents.push(parent);
         }
      }

      let watched = watched_spellings(paths);
      let mut debouncer = new_debouncer(self.debounce, move |result: DebounceEventResult| {
         match result {
            Ok(events) => {
               let relevant = events
                  .iter()
                  .any(|event| is_watched_file(&watched, &event.path));
               if relevant {
                  on_change();
               }
            },
            Err(e) => tracing::warn!("settings watch error: {e:?}"),
         }
      })?;

      for parent in parents {
         if let Err(e) = debouncer
            .watcher()
            .watch(parent, RecursiveMode::NonRecursive)
         {
            tracing::warn!("failed to watch {}: {e}", parent.display());
         }
      }

      self.observing = paths.to_vec();
      self.debouncer = Some(debouncer);
      tracing::info!(
         "observing settings for changes: {}",
         self
            .observing
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
      );
      Ok(())
   }

   /// Stops watching. Safe to call when not running.
   pub fn stop(&mut self) {
      if let Some(debouncer) = self.debouncer.take() {
         drop(debouncer);
         self.observing.clear();
         tracing::info!("settings observer stopped");
      }
   }
}

impl Drop for SettingsWatcher {
   fn drop(&mut self) {
      self.stop();
   }
}

/// Every path an event for one of `paths` may carry: the path as given and,
/// when its parent resolves differently, the canonical form.
fn watched_spellings(paths: &[PathBuf]) -> Vec<PathBuf> {
   let mut spellings = paths.to_vec();
   for path in paths {
      let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
         continue;
      };
      let Ok(dir) = fs::canonicalize(parent) else {
         continue;
      };
      let canonical = dir.join(name);
      if !spellings.contains(&canonical) {
         spellings.push(canonical);
      }
   }
   spellings
}

fn is_watched_file(watched: &[PathBuf], path: &Path) -> bool {
   watched.iter().any(|candidate| candidate == path)
}
