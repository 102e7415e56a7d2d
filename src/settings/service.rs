//! Owner of the merged settings snapshot.
//!
//! Local writes arm a suppression window so that the watcher echo of our own
//! write reaches clients as `refresh: false`; a client that just saved does
//! not need to refetch.

use std::{
   path::Path,
   time::{Duration, Instant},
};

use crate::{
   Result,
   error::Error,
   project::{AssetCollection, ExecutionContext},
   protocol::ServerMessage,
   registry::ConnectionRegistry,
   settings::{
      model::{AssetKind, AssetStatus, PartialSettings, SettingsSnapshot},
      store::{SettingsStore, Tier},
      watcher::{ChangeCallback, SettingsWatcher},
   },
};

pub struct SettingsService {
   store:              Option<SettingsStore>,
   watcher:            SettingsWatcher,
   on_change:          Option<ChangeCallback>,
   snapshot:           SettingsSnapshot,
   warnings:           Vec<String>,
   suppression_window: Duration,
   suppress_until:     Option<Instant>,
}

impl SettingsService {
   pub fn new(debounce: Duration, suppression_window: Duration) -> Self {
      Self {
         store: None,
         watcher: SettingsWatcher::new(debounce),
         on_change: None,
         snapshot: SettingsSnapshot::default(),
         warnings: Vec::new(),
         suppression_window,
         suppress_until: None,
      }
   }

   /// Attaches the document store and starts watching its files. Must run
   /// before any other operation.
   pub fn configure(&mut self, store: SettingsStore, on_change: ChangeCallback) -> Result<()> {
      self
         .watcher
         .start(&store.watched_paths(), on_change.clone())?;
      self.store = Some(store);
      self.on_change = Some(on_change);
      Ok(())
   }

   pub fn is_configured(&self) -> bool {
      self.store.is_some()
   }

   fn store(&self) -> Result<&SettingsStore> {
      self.store.as_ref().ok_or(Error::NotConfigured)
   }

   pub fn snapshot(&self) -> &SettingsSnapshot {
      &self.snapshot
   }

   /// Problems found while building the current snapshot.
   pub fn warnings(&self) -> &[String] {
      &self.warnings
   }

   pub fn is_watching(&self) -> bool {
      self.watcher.is_running()
   }

   /// Whether a local write happened recently enough that the next reload
   /// counts as its echo.
   pub fn is_suppressed(&self) -> bool {
      self
         .suppress_until
         .is_some_and(|deadline| Instant::now() < deadline)
   }

   /// Re-reads the documents and tells every client. On a store failure the
   /// previous snapshot stays in place and nobody is notified.
   pub fn reload(
      &mut self,
      initial: bool,
      registry: &mut ConnectionRegistry,
      exec: &dyn ExecutionContext,
   ) -> Result<()> {
      if let Err(e) = self.refresh_snapshot(exec) {
         tracing::warn!("settings reload failed, keeping previous values: {e}");
         return Err(e);
      }

      let refresh = initial || !self.is_suppressed();
      self.suppress_until = None;

      let delivered = registry.broadcast(&ServerMessage::SettingsChanged { initial, refresh });
      tracing::debug!("settings_changed(initial={initial}, refresh={refresh}) sent to {delivered}");
      Ok(())
   }

   fn refresh_snapshot(&mut self, exec: &dyn ExecutionContext) -> Result<()> {
      let table = self.store()?.load()?;
      let (mut snapshot, mut warnings) = SettingsSnapshot::from_table(&table);
      warnings.extend(snapshot.enforce_single_forced_agent());
      for warning in &warnings {
         tracing::warn!("settings: {warning}");
      }

      exec.set_credential(snapshot.openai_api_key.as_deref());
      self.snapshot = snapshot;
      self.warnings = warnings;
      Ok(())
   }

   /// Override from settings, else the asset's own default, else enabled.
   pub fn get_asset_status(
      &self,
      kind: AssetKind,
      id: &str,
      collection: Option<&dyn AssetCollection>,
   ) -> Result<AssetStatus> {
      self.store()?;
      if let Some(status) = self.snapshot.overrides(kind).get(id) {
         return Ok(status);
      }
      Ok(collection
         .and_then(|c| c.get_asset(id))
         .map_or(AssetStatus::Enabled, |asset| asset.default_status()))
   }

   pub fn set_asset_status(
      &mut self,
      kind: AssetKind,
      id: &str,
      status: AssetStatus,
      to_global: bool,
      exec: &dyn ExecutionContext,
   ) -> Result<()> {
      let partial = PartialSettings::with_status(kind, id, status);
      self.update(partial, Tier::from_global_flag(to_global), exec)
   }

   /// Moves the override of `old_id` to `new_id` in the global document.
   /// Returns `false` when `old_id` has no override.
   pub fn rename_asset(
      &mut self,
      kind: AssetKind,
      old_id: &str,
      new_id: &str,
      exec: &dyn ExecutionContext,
   ) -> Result<bool> {
      self.store()?;
      let Some(status) = self.snapshot.overrides(kind).get(old_id) else {
         return Ok(false);
      };

      let mut partial = PartialSettings::with_status(kind, new_id, status);
      partial.resets_mut(kind).push(old_id.to_string());
      self.update(partial, Tier::Global, exec)?;
      tracing::info!("renamed {kind} override {old_id} -> {new_id}");
      Ok(true)
   }

   /// Persists `partial` to one tier, arms the suppression window and
   /// refreshes the snapshot without notifying clients.
   pub fn update(
      &mut self,
      mut partial: PartialSettings,
      tier: Tier,
      exec: &dyn ExecutionContext,
   ) -> Result<()> {
      let demotions = self.demote_competing_forced(&mut partial, tier)?;
      let demoted = {
         let store = self.store()?;
         store.write(&partial, tier)?;
         demotions
            .iter()
            .try_for_each(|(other, demotion)| store.write(demotion, *other))
      };
      self.suppress_until = Some(Instant::now() + self.suppression_window);

      if let Err(e) = self.refresh_snapshot(exec) {
         tracing::warn!("settings written but could not be re-read: {e}");
      }
      demoted?;
      Ok(())
   }

   /// If `partial` forces an agent, every other forced agent is written back
   /// as enabled in the tier that forces it. Demotions in `target` join
   /// `partial`; those for the other tier are returned as separate writes.
   fn demote_competing_forced(
      &self,
      partial: &mut PartialSettings,
      target: Tier,
   ) -> Result<Vec<(Tier, PartialSettings)>> {
      let Some(winner) = partial.agents.forced_ids().next().map(String::from) else {
         return Ok(Vec::new());
      };

      let in_partial: Vec<String> = partial
         .agents
         .forced_ids()
         .filter(|id| *id != winner)
         .map(String::from)
         .collect();
      for id in in_partial {
         partial.agents.set(id, AssetStatus::Enabled);
      }

      let store = self.store()?;
      let mut demotions = Vec::new();
      for tier in [Tier::Global, Tier::Project] {
         let (stored, _) = SettingsSnapshot::from_table(&store.read(tier)?);
         let losers: Vec<String> = stored
            .agents
            .forced_ids()
            .filter(|id| *id != winner)
            .filter(|id| {
               tier != target || !partial.agents_to_reset.iter().any(|reset| reset.as_str() == *id)
            })
            .map(String::from)
            .collect();
         if losers.is_empty() {
            continue;
         }

         for id in &losers {
            tracing::info!("agent {id} no longer forced, {winner} takes over");
         }
         let losers = losers.into_iter().map(|id| (id, AssetStatus::Enabled));
         if tier == target {
            for (id, status) in losers {
               partial.agents.set(id, status);
            }
         } else {
            demotions.push((tier, PartialSettings {
               agents: losers.collect(),
               ..PartialSettings::default()
            }));
         }
      }
      Ok(demotions)
   }

   /// Retargets the project tier and watches the new set of files.
   pub fn change_project(&mut self, project_dir: Option<&Path>) -> Result<()> {
      let store = self.store.as_mut().ok_or(Error::NotConfigured)?;
      store.set_project(project_dir);
      let paths = store.watched_paths();

      let Some(on_change) = self.on_change.clone() else {
         return Ok(());
      };
      if let Err(e) = self.watcher.start(&paths, on_change) {
         tracing::error!("failed to restart settings watcher: {e}");
      }
      Ok(())
   }

   pub fn shutdown(&mut self) {
      self.watcher.stop();
   }
}
