//! Offline settings inspection and editing.
//!
//! These commands work on the documents directly; a running server picks the
//! change up through its file watcher.

use std::path::{Path, PathBuf};

use console::style;

use crate::{
   Result,
   config::Config,
   error::Error,
   settings::{AssetKind, AssetStatus, PartialSettings, SettingsSnapshot, SettingsStore, Tier},
};

fn open_store(project: Option<&Path>) -> Result<SettingsStore> {
   let mut store = SettingsStore::new(Config::load().global_settings_path());
   if let Some(dir) = project {
      if !dir.is_dir() {
         return Err(Error::not_found("project directory", dir.display().to_string()));
      }
      store.set_project(Some(dir));
   }
   Ok(store)
}

pub fn show(project: Option<PathBuf>, json: bool) -> Result<()> {
   let store = open_store(project.as_deref())?;
   let (mut snapshot, mut warnings) = SettingsSnapshot::from_table(&store.load()?);
   warnings.extend(snapshot.enforce_single_forced_agent());

   if json {
      println!("{}", serde_json::to_string_pretty(&snapshot)?);
      return Ok(());
   }

   println!("{}", style("Settings").bold());
   println!("  global:  {}", style(store.global_path().display()).dim());
   if let Some(path) = store.project_path() {
      println!("  project: {}", style(path.display()).dim());
   }
   println!("  code_autorun:   {}", snapshot.code_autorun);
   println!(
      "  openai_api_key: {}",
      if snapshot.openai_api_key.is_some() { "set" } else { "not set" }
   );
   println!("  username:       {}", snapshot.user_profile.username);

   for kind in AssetKind::ALL {
      let overrides = snapshot.overrides(kind);
      if overrides.is_empty() {
         continue;
      }
      println!("{}", style(kind.plural()).bold());
      for (id, status) in overrides.iter() {
         let status = match status {
            AssetStatus::Forced => style(status.as_str()).green(),
            AssetStatus::Disabled => style(status.as_str()).red(),
            AssetStatus::Enabled => style(status.as_str()),
         };
         println!("  {id}: {status}");
      }
   }

   for warning in &warnings {
      println!("{} {warning}", style("warning:").yellow());
   }
   Ok(())
}

pub fn set_autorun(value: bool, project: Option<PathBuf>) -> Result<()> {
   let partial = PartialSettings { code_autorun: Some(value), ..PartialSettings::default() };
   write(&partial, project.as_deref())?;
   println!("code_autorun = {}", style(value).cyan());
   Ok(())
}

pub fn set_status(kind: &str, id: &str, status: &str, project: Option<PathBuf>) -> Result<()> {
   let kind = AssetKind::from_plural(kind).ok_or_else(|| Error::not_found("asset type", kind))?;
   let status = AssetStatus::parse(status).ok_or_else(|| Error::not_found("asset status", status))?;
   write(&PartialSettings::with_status(kind, id, status), project.as_deref())?;
   println!("{} {id} = {}", kind, style(status).cyan());
   Ok(())
}

fn write(partial: &PartialSettings, project: Option<&Path>) -> Result<()> {
   let store = open_store(project)?;
   let tier = Tier::from_global_flag(project.is_none());
   store.write(partial, tier)?;
   Ok(())
}
