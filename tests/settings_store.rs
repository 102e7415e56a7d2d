mod support;

use std::fs;

use aicd::{
   error::StoreError,
   settings::{AssetKind, AssetStatus, PartialSettings, SettingsSnapshot, SettingsStore, Tier},
};
use proptest::prelude::*;
use support::Fixture;
use toml::{Table, Value};

fn status_strategy() -> impl Strategy<Value = AssetStatus> {
   prop_oneof![
      Just(AssetStatus::Enabled),
      Just(AssetStatus::Disabled),
      Just(AssetStatus::Forced),
   ]
}

fn scalar_strategy() -> impl Strategy<Value = Value> {
   prop_oneof![
      any::<bool>().prop_map(Value::Boolean),
      any::<i32>().prop_map(|n| Value::Integer(i64::from(n))),
      "[a-z]{0,8}".prop_map(Value::String),
   ]
}

proptest! {
   #[test]
   fn project_scalars_override_global(
      global in prop::collection::btree_map("[a-e]", scalar_strategy(), 0..5),
      project in prop::collection::btree_map("[c-h]", scalar_strategy(), 0..5),
   ) {
      let tmp = tempfile::tempdir().unwrap();
      let project_dir = tmp.path().join("project");
      fs::create_dir_all(&project_dir).unwrap();
      let store = SettingsStore::new(tmp.path().join("global.toml")).with_project(&project_dir);

      let global_table: Table = global.clone().into_iter().collect();
      let project_table: Table = project.clone().into_iter().collect();
      fs::write(store.global_path(), toml::to_string(&global_table).unwrap()).unwrap();
      fs::write(store.project_path().unwrap(), toml::to_string(&project_table).unwrap()).unwrap();

      let merged = store.load().unwrap();

      for (key, value) in &project {
         prop_assert_eq!(merged.get(key), Some(value));
      }
      for (key, value) in global.iter().filter(|(k, _)| !project.contains_key(*k)) {
         prop_assert_eq!(merged.get(key), Some(value));
      }
      prop_assert_eq!(merged.len(), global.keys().chain(project.keys()).collect::<std::collections::BTreeSet<_>>().len());
   }

   #[test]
   fn repeated_writes_are_idempotent(
      entries in prop::collection::vec(("[a-z]{1,6}", status_strategy()), 1..6),
      autorun in any::<bool>(),
   ) {
      let tmp = tempfile::tempdir().unwrap();
      let store = SettingsStore::new(tmp.path().join("settings.toml"));
      let mut partial = PartialSettings { code_autorun: Some(autorun), ..PartialSettings::default() };
      for (id, status) in &entries {
         partial.materials.set(id.clone(), *status);
      }

      store.write(&partial, Tier::Global).unwrap();
      let once = fs::read_to_string(store.global_path()).unwrap();
      store.write(&partial, Tier::Global).unwrap();
      let twice = fs::read_to_string(store.global_path()).unwrap();

      prop_assert_eq!(once, twice);
   }
}

#[test]
fn missing_documents_load_as_defaults() {
   let fixture = Fixture::new();
   let merged = fixture.store().load().unwrap();
   assert!(merged.is_empty());

   let (snapshot, warnings) = SettingsSnapshot::from_table(&merged);
   assert_eq!(snapshot, SettingsSnapshot::default());
   assert!(warnings.is_empty());
   assert_eq!(snapshot.user_profile.username, "user");
}

#[test]
fn unparseable_document_is_a_parse_error() {
   let fixture = Fixture::new();
   fixture.write_global("code_autorun = \n[[[");
   let err = fixture.store().load().unwrap_err();
   assert!(matches!(err, StoreError::Parse { .. }));
}

#[test]
fn write_creates_parents_and_leaves_no_temp_file() {
   let fixture = Fixture::new();
   let store = fixture.store();
   store
      .write(&PartialSettings::with_status(AssetKind::Agent, "coder", AssetStatus::Forced), Tier::Global)
      .unwrap();

   let dir = store.global_path().parent().unwrap();
   let names: Vec<String> = fs::read_dir(dir)
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
      .collect();
   assert_eq!(names, ["settings.toml"]);
}

#[test]
fn write_keeps_unrelated_keys() {
   let fixture = Fixture::new();
   fixture.write_global("openai_api_key = \"sk-1\"\ncustom = 3\n[agents]\nwriter = \"disabled\"\n");
   let store = fixture.store();

   store
      .write(
         &PartialSettings { code_autorun: Some(true), ..PartialSettings::default() },
         Tier::Global,
      )
      .unwrap();

   let doc = store.read(Tier::Global).unwrap();
   assert_eq!(doc.get("openai_api_key").and_then(Value::as_str), Some("sk-1"));
   assert_eq!(doc.get("custom").and_then(Value::as_integer), Some(3));
   assert_eq!(doc.get("code_autorun").and_then(Value::as_bool), Some(true));
   assert_eq!(doc["agents"]["writer"].as_str(), Some("disabled"));
}

#[test]
fn project_tier_targets_project_document() {
   let fixture = Fixture::new();
   let project = tempfile::tempdir().unwrap();
   let store = fixture.store().with_project(project.path());

   store
      .write(&PartialSettings::with_status(AssetKind::Material, "notes", AssetStatus::Disabled), Tier::Project)
      .unwrap();

   assert!(project.path().join("settings.toml").exists());
   assert!(!fixture.global_settings().exists());
   let (snapshot, _) = SettingsSnapshot::from_table(&store.load().unwrap());
   assert_eq!(snapshot.materials.get("notes"), Some(AssetStatus::Disabled));
}

#[test]
fn project_arrays_append_after_global() {
   let fixture = Fixture::new();
   fixture.write_global("recent = [\"a\"]\n");
   let project = tempfile::tempdir().unwrap();
   fs::write(project.path().join("settings.toml"), "recent = [\"b\"]\n").unwrap();

   let merged = fixture.store().with_project(project.path()).load().unwrap();
   let recent: Vec<&str> = merged["recent"]
      .as_array()
      .unwrap()
      .iter()
      .filter_map(Value::as_str)
      .collect();
   assert_eq!(recent, ["a", "b"]);
}
