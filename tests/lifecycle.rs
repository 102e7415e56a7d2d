mod support;

use std::{fs, sync::Arc, time::Duration};

use aicd::{
   Error,
   project::{ProjectState, RecentProjects},
   protocol::{ProjectInfo, ServerMessage},
   registry::ConnectionRegistry,
   settings::{AssetKind, AssetStatus},
};
use support::{
   FakeSource, Fixture, RecordingExec, RecordingProvisioner, connect, drain, type_names,
};

const WINDOW: Duration = Duration::from_secs(30);

fn demo_project() -> (tempfile::TempDir, std::path::PathBuf) {
   let tmp = tempfile::tempdir().unwrap();
   let dir = tmp.path().join("demo");
   fs::create_dir_all(&dir).unwrap();
   let dir = fs::canonicalize(dir).unwrap();
   (tmp, dir)
}

#[tokio::test]
async fn choosing_missing_directory_changes_nothing() {
   let fixture = Fixture::new();
   let source = Arc::new(FakeSource::default());
   let exec = Arc::new(RecordingExec::default());
   let mut controller = fixture.controller(Arc::clone(&source), Arc::clone(&exec), None);
   let mut settings = fixture.settings(WINDOW);
   let mut registry = ConnectionRegistry::new();
   let (_id, mut rx) = connect(&mut registry);

   let missing = fixture.home.path().join("does-not-exist");
   let err = controller
      .choose_project(&missing, &mut registry, &mut settings)
      .await
      .unwrap_err();

   assert!(matches!(err, Error::NotFound { .. }));
   assert_eq!(controller.state(), &ProjectState::Uninitialized);
   assert!(drain(&mut rx).is_empty());
   assert!(exec.working_dirs.lock().is_empty());
   assert_eq!(source.opened.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn choosing_project_broadcasts_in_order() {
   let fixture = Fixture::new();
   let (_tmp, dir) = demo_project();
   let source = Arc::new(
      FakeSource::default()
         .with_agent("coder", AssetStatus::Enabled)
         .with_material("notes", AssetStatus::Enabled)
         .with_material("guide", AssetStatus::Disabled),
   );
   let exec = Arc::new(RecordingExec::default());
   let mut controller = fixture.controller(source, Arc::clone(&exec), None);
   let mut settings = fixture.settings(WINDOW);
   let mut registry = ConnectionRegistry::new();
   let (_id, mut rx) = connect(&mut registry);

   controller
      .choose_project(&dir, &mut registry, &mut settings)
      .await
      .unwrap();

   let messages = drain(&mut rx);
   assert_eq!(type_names(&messages), [
      "project_loading",
      "project_opened",
      "assets_changed",
      "assets_changed",
      "settings_changed",
   ]);
   assert_eq!(messages[1], ServerMessage::ProjectOpened {
      path: dir.display().to_string(),
      name: "demo".to_string(),
   });
   assert_eq!(messages[2], ServerMessage::AssetsChanged {
      asset_kind: AssetKind::Material,
      initial:    true,
      count:      2,
   });
   assert_eq!(messages[4], ServerMessage::SettingsChanged { initial: true, refresh: true });

   assert_eq!(controller.current(), Some(ProjectInfo {
      path: dir.display().to_string(),
      name: "demo".to_string(),
   }));
   assert_eq!(exec.working_dirs.lock().as_slice(), [dir.clone()]);
   assert!(controller.collection(AssetKind::Agent).is_some());
}

#[tokio::test]
async fn project_settings_layer_over_global_after_open() {
   let fixture = Fixture::new();
   fixture.write_global("code_autorun = false\n[agents]\ncoder = \"disabled\"\n");
   let (_tmp, dir) = demo_project();
   fs::write(dir.join("settings.toml"), "code_autorun = true\n").unwrap();

   let mut controller = fixture.controller(
      Arc::new(FakeSource::default()),
      Arc::new(RecordingExec::default()),
      None,
   );
   let mut settings = fixture.settings(WINDOW);
   let mut registry = ConnectionRegistry::new();

   controller
      .choose_project(&dir, &mut registry, &mut settings)
      .await
      .unwrap();
   assert!(settings.snapshot().code_autorun);
   assert_eq!(settings.snapshot().agents.get("coder"), Some(AssetStatus::Disabled));

   controller
      .close_project(&mut registry, &mut settings)
      .await
      .unwrap();
   assert!(!settings.snapshot().code_autorun);
}

#[tokio::test]
async fn switching_projects_tears_down_previous() {
   let fixture = Fixture::new();
   let (_tmp_a, first) = demo_project();
   let second_tmp = tempfile::tempdir().unwrap();
   let second = fs::canonicalize(second_tmp.path()).unwrap();
   let source = Arc::new(FakeSource::default());
   let exec = Arc::new(RecordingExec::default());
   let mut controller = fixture.controller(Arc::clone(&source), Arc::clone(&exec), None);
   let mut settings = fixture.settings(WINDOW);
   let mut registry = ConnectionRegistry::new();

   controller
      .choose_project(&first, &mut registry, &mut settings)
      .await
      .unwrap();
   controller
      .choose_project(&second, &mut registry, &mut settings)
      .await
      .unwrap();

   assert_eq!(source.stopped(), 2, "both collections of the first project are stopped");
   assert_eq!(exec.resets(), 2);
   assert_eq!(controller.project_dir(), Some(second.as_path()));

   let recent: Vec<_> = fixture.recent().list().unwrap().into_iter().map(|e| e.path).collect();
   assert_eq!(recent, [second.clone(), first.clone()]);
}

#[tokio::test]
async fn equivalent_spellings_open_the_same_project() {
   let fixture = Fixture::new();
   let (_tmp, dir) = demo_project();
   fs::create_dir_all(dir.join("sub")).unwrap();
   let exec = Arc::new(RecordingExec::default());
   let mut controller =
      fixture.controller(Arc::new(FakeSource::default()), Arc::clone(&exec), None);
   let mut settings = fixture.settings(WINDOW);
   let mut registry = ConnectionRegistry::new();

   controller
      .choose_project(&dir, &mut registry, &mut settings)
      .await
      .unwrap();
   let (_id, mut rx) = connect(&mut registry);
   controller
      .choose_project(&dir.join("sub").join(".."), &mut registry, &mut settings)
      .await
      .unwrap();

   let opened: Vec<_> = drain(&mut rx)
      .into_iter()
      .filter(|m| matches!(m, ServerMessage::ProjectOpened { .. }))
      .collect();
   assert_eq!(opened, [ServerMessage::ProjectOpened {
      path: dir.display().to_string(),
      name: "demo".to_string(),
   }]);
   assert_eq!(controller.project_dir(), Some(dir.as_path()));
   assert_eq!(exec.working_dirs.lock().as_slice(), [dir.clone(), dir.clone()]);

   let recent = fixture.recent().list().unwrap();
   assert_eq!(recent.len(), 1);
   assert_eq!(recent[0].path, dir);
   assert_eq!(recent[0].name, "demo");
}

#[tokio::test]
async fn close_project_notifies_and_resets() {
   let fixture = Fixture::new();
   let (_tmp, dir) = demo_project();
   let source = Arc::new(FakeSource::default());
   let exec = Arc::new(RecordingExec::default());
   let mut controller = fixture.controller(Arc::clone(&source), Arc::clone(&exec), None);
   let mut settings = fixture.settings(WINDOW);
   let mut registry = ConnectionRegistry::new();
   let (_id, mut rx) = connect(&mut registry);

   controller
      .choose_project(&dir, &mut registry, &mut settings)
      .await
      .unwrap();
   drain(&mut rx);

   controller
      .close_project(&mut registry, &mut settings)
      .await
      .unwrap();

   assert_eq!(type_names(&drain(&mut rx)), ["project_closed", "settings_changed"]);
   assert_eq!(controller.state(), &ProjectState::Uninitialized);
   assert!(controller.collection(AssetKind::Material).is_none());
   assert_eq!(source.stopped(), 2);
}

#[tokio::test]
async fn project_init_reports_current_project() {
   let fixture = Fixture::new();
   let (_tmp, dir) = demo_project();
   let mut controller = fixture.controller(
      Arc::new(FakeSource::default()),
      Arc::new(RecordingExec::default()),
      None,
   );
   let mut settings = fixture.settings(WINDOW);
   let mut registry = ConnectionRegistry::new();
   let (id, mut rx) = connect(&mut registry);

   controller.send_project_init(&id, &mut registry).unwrap();
   assert_eq!(drain(&mut rx), [ServerMessage::InitialProjectStatus {
      project_path: None,
      project_name: None,
   }]);

   controller
      .choose_project(&dir, &mut registry, &mut settings)
      .await
      .unwrap();
   drain(&mut rx);

   controller.send_project_init(&id, &mut registry).unwrap();
   assert_eq!(drain(&mut rx), [ServerMessage::InitialProjectStatus {
      project_path: Some(dir.display().to_string()),
      project_name: Some("demo".to_string()),
   }]);
}

#[tokio::test]
async fn provisioning_runs_in_background() {
   let fixture = Fixture::new();
   let (_tmp, dir) = demo_project();
   let provisioner = Arc::new(RecordingProvisioner { fail: true, ..Default::default() });
   let mut controller = fixture.controller(
      Arc::new(FakeSource::default()),
      Arc::new(RecordingExec::default()),
      Some(Arc::clone(&provisioner)),
   );
   let mut settings = fixture.settings(WINDOW);
   let mut registry = ConnectionRegistry::new();

   controller
      .choose_project(&dir, &mut registry, &mut settings)
      .await
      .unwrap();

   for _ in 0..50 {
      if !provisioner.projects.lock().is_empty() {
         break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
   }
   assert_eq!(provisioner.projects.lock().as_slice(), [dir.clone()]);
   assert!(controller.is_opened(), "provisioning failure does not affect the project");
}

#[tokio::test]
async fn lifecycle_call_while_busy_is_refused() {
   let fixture = Fixture::new();
   let (_tmp, dir) = demo_project();
   let mut controller = fixture.controller(
      Arc::new(FakeSource::default()),
      Arc::new(RecordingExec::default()),
      None,
   );
   let mut settings = fixture.settings(WINDOW);
   let mut registry = ConnectionRegistry::new();

   let guard = controller.guard();
   let in_flight = guard.try_begin("switch").unwrap();

   let err = controller
      .choose_project(&dir, &mut registry, &mut settings)
      .await
      .unwrap_err();
   assert!(matches!(err, Error::Busy("switch")));
   assert!(matches!(
      controller.close_project(&mut registry, &mut settings).await,
      Err(Error::Busy(_))
   ));

   drop(in_flight);
   controller
      .choose_project(&dir, &mut registry, &mut settings)
      .await
      .unwrap();
}

#[tokio::test]
async fn reinitialize_requires_open_project() {
   let fixture = Fixture::new();
   let (_tmp, dir) = demo_project();
   let source = Arc::new(FakeSource::default());
   let mut controller =
      fixture.controller(Arc::clone(&source), Arc::new(RecordingExec::default()), None);
   let mut settings = fixture.settings(WINDOW);
   let mut registry = ConnectionRegistry::new();

   assert!(matches!(
      controller.reinitialize_project(&mut registry, &mut settings).await,
      Err(Error::NotFound { .. })
   ));

   controller
      .choose_project(&dir, &mut registry, &mut settings)
      .await
      .unwrap();
   let (_id, mut rx) = connect(&mut registry);
   controller
      .reinitialize_project(&mut registry, &mut settings)
      .await
      .unwrap();

   assert_eq!(type_names(&drain(&mut rx))[..2], ["project_loading", "project_opened"]);
   assert_eq!(source.opened.load(std::sync::atomic::Ordering::SeqCst), 4);
}

#[test]
fn recent_projects_default_bound_is_respected() {
   let tmp = tempfile::tempdir().unwrap();
   let recent = RecentProjects::new(tmp.path().join("recent.json"), 15);
   for i in 0..20 {
      recent.add(&tmp.path().join(format!("p{i}"))).unwrap();
   }
   let entries = recent.list().unwrap();
   assert_eq!(entries.len(), 15);
   assert_eq!(entries[0].name, "p19");
}
