#![allow(dead_code)]

use std::{
   path::{Path, PathBuf},
   sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
   },
   time::Duration,
};

use aicd::{
   Error,
   project::{
      AssetCollection, AssetDescriptor, AssetSource, ExecutionContext, ProjectController,
      Provisioner, RecentProjects,
   },
   protocol::ServerMessage,
   registry::{ConnectionId, ConnectionRegistry},
   settings::{AssetKind, AssetStatus, ChangeCallback, SettingsService, SettingsStore},
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Execution context that records every call instead of touching the process.
#[derive(Debug, Default)]
pub struct RecordingExec {
   pub working_dirs: Mutex<Vec<PathBuf>>,
   pub credential:   Mutex<Option<String>>,
   pub resets:       AtomicUsize,
}

impl RecordingExec {
   pub fn resets(&self) -> usize {
      self.resets.load(Ordering::SeqCst)
   }

   pub fn credential(&self) -> Option<String> {
      self.credential.lock().clone()
   }
}

impl ExecutionContext for RecordingExec {
   fn set_working_dir(&self, dir: &Path) -> aicd::Result<()> {
      self.working_dirs.lock().push(dir.to_path_buf());
      Ok(())
   }

   fn set_credential(&self, key: Option<&str>) {
      *self.credential.lock() = key.map(String::from);
   }

   fn reset(&self) {
      self.resets.fetch_add(1, Ordering::SeqCst);
   }
}

pub struct FakeAsset {
   pub id:             String,
   pub default_status: AssetStatus,
}

impl AssetDescriptor for FakeAsset {
   fn id(&self) -> &str {
      &self.id
   }

   fn default_status(&self) -> AssetStatus {
      self.default_status
   }
}

pub struct FakeCollection {
   kind:    AssetKind,
   assets:  Vec<FakeAsset>,
   delay:   Duration,
   stopped: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl AssetCollection for FakeCollection {
   fn kind(&self) -> AssetKind {
      self.kind
   }

   async fn reload(&mut self, _initial: bool) -> aicd::Result<usize> {
      if !self.delay.is_zero() {
         tokio::time::sleep(self.delay).await;
      }
      Ok(self.assets.len())
   }

   fn stop(&mut self) {
      self.stopped.fetch_add(1, Ordering::SeqCst);
   }

   fn all_assets(&self) -> Vec<&dyn AssetDescriptor> {
      self
         .assets
         .iter()
         .map(|a| a as &dyn AssetDescriptor)
         .collect()
   }

   fn get_asset(&self, id: &str) -> Option<&dyn AssetDescriptor> {
      self
         .assets
         .iter()
         .find(|a| a.id == id)
         .map(|a| a as &dyn AssetDescriptor)
   }
}

/// Asset source handing out in-memory collections.
#[derive(Default)]
pub struct FakeSource {
   pub agents:    Vec<(String, AssetStatus)>,
   pub materials: Vec<(String, AssetStatus)>,
   pub delay:     Duration,
   pub opened:    AtomicUsize,
   pub stopped:   Arc<AtomicUsize>,
}

impl FakeSource {
   pub fn with_agent(mut self, id: &str, default_status: AssetStatus) -> Self {
      self.agents.push((id.to_string(), default_status));
      self
   }

   pub fn with_material(mut self, id: &str, default_status: AssetStatus) -> Self {
      self.materials.push((id.to_string(), default_status));
      self
   }

   pub fn slow(mut self, delay: Duration) -> Self {
      self.delay = delay;
      self
   }

   pub fn stopped(&self) -> usize {
      self.stopped.load(Ordering::SeqCst)
   }
}

impl AssetSource for FakeSource {
   fn open(&self, kind: AssetKind, _project_dir: &Path) -> Box<dyn AssetCollection> {
      self.opened.fetch_add(1, Ordering::SeqCst);
      let entries = match kind {
         AssetKind::Agent => &self.agents,
         AssetKind::Material => &self.materials,
      };
      Box::new(FakeCollection {
         kind,
         assets: entries
            .iter()
            .map(|(id, status)| FakeAsset { id: id.clone(), default_status: *status })
            .collect(),
         delay: self.delay,
         stopped: Arc::clone(&self.stopped),
      })
   }
}

/// Provisioner that records the projects it was asked to prepare.
#[derive(Default)]
pub struct RecordingProvisioner {
   pub projects: Mutex<Vec<PathBuf>>,
   pub fail:     bool,
}

#[async_trait::async_trait]
impl Provisioner for RecordingProvisioner {
   async fn provision(&self, project_dir: &Path) -> aicd::Result<()> {
      self.projects.lock().push(project_dir.to_path_buf());
      if self.fail {
         return Err(Error::Provision { reason: "python not available".to_string() });
      }
      Ok(())
   }
}

/// Isolated global settings + recent projects under one temp dir.
pub struct Fixture {
   pub home: TempDir,
}

impl Fixture {
   pub fn new() -> Self {
      Self { home: tempfile::tempdir().unwrap() }
   }

   pub fn global_settings(&self) -> PathBuf {
      self.home.path().join("config/settings.toml")
   }

   pub fn store(&self) -> SettingsStore {
      SettingsStore::new(self.global_settings())
   }

   pub fn recent(&self) -> RecentProjects {
      RecentProjects::new(self.home.path().join("recent_projects.json"), 15)
   }

   pub fn write_global(&self, raw: &str) {
      let path = self.global_settings();
      std::fs::create_dir_all(path.parent().unwrap()).unwrap();
      std::fs::write(path, raw).unwrap();
   }

   /// A configured settings service whose watcher callback does nothing.
   pub fn settings(&self, suppression_window: Duration) -> SettingsService {
      let mut service = SettingsService::new(Duration::from_millis(100), suppression_window);
      service.configure(self.store(), noop_callback()).unwrap();
      service
   }

   pub fn controller(
      &self,
      source: Arc<FakeSource>,
      exec: Arc<RecordingExec>,
      provisioner: Option<Arc<RecordingProvisioner>>,
   ) -> ProjectController {
      ProjectController::new(
         source,
         exec,
         self.recent(),
         provisioner.map(|p| p as Arc<dyn Provisioner>),
      )
   }
}

pub fn noop_callback() -> ChangeCallback {
   Arc::new(|| {})
}

/// Registers a connection and returns its id with the receiving end of its
/// outbox.
pub fn connect(
   registry: &mut ConnectionRegistry,
) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
   let (tx, rx) = mpsc::unbounded_channel();
   (registry.connect(tx), rx)
}

/// Everything queued for a connection so far.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
   let mut out = Vec::new();
   while let Ok(msg) = rx.try_recv() {
      out.push(msg);
   }
   out
}

pub fn type_names(messages: &[ServerMessage]) -> Vec<&'static str> {
   messages.iter().map(ServerMessage::type_name).collect()
}

/// Waits until `rx` yields a message matching `pred`, skipping others.
pub async fn wait_for(
   rx: &mut mpsc::UnboundedReceiver<ServerMessage>,
   timeout: Duration,
   pred: impl Fn(&ServerMessage) -> bool,
) -> Option<ServerMessage> {
   tokio::time::timeout(timeout, async {
      while let Some(msg) = rx.recv().await {
         if pred(&msg) {
            return Some(msg);
         }
      }
      None
   })
   .await
   .ok()
   .flatten()
}
