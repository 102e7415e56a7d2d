//! Project lifecycle: opening, switching and closing the workspace directory
//! the console operates on.
//!
//! Every transition keeps clients informed through ordered broadcasts:
//! `project_loading`, then `project_opened` (or `project_closed`), then the
//! asset and settings notifications of the new state.

pub mod assets;
pub mod exec;
pub mod provision;
pub mod recent;

use std::{
   path::{Path, PathBuf},
   sync::Arc,
};

pub use assets::{AssetCollection, AssetDescriptor, AssetSource, DirectoryAssets, DirectorySource};
pub use exec::{ExecutionContext, ProcessExecution};
use parking_lot::Mutex;
pub use provision::{Provisioner, VenvProvisioner};
pub use recent::{RecentProject, RecentProjects};

use crate::{
   Result,
   error::Error,
   protocol::{ProjectInfo, ServerMessage},
   registry::{ConnectionId, ConnectionRegistry},
   settings::{AssetKind, SettingsService},
   util,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectState {
   Uninitialized,
   Loading,
   Opened { path: PathBuf, name: String },
}

/// Tracks the lifecycle operation currently running, if any. Cloned into the
/// request handlers so a second switch is refused while one is in progress.
#[derive(Debug, Clone, Default)]
pub struct LifecycleGuard {
   running: Arc<Mutex<Option<&'static str>>>,
}

impl LifecycleGuard {
   pub fn running(&self) -> Option<&'static str> {
      *self.running.lock()
   }

   pub fn check(&self) -> Result<()> {
      match self.running() {
         Some(op) => Err(Error::Busy(op)),
         None => Ok(()),
      }
   }

   pub fn try_begin(&self, op: &'static str) -> Result<InFlight> {
      let mut running = self.running.lock();
      if let Some(current) = *running {
         return Err(Error::Busy(current));
      }
      *running = Some(op);
      Ok(InFlight { running: Arc::clone(&self.running) })
   }
}

/// Marks a lifecycle operation as running until dropped.
#[must_use]
pub struct InFlight {
   running: Arc<Mutex<Option<&'static str>>>,
}

impl Drop for InFlight {
   fn drop(&mut self) {
      *self.running.lock() = None;
   }
}

pub struct ProjectController {
   state:       ProjectState,
   materials:   Option<Box<dyn AssetCollection>>,
   agents:      Option<Box<dyn AssetCollection>>,
   source:      Arc<dyn AssetSource>,
   exec:        Arc<dyn ExecutionContext>,
   recent:      RecentProjects,
   provisioner: Option<Arc<dyn Provisioner>>,
   guard:       LifecycleGuard,
}

impl ProjectController {
   pub fn new(
      source: Arc<dyn AssetSource>,
      exec: Arc<dyn ExecutionContext>,
      recent: RecentProjects,
      provisioner: Option<Arc<dyn Provisioner>>,
   ) -> Self {
      Self {
         state: ProjectState::Uninitialized,
         materials: None,
         agents: None,
         source,
         exec,
         recent,
         provisioner,
         guard: LifecycleGuard::default(),
      }
   }

   pub fn state(&self) -> &ProjectState {
      &self.state
   }

   pub fn is_opened(&self) -> bool {
      matches!(self.state, ProjectState::Opened { .. })
   }

   pub fn current(&self) -> Option<ProjectInfo> {
      match &self.state {
         ProjectState::Opened { path, name } => {
            Some(ProjectInfo { path: path.display().to_string(), name: name.clone() })
         },
         _ => None,
      }
   }

   pub fn project_dir(&self) -> Option<&Path> {
      match &self.state {
         ProjectState::Opened { path, .. } => Some(path),
         _ => None,
      }
   }

   pub fn collection(&self, kind: AssetKind) -> Option<&dyn AssetCollection> {
      let collection = match kind {
         AssetKind::Agent => self.agents.as_deref(),
         AssetKind::Material => self.materials.as_deref(),
      };
      collection.filter(|_| self.is_opened())
   }

   pub fn exec(&self) -> &dyn ExecutionContext {
      self.exec.as_ref()
   }

   pub fn recent(&self) -> &RecentProjects {
      &self.recent
   }

   pub fn guard(&self) -> LifecycleGuard {
      self.guard.clone()
   }

   /// Tells one connection which project is open.
   pub fn send_project_init(&self, id: &ConnectionId, registry: &mut ConnectionRegistry) -> Result<()> {
      let (project_path, project_name) = match self.current() {
         Some(info) => (Some(info.path), Some(info.name)),
         None => (None, None),
      };
      registry.send_to(id, ServerMessage::InitialProjectStatus { project_path, project_name })
   }

   /// Switches to the project at `path`. The directory must exist; on failure
   /// the current state is left untouched. The path is canonicalized, so `..`
   /// components and symlinks resolve to the directory they point at.
   pub async fn choose_project(
      &mut self,
      path: &Path,
      registry: &mut ConnectionRegistry,
      settings: &mut SettingsService,
   ) -> Result<()> {
      let _in_flight = self.guard.try_begin("switch")?;

      if !path.is_dir() {
         return Err(Error::not_found("project directory", path.display().to_string()));
      }
      let path = tokio::fs::canonicalize(path).await?;

      self.exec.set_working_dir(&path)?;
      self.open(path.clone(), registry, settings).await?;
      self.spawn_provisioning(path);
      Ok(())
   }

   /// Rebuilds every project resource of the open project from scratch.
   pub async fn reinitialize_project(
      &mut self,
      registry: &mut ConnectionRegistry,
      settings: &mut SettingsService,
   ) -> Result<()> {
      let _in_flight = self.guard.try_begin("reinitialization")?;
      let path = self
         .project_dir()
         .map(Path::to_path_buf)
         .ok_or_else(|| Error::not_found("open project", "none"))?;
      self.open(path, registry, settings).await
   }

   async fn open(
      &mut self,
      path: PathBuf,
      registry: &mut ConnectionRegistry,
      settings: &mut SettingsService,
   ) -> Result<()> {
      registry.broadcast(&ServerMessage::ProjectLoading);
      self.teardown();
      self.state = ProjectState::Loading;

      if let Err(e) = self.recent.add(&path) {
         tracing::warn!("failed to record recent project {}: {e}", path.display());
      }

      let name = util::project_name(&path);
      self.materials = Some(self.source.open(AssetKind::Material, &path));
      self.agents = Some(self.source.open(AssetKind::Agent, &path));
      self.state = ProjectState::Opened { path: path.clone(), name: name.clone() };
      tracing::info!("project {name} opened at {}", path.display());
      registry.broadcast(&ServerMessage::ProjectOpened { path: path.display().to_string(), name });

      for collection in [self.materials.as_deref_mut(), self.agents.as_deref_mut()]
         .into_iter()
         .flatten()
      {
         let kind = collection.kind();
         match collection.reload(true).await {
            Ok(count) => {
               registry.broadcast(&ServerMessage::AssetsChanged { asset_kind: kind, initial: true, count });
            },
            Err(e) => tracing::warn!("failed to load {kind}s: {e}"),
         }
      }

      settings.change_project(Some(&path))?;
      // Store failures are logged by reload; the project stays open.
      let _ = settings.reload(true, registry, self.exec.as_ref());
      Ok(())
   }

   /// Closes the open project and falls back to global settings only.
   pub async fn close_project(
      &mut self,
      registry: &mut ConnectionRegistry,
      settings: &mut SettingsService,
   ) -> Result<()> {
      let _in_flight = self.guard.try_begin("close")?;

      self.teardown();
      tracing::info!("project closed");
      registry.broadcast(&ServerMessage::ProjectClosed);

      settings.change_project(None)?;
      let _ = settings.reload(true, registry, self.exec.as_ref());
      Ok(())
   }

   fn teardown(&mut self) {
      if let Some(mut materials) = self.materials.take() {
         materials.stop();
      }
      if let Some(mut agents) = self.agents.take() {
         agents.stop();
      }
      self.exec.reset();
      self.state = ProjectState::Uninitialized;
   }

   fn spawn_provisioning(&self, project_dir: PathBuf) {
      let Some(provisioner) = self.provisioner.clone() else {
         return;
      };
      tokio::spawn(async move {
         match provisioner.provision(&project_dir).await {
            Ok(()) => tracing::info!("environment ready for {}", project_dir.display()),
            Err(e) => {
               tracing::error!("failed to provision environment for {}: {e}", project_dir.display());
            },
         }
      });
   }

   /// Stops collections on shutdown.
   pub fn shutdown(&mut self) {
      self.teardown();
   }
}
