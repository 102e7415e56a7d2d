//! The console event loop.
//!
//! One task owns the connection registry, the settings service and the
//! project controller. WebSocket readers, HTTP handlers and the settings
//! watcher never touch that state directly; they enqueue [`Command`]s through
//! a [`ConsoleHandle`] and, where needed, wait for the reply.

use std::{collections::VecDeque, path::PathBuf, sync::Arc};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
   Result,
   error::Error,
   project::{LifecycleGuard, ProjectController, RecentProject},
   protocol::{ClientMessage, ProjectInfo, ServerMessage},
   registry::{ConnectionId, ConnectionRegistry, Outbox},
   settings::{
      AssetKind, AssetStatus, ChangeCallback, PartialSettings, SettingsService, SettingsSnapshot,
      SettingsStore, Tier,
   },
};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Settings as returned to API callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsView {
   #[serde(flatten)]
   pub settings: SettingsSnapshot,
   pub warnings: Vec<String>,
}

pub enum Command {
   Connect {
      outbox: Outbox,
      reply:  oneshot::Sender<ConnectionId>,
   },
   Disconnect {
      id: ConnectionId,
   },
   Client {
      id:      ConnectionId,
      message: ClientMessage,
   },
   /// A client sent something that could not be parsed.
   Invalid {
      id:     ConnectionId,
      reason: String,
   },
   SettingsFileChanged,
   ChooseProject {
      path:  PathBuf,
      reply: Reply<ProjectInfo>,
   },
   CloseProject {
      reply: Reply<()>,
   },
   CurrentProject {
      reply: oneshot::Sender<Option<ProjectInfo>>,
   },
   RecentProjects {
      reply: Reply<Vec<RecentProject>>,
   },
   GetSettings {
      reply: oneshot::Sender<SettingsView>,
   },
   PatchSettings {
      partial: PartialSettings,
      tier:    Tier,
      reply:   Reply<SettingsView>,
   },
   GetAssetStatus {
      kind:  AssetKind,
      id:    String,
      reply: Reply<AssetStatus>,
   },
   SetAssetStatus {
      kind:      AssetKind,
      id:        String,
      status:    AssetStatus,
      to_global: bool,
      reply:     Reply<()>,
   },
   RenameAsset {
      kind:   AssetKind,
      old_id: String,
      new_id: String,
      reply:  Reply<bool>,
   },
}

pub struct Console {
   registry: ConnectionRegistry,
   settings: SettingsService,
   project:  ProjectController,
   rx:       mpsc::UnboundedReceiver<Command>,
   pending:  VecDeque<Command>,
}

impl Console {
   pub fn new(settings: SettingsService, project: ProjectController) -> (Self, ConsoleHandle) {
      let (tx, rx) = mpsc::unbounded_channel();
      let handle = ConsoleHandle { tx, guard: project.guard() };
      let console = Self {
         registry: ConnectionRegistry::new(),
         settings,
         project,
         rx,
         pending: VecDeque::new(),
      };
      (console, handle)
   }

   /// Attaches the settings documents, starts watching them and loads the
   /// first snapshot. An unreadable document leaves the defaults in place.
   pub fn configure_settings(&mut self, store: SettingsStore, handle: &ConsoleHandle) -> Result<()> {
      self.settings.configure(store, handle.change_notifier())?;
      let _ = self
         .settings
         .reload(true, &mut self.registry, self.project.exec());
      Ok(())
   }

   pub fn registry(&self) -> &ConnectionRegistry {
      &self.registry
   }

   pub fn settings(&self) -> &SettingsService {
      &self.settings
   }

   pub fn project(&self) -> &ProjectController {
      &self.project
   }

   /// Processes commands until `shutdown` fires or every handle is dropped.
   pub async fn run(mut self, shutdown: CancellationToken) {
      tracing::info!("console loop started");
      loop {
         let command = match self.pending.pop_front() {
            Some(command) => command,
            None => tokio::select! {
               () = shutdown.cancelled() => break,
               command = self.rx.recv() => match command {
                  Some(command) => command,
                  None => break,
               },
            },
         };
         self.handle(command).await;
      }

      self.settings.shutdown();
      self.project.shutdown();
      tracing::info!("console loop stopped");
   }

   async fn handle(&mut self, command: Command) {
      match command {
         Command::Connect { outbox, reply } => {
            let id = self.registry.connect(outbox);
            if let Err(e) = self.project.send_project_init(&id, &mut self.registry) {
               tracing::debug!("initial status not delivered to {id}: {e}");
            }
            if reply.send(id.clone()).is_err() {
               self.registry.disconnect(&id);
            }
         },
         Command::Disconnect { id } => {
            self.registry.disconnect(&id);
         },
         Command::Client { id, message } => self.handle_client(&id, message),
         Command::Invalid { id, reason } => {
            let _ = self.registry.send_to(&id, ServerMessage::error(reason));
         },
         Command::SettingsFileChanged => {
            let coalesced = self.drain_file_changes();
            tracing::debug!("settings files changed ({} events)", coalesced + 1);
            let _ = self
               .settings
               .reload(false, &mut self.registry, self.project.exec());
         },
         Command::ChooseProject { path, reply } => {
            let result = self
               .project
               .choose_project(&path, &mut self.registry, &mut self.settings)
               .await
               .and_then(|()| {
                  self
                     .project
                     .current()
                     .ok_or_else(|| Error::not_found("open project", path.display().to_string()))
               });
            let _ = reply.send(result);
         },
         Command::CloseProject { reply } => {
            let result = self
               .project
               .close_project(&mut self.registry, &mut self.settings)
               .await;
            let _ = reply.send(result);
         },
         Command::CurrentProject { reply } => {
            let _ = reply.send(self.project.current());
         },
         Command::RecentProjects { reply } => {
            let _ = reply.send(self.project.recent().list());
         },
         Command::GetSettings { reply } => {
            let _ = reply.send(self.settings_view());
         },
         Command::PatchSettings { partial, tier, reply } => {
            let result = self
               .settings
               .update(partial, tier, self.project.exec())
               .map(|()| self.settings_view());
            let _ = reply.send(result);
         },
         Command::GetAssetStatus { kind, id, reply } => {
            let result = self
               .settings
               .get_asset_status(kind, &id, self.project.collection(kind));
            let _ = reply.send(result);
         },
         Command::SetAssetStatus { kind, id, status, to_global, reply } => {
            let result = self
               .settings
               .set_asset_status(kind, &id, status, to_global, self.project.exec());
            let _ = reply.send(result);
         },
         Command::RenameAsset { kind, old_id, new_id, reply } => {
            let result = self
               .settings
               .rename_asset(kind, &old_id, &new_id, self.project.exec());
            let _ = reply.send(result);
         },
      }
   }

   fn handle_client(&mut self, id: &ConnectionId, message: ClientMessage) {
      let result = match message {
         ClientMessage::OpenChat { chat_id } => self.registry.open_topic(id, &chat_id),
         ClientMessage::CloseChat { chat_id } => self.registry.close_topic(id, &chat_id),
         ClientMessage::AcquireLock { chat_id, request_id } => {
            self.registry.acquire_lock(id, &chat_id, &request_id)
         },
         ClientMessage::ReleaseLock { chat_id, request_id } => {
            match self.registry.release_lock(id, &chat_id, &request_id) {
               Ok(true) => {
                  let released = ServerMessage::LockReleased { chat_id: chat_id.clone(), request_id };
                  self.registry.send_to_topic(&released, &chat_id);
                  Ok(())
               },
               Ok(false) => Ok(()),
               Err(e) => Err(e),
            }
         },
      };

      if let Err(e) = result {
         tracing::debug!("client request from {id} failed: {e}");
         let _ = self.registry.send_to(id, ServerMessage::error(e.to_string()));
      }
   }

   /// Folds queued file change notifications into the reload about to run.
   /// Other commands keep their order.
   fn drain_file_changes(&mut self) -> usize {
      let mut coalesced = 0;
      while let Ok(next) = self.rx.try_recv() {
         if matches!(next, Command::SettingsFileChanged) {
            coalesced += 1;
         } else {
            self.pending.push_back(next);
         }
      }
      coalesced
   }

   fn settings_view(&self) -> SettingsView {
      SettingsView {
         settings: self.settings.snapshot().clone(),
         warnings: self.settings.warnings().to_vec(),
      }
   }
}

/// Cloneable entry point into the console loop.
#[derive(Clone)]
pub struct ConsoleHandle {
   tx:    mpsc::UnboundedSender<Command>,
   guard: LifecycleGuard,
}

impl ConsoleHandle {
   fn send(&self, command: Command) -> Result<()> {
      self.tx.send(command).map_err(|_| Error::Server {
         op:     "console",
         reason: "console loop is not running".to_string(),
      })
   }

   async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
      let (tx, rx) = oneshot::channel();
      self.send(command(tx))?;
      rx.await.map_err(|_| Error::Server {
         op:     "console",
         reason: "console loop dropped the request".to_string(),
      })
   }

   /// Callback for the settings watcher: enqueues a reload and returns.
   pub fn change_notifier(&self) -> ChangeCallback {
      let tx = self.tx.clone();
      Arc::new(move || {
         let _ = tx.send(Command::SettingsFileChanged);
      })
   }

   pub async fn connect(&self, outbox: Outbox) -> Result<ConnectionId> {
      self
         .request(|reply| Command::Connect { outbox, reply })
         .await
   }

   pub fn disconnect(&self, id: ConnectionId) {
      let _ = self.send(Command::Disconnect { id });
   }

   pub fn client_message(&self, id: ConnectionId, message: ClientMessage) -> Result<()> {
      self.send(Command::Client { id, message })
   }

   pub fn invalid_message(&self, id: ConnectionId, reason: String) -> Result<()> {
      self.send(Command::Invalid { id, reason })
   }

   pub fn settings_file_changed(&self) -> Result<()> {
      self.send(Command::SettingsFileChanged)
   }

   /// Fails fast with `Busy` while another project switch or close runs.
   pub async fn choose_project(&self, path: PathBuf) -> Result<ProjectInfo> {
      self.guard.check()?;
      self
         .request(|reply| Command::ChooseProject { path, reply })
         .await?
   }

   pub async fn close_project(&self) -> Result<()> {
      self.guard.check()?;
      self.request(|reply| Command::CloseProject { reply }).await?
   }

   pub async fn current_project(&self) -> Result<Option<ProjectInfo>> {
      self
         .request(|reply| Command::CurrentProject { reply })
         .await
   }

   pub async fn recent_projects(&self) -> Result<Vec<RecentProject>> {
      self
         .request(|reply| Command::RecentProjects { reply })
         .await?
   }

   pub async fn settings(&self) -> Result<SettingsView> {
      self.request(|reply| Command::GetSettings { reply }).await
   }

   pub async fn patch_settings(&self, partial: PartialSettings, to_global: bool) -> Result<SettingsView> {
      let tier = Tier::from_global_flag(to_global);
      self
         .request(|reply| Command::PatchSettings { partial, tier, reply })
         .await?
   }

   pub async fn asset_status(&self, kind: AssetKind, id: String) -> Result<AssetStatus> {
      self
         .request(|reply| Command::GetAssetStatus { kind, id, reply })
         .await?
   }

   pub async fn set_asset_status(
      &self,
      kind: AssetKind,
      id: String,
      status: AssetStatus,
      to_global: bool,
   ) -> Result<()> {
      self
         .request(|reply| Command::SetAssetStatus { kind, id, status, to_global, reply })
         .await?
   }

   pub async fn rename_asset(&self, kind: AssetKind, old_id: String, new_id: String) -> Result<bool> {
      self
         .request(|reply| Command::RenameAsset { kind, old_id, new_id, reply })
         .await?
   }
}
