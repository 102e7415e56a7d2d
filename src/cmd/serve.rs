//! Long-running console server command.
//!
//! Owns the console loop, serves the WebSocket and REST endpoints and stops
//! on Ctrl+C.

use std::{path::PathBuf, sync::Arc};

use console::style;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

use crate::{
   Result,
   config::Config,
   console::Console,
   error::Error,
   project::{
      DirectorySource, ProcessExecution, ProjectController, Provisioner, RecentProjects,
      VenvProvisioner,
   },
   server,
   settings::{SettingsService, SettingsStore},
};

pub async fn execute(host: Option<String>, port: Option<u16>, project: Option<PathBuf>) -> Result<()> {
   let mut cfg = Config::load();
   if let Some(host) = host {
      cfg.host = host;
   }
   if let Some(port) = port {
      cfg.port = port;
   }

   let addr = cfg.listen_addr();
   let listener = TcpListener::bind(&addr)
      .await
      .map_err(|e| Error::Server { op: "bind", reason: format!("{addr}: {e}") })?;

   let global_settings = cfg.global_settings_path();
   println!("{}", style("Starting aicd server...").green().bold());
   println!("Listening: {}", style(listener.local_addr()?).cyan());
   println!("Global settings: {}", style(global_settings.display()).dim());

   let provisioner = cfg
      .provision_env
      .then(|| Arc::new(VenvProvisioner::new(&cfg.python)) as Arc<dyn Provisioner>);
   let controller = ProjectController::new(
      Arc::new(DirectorySource),
      Arc::new(ProcessExecution::new()),
      RecentProjects::new(cfg.recent_projects_path(), cfg.recent_projects_limit),
      provisioner,
   );
   let settings = SettingsService::new(cfg.watch_debounce(), cfg.suppression_window());

   let (mut console, handle) = Console::new(settings, controller);
   console.configure_settings(SettingsStore::new(global_settings), &handle)?;

   let shutdown = CancellationToken::new();
   let console_task = tokio::spawn(console.run(shutdown.clone()));

   if let Some(dir) = project {
      match handle.choose_project(dir).await {
         Ok(info) => println!("Project: {}", style(&info.path).cyan()),
         Err(e) => println!("{}", style(format!("Could not open project: {e}")).yellow()),
      }
   }

   println!("\n{}", style("Server listening").green());
   println!("{}", style("Press Ctrl+C to stop").dim());

   let mut server_task = tokio::spawn(server::serve(listener, handle, shutdown.clone()));

   let finished = tokio::select! {
      _ = signal::ctrl_c() => {
         println!("\n{}", style("Shutting down...").yellow());
         None
      }
      joined = &mut server_task => Some(joined),
   };

   shutdown.cancel();
   let joined = match finished {
      Some(joined) => joined,
      None => server_task.await,
   };
   let _ = console_task.await;

   println!("{}", style("Server stopped").green());
   joined.map_err(|e| Error::Server { op: "serve", reason: e.to_string() })?
}
