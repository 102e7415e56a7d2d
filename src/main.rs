use std::path::PathBuf;

use aicd::{Result, cmd};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the aicd application
#[derive(Parser)]
#[command(name = "aicd")]
#[command(about = "Real-time backend for the AI console")]
#[command(version)]
struct Cli {
   #[command(subcommand)]
   command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Run the console server")]
   Serve {
      #[arg(long, env = "AICD_HOST", help = "Address to bind (default from config)")]
      host: Option<String>,

      #[arg(short, long, env = "AICD_PORT", help = "Port to bind (default from config)")]
      port: Option<u16>,

      #[arg(long, help = "Project directory to open on startup")]
      project: Option<PathBuf>,
   },

   #[command(about = "Inspect or edit settings documents")]
   Settings {
      #[command(subcommand)]
      command: SettingsCmd,
   },
}

#[derive(Subcommand)]
enum SettingsCmd {
   #[command(about = "Show the merged settings")]
   Show {
      #[arg(long, help = "Project directory whose settings are layered on top")]
      project: Option<PathBuf>,

      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(name = "set-autorun", about = "Enable or disable automatic code execution")]
   SetAutorun {
      #[arg(action = clap::ArgAction::Set, help = "true or false")]
      value: bool,

      #[arg(long, help = "Write to this project's settings instead of the global ones")]
      project: Option<PathBuf>,
   },

   #[command(name = "set-status", about = "Override the status of an agent or material")]
   SetStatus {
      #[arg(help = "agents or materials")]
      kind: String,

      #[arg(help = "Asset id")]
      id: String,

      #[arg(help = "enabled, disabled or forced")]
      status: String,

      #[arg(long, help = "Write to this project's settings instead of the global ones")]
      project: Option<PathBuf>,
   },
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
      .init();

   let cli = Cli::parse();
   if let Err(err) = run(cli).await {
      eprintln!("{err}");
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   match cli.command {
      Cmd::Serve { host, port, project } => cmd::serve::execute(host, port, project).await,
      Cmd::Settings { command } => match command {
         SettingsCmd::Show { project, json } => cmd::settings::show(project, json),
         SettingsCmd::SetAutorun { value, project } => cmd::settings::set_autorun(value, project),
         SettingsCmd::SetStatus { kind, id, status, project } => {
            cmd::settings::set_status(&kind, &id, &status, project)
         },
      },
   }
}
