//! Background provisioning of a project's dedicated Python environment.

use std::{
   ffi::OsStr,
   path::{Path, PathBuf},
};

use tokio::process::Command;

use crate::{Result, error::Error};

/// Location of the virtual environment inside a project.
pub const VENV_DIR: &str = ".aiconsole/venv";

#[async_trait::async_trait]
pub trait Provisioner: Send + Sync {
   async fn provision(&self, project_dir: &Path) -> Result<()>;
}

/// Creates `<project>/.aiconsole/venv` with access to system packages, and
/// upgrades it in place when the host interpreter version changed.
#[derive(Debug, Clone)]
pub struct VenvProvisioner {
   python: PathBuf,
}

impl VenvProvisioner {
   pub fn new(python: impl Into<PathBuf>) -> Self {
      Self { python: python.into() }
   }

   pub fn venv_path(project_dir: &Path) -> PathBuf {
      project_dir.join(VENV_DIR)
   }

   fn venv_python(venv: &Path) -> PathBuf {
      if cfg!(windows) {
         venv.join("Scripts").join("python.exe")
      } else {
         venv.join("bin").join("python")
      }
   }

   async fn python_version(python: &Path) -> Result<String> {
      run(python, ["-c", "import sys; print(sys.version)"]).await
   }
}

#[async_trait::async_trait]
impl Provisioner for VenvProvisioner {
   async fn provision(&self, project_dir: &Path) -> Result<()> {
      let venv = Self::venv_path(project_dir);

      if !venv.exists() {
         tracing::info!("creating venv in {}", venv.display());
         let args = [
            OsStr::new("-m"),
            OsStr::new("venv"),
            venv.as_os_str(),
            OsStr::new("--system-site-packages"),
         ];
         run(&self.python, args).await?;
         return Ok(());
      }

      let host = Self::python_version(&self.python).await?;
      let current = Self::python_version(&Self::venv_python(&venv)).await.ok();
      if current.as_deref() == Some(host.as_str()) {
         tracing::debug!("venv in {} is up to date", venv.display());
         return Ok(());
      }

      tracing::info!("upgrading venv in {} for python {host}", venv.display());
      let args = [OsStr::new("-m"), OsStr::new("venv"), OsStr::new("--upgrade"), venv.as_os_str()];
      run(&self.python, args).await?;
      Ok(())
   }
}

async fn run<I, S>(program: &Path, args: I) -> Result<String>
where
   I: IntoIterator<Item = S>,
   S: AsRef<OsStr>,
{
   let output = Command::new(program)
      .args(args)
      .output()
      .await
      .map_err(|e| Error::Provision { reason: format!("failed to run {}: {e}", program.display()) })?;

   if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      return Err(Error::Provision {
         reason: format!("{} exited with {}: {stderr}", program.display(), output.status),
      });
   }
   Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn venv_lives_under_project_metadata_dir() {
      let path = VenvProvisioner::venv_path(Path::new("/work/demo"));
      assert_eq!(path, PathBuf::from("/work/demo/.aiconsole/venv"));
   }

   #[tokio::test]
   async fn missing_interpreter_is_a_provision_error() {
      let tmp = tempfile::tempdir().unwrap();
      let provisioner = VenvProvisioner::new(tmp.path().join("no-such-python"));
      let err = provisioner.provision(tmp.path()).await.unwrap_err();
      assert!(matches!(err, Error::Provision { .. }));
   }
}
