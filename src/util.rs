//! Utility functions for filesystem operations

use std::{
   fs,
   io::{self, Write},
   path::{Path, PathBuf},
};

/// Writes `data` to `path` through a sibling temp file and a rename, so a
/// concurrent reader observes either the previous or the new content.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
   if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
   }
   let tmp_path = temp_path(path)?;
   {
      let mut file = fs::File::create(&tmp_path)?;
      file.write_all(data)?;
      file.sync_all()?;
   }
   if let Err(e) = fs::rename(&tmp_path, path) {
      let _ = fs::remove_file(&tmp_path);
      return Err(e);
   }
   if let Some(parent) = path.parent() {
      fsync_dir(parent)?;
   }
   Ok(())
}

/// Flushes directory metadata so a completed rename survives a crash.
pub fn fsync_dir(dir: &Path) -> io::Result<()> {
   #[cfg(unix)]
   {
      fs::File::open(dir)?.sync_all()
   }

   #[cfg(not(unix))]
   {
      let _ = dir;
      Ok(())
   }
}

fn temp_path(path: &Path) -> io::Result<PathBuf> {
   let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
   Ok(path.with_file_name(format!(".{name}.tmp")))
}

/// Display name for a project directory: its final path component.
pub fn project_name(path: &Path) -> String {
   path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string())
}
