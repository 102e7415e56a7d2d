//! Agent and material collections of an opened project.
//!
//! The built-in source reads one TOML file per asset from
//! `<project>/agents/` and `<project>/materials/`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
   Result,
   settings::{AssetKind, AssetStatus},
};

pub trait AssetDescriptor: Send + Sync {
   fn id(&self) -> &str;

   /// Status used when settings carry no override for this asset.
   fn default_status(&self) -> AssetStatus;
}

/// A live set of assets of one kind.
#[async_trait::async_trait]
pub trait AssetCollection: Send + Sync {
   fn kind(&self) -> AssetKind;

   /// Re-reads the backing storage. Returns the number of loaded assets.
   async fn reload(&mut self, initial: bool) -> Result<usize>;

   /// Releases resources; the collection is not used afterwards.
   fn stop(&mut self);

   fn all_assets(&self) -> Vec<&dyn AssetDescriptor>;

   fn get_asset(&self, id: &str) -> Option<&dyn AssetDescriptor>;
}

/// Creates the collections of a freshly opened project.
pub trait AssetSource: Send + Sync {
   fn open(&self, kind: AssetKind, project_dir: &Path) -> Box<dyn AssetCollection>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectorySource;

impl AssetSource for DirectorySource {
   fn open(&self, kind: AssetKind, project_dir: &Path) -> Box<dyn AssetCollection> {
      Box::new(DirectoryAssets::new(kind, project_dir.join(kind.plural())))
   }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
   pub id:             String,
   pub name:           String,
   pub default_status: AssetStatus,
   pub path:           PathBuf,
}

impl AssetDescriptor for Asset {
   fn id(&self) -> &str {
      &self.id
   }

   fn default_status(&self) -> AssetStatus {
      self.default_status
   }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssetFile {
   id:             Option<String>,
   name:           Option<String>,
   default_status: Option<AssetStatus>,
}

pub struct DirectoryAssets {
   kind:    AssetKind,
   dir:     PathBuf,
   assets:  Vec<Asset>,
   stopped: bool,
}

impl DirectoryAssets {
   pub fn new(kind: AssetKind, dir: PathBuf) -> Self {
      Self { kind, dir, assets: Vec::new(), stopped: false }
   }

   pub fn dir(&self) -> &Path {
      &self.dir
   }

   async fn load_dir(&self) -> Result<Vec<Asset>> {
      let mut entries = match tokio::fs::read_dir(&self.dir).await {
         Ok(entries) => entries,
         Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
         Err(e) => return Err(e.into()),
      };

      let mut paths = Vec::new();
      while let Some(entry) = entries.next_entry().await? {
         let path = entry.path();
         if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
         }
      }
      paths.sort();

      let mut assets: Vec<Asset> = Vec::with_capacity(paths.len());
      for path in paths {
         let asset = match load_asset(&path).await {
            Ok(asset) => asset,
            Err(e) => {
               tracing::warn!("skipping {} {}: {e}", self.kind, path.display());
               continue;
            },
         };
         if assets.iter().any(|existing| existing.id == asset.id) {
            tracing::warn!("duplicate {} id {} in {}", self.kind, asset.id, path.display());
            continue;
         }
         assets.push(asset);
      }
      Ok(assets)
   }
}

async fn load_asset(path: &Path) -> Result<Asset> {
   let raw = tokio::fs::read_to_string(path).await?;
   let file: AssetFile = toml::from_str(&raw)?;
   let stem = path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();

   let id = file.id.filter(|id| !id.trim().is_empty()).unwrap_or(stem);
   Ok(Asset {
      name: file.name.unwrap_or_else(|| id.clone()),
      id,
      default_status: file.default_status.unwrap_or_default(),
      path: path.to_path_buf(),
   })
}

#[async_trait::async_trait]
impl AssetCollection for DirectoryAssets {
   fn kind(&self) -> AssetKind {
      self.kind
   }

   async fn reload(&mut self, initial: bool) -> Result<usize> {
      if self.stopped {
         return Ok(0);
      }
      self.assets = self.load_dir().await?;
      tracing::debug!(
         "loaded {} {}s from {} (initial={initial})",
         self.assets.len(),
         self.kind,
         self.dir.display()
      );
      Ok(self.assets.len())
   }

   fn stop(&mut self) {
      self.stopped = true;
      self.assets.clear();
   }

   fn all_assets(&self) -> Vec<&dyn AssetDescriptor> {
      self
         .assets
         .iter()
         .map(|asset| asset as &dyn AssetDescriptor)
         .collect()
   }

   fn get_asset(&self, id: &str) -> Option<&dyn AssetDescriptor> {
      self
         .assets
         .iter()
         .find(|asset| asset.id == id)
         .map(|asset| asset as &dyn AssetDescriptor)
   }
}
