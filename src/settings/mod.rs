pub mod model;
pub mod service;
pub mod store;
pub mod watcher;

pub use model::{
   AssetKind, AssetStatus, PartialSettings, SettingsSnapshot, StatusOverrides, UserProfile,
   UserProfileSettings,
};
pub use service::SettingsService;
pub use store::{SettingsStore, Tier};
pub use watcher::{ChangeCallback, SettingsWatcher};
