//! Typed settings model: asset statuses, the merged snapshot and partial
//! updates.

use std::fmt;

use serde::{
   Deserialize, Deserializer, Serialize, Serializer,
   de::{MapAccess, Visitor},
   ser::SerializeMap,
};
use toml::{Table, Value};

pub const DEFAULT_USERNAME: &str = "user";

/// Override status for a single asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
   #[default]
   Enabled,
   Disabled,
   Forced,
}

impl AssetStatus {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Enabled => "enabled",
         Self::Disabled => "disabled",
         Self::Forced => "forced",
      }
   }

   pub fn parse(raw: &str) -> Option<Self> {
      match raw {
         "enabled" => Some(Self::Enabled),
         "disabled" => Some(Self::Disabled),
         "forced" => Some(Self::Forced),
         _ => None,
      }
   }
}

impl fmt::Display for AssetStatus {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// The asset families whose status can be overridden in settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
   Agent,
   Material,
}

impl AssetKind {
   pub const ALL: [Self; 2] = [Self::Agent, Self::Material];

   /// Key of the override table in the settings document; also the project
   /// subdirectory holding assets of this kind.
   pub const fn plural(self) -> &'static str {
      match self {
         Self::Agent => "agents",
         Self::Material => "materials",
      }
   }

   pub const fn reset_key(self) -> &'static str {
      match self {
         Self::Agent => "agents_to_reset",
         Self::Material => "materials_to_reset",
      }
   }

   pub fn from_plural(raw: &str) -> Option<Self> {
      match raw {
         "agents" => Some(Self::Agent),
         "materials" => Some(Self::Material),
         _ => None,
      }
   }
}

impl fmt::Display for AssetKind {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Self::Agent => f.write_str("agent"),
         Self::Material => f.write_str("material"),
      }
   }
}

/// Asset id → status overrides, kept in document order.
///
/// Order matters: the single-forced-agent fix-up keeps the first forced entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusOverrides {
   entries: Vec<(String, AssetStatus)>,
}

impl StatusOverrides {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn get(&self, id: &str) -> Option<AssetStatus> {
      self
         .entries
         .iter()
         .find(|(key, _)| key == id)
         .map(|(_, status)| *status)
   }

   /// Updates an existing entry in place, or appends a new one.
   pub fn set(&mut self, id: impl Into<String>, status: AssetStatus) {
      let id = id.into();
      if let Some(entry) = self.entries.iter_mut().find(|(key, _)| *key == id) {
         entry.1 = status;
      } else {
         self.entries.push((id, status));
      }
   }

   pub fn remove(&mut self, id: &str) -> Option<AssetStatus> {
      let idx = self.entries.iter().position(|(key, _)| key == id)?;
      Some(self.entries.remove(idx).1)
   }

   pub fn iter(&self) -> impl Iterator<Item = (&str, AssetStatus)> {
      self
         .entries
         .iter()
         .map(|(id, status)| (id.as_str(), *status))
   }

   pub fn forced_ids(&self) -> impl Iterator<Item = &str> {
      self
         .iter()
         .filter(|(_, status)| *status == AssetStatus::Forced)
         .map(|(id, _)| id)
   }

   pub fn len(&self) -> usize {
      self.entries.len()
   }

   pub fn is_empty(&self) -> bool {
      self.entries.is_empty()
   }
}

impl<S: Into<String>> FromIterator<(S, AssetStatus)> for StatusOverrides {
   fn from_iter<I: IntoIterator<Item = (S, AssetStatus)>>(iter: I) -> Self {
      let mut overrides = Self::new();
      for (id, status) in iter {
         overrides.set(id, status);
      }
      overrides
   }
}

impl Serialize for StatusOverrides {
   fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
      let mut map = serializer.serialize_map(Some(self.entries.len()))?;
      for (id, status) in &self.entries {
         map.serialize_entry(id, status)?;
      }
      map.end()
   }
}

impl<'de> Deserialize<'de> for StatusOverrides {
   fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
      struct OverridesVisitor;

      impl<'de> Visitor<'de> for OverridesVisitor {
         type Value = StatusOverrides;

         fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of asset id to status")
         }

         fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut overrides = StatusOverrides::new();
            while let Some((id, status)) = access.next_entry::<String, AssetStatus>()? {
               overrides.set(id, status);
            }
            Ok(overrides)
         }
      }

      deserializer.deserialize_map(OverridesVisitor)
   }
}

/// User profile fields as stored in a settings document; every field may be
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfileSettings {
   #[serde(skip_serializing_if = "Option::is_none")]
   pub username:    Option<String>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub email:       Option<String>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub avatar_path: Option<String>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub gravatar:    Option<bool>,
}

/// Resolved user profile.
///
/// The username is the explicit `username` when set, otherwise the local part
/// of `email`, otherwise [`DEFAULT_USERNAME`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
   pub username:    String,
   pub email:       Option<String>,
   pub avatar_path: Option<String>,
   pub gravatar:    bool,
}

impl Default for UserProfile {
   fn default() -> Self {
      Self::resolve(&UserProfileSettings::default())
   }
}

impl UserProfile {
   pub fn resolve(stored: &UserProfileSettings) -> Self {
      let email = stored
         .email
         .as_deref()
         .map(str::trim)
         .filter(|e| !e.is_empty())
         .map(String::from);
      let username = stored
         .username
         .as_deref()
         .map(str::trim)
         .filter(|u| !u.is_empty())
         .map(String::from)
         .or_else(|| {
            email
               .as_deref()
               .and_then(|e| e.split('@').next())
               .filter(|local| !local.is_empty())
               .map(String::from)
         })
         .unwrap_or_else(|| DEFAULT_USERNAME.to_string());

      Self {
         username,
         email,
         avatar_path: stored.avatar_path.clone(),
         gravatar: stored.gravatar.unwrap_or(false),
      }
   }
}

/// Typed, merged view of the settings documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettingsSnapshot {
   pub code_autorun:   bool,
   pub openai_api_key: Option<String>,
   pub user_profile:   UserProfile,
   pub materials:      StatusOverrides,
   pub agents:         StatusOverrides,
}

impl SettingsSnapshot {
   /// Builds a snapshot from a merged document. Malformed values fall back to
   /// their defaults; a description of each is returned.
   pub fn from_table(table: &Table) -> (Self, Vec<String>) {
      let mut warnings = Vec::new();
      let mut snapshot = Self::default();

      match table.get("code_autorun") {
         Some(Value::Boolean(autorun)) => snapshot.code_autorun = *autorun,
         Some(other) => warnings.push(format!("code_autorun must be a boolean, got {other}")),
         None => {},
      }

      match table.get("openai_api_key") {
         Some(Value::String(key)) if !key.trim().is_empty() => {
            snapshot.openai_api_key = Some(key.clone());
         },
         Some(Value::String(_)) | None => {},
         Some(other) => warnings.push(format!("openai_api_key must be a string, got {other}")),
      }

      match table.get("user_profile") {
         Some(value @ Value::Table(_)) => match value.clone().try_into::<UserProfileSettings>() {
            Ok(stored) => snapshot.user_profile = UserProfile::resolve(&stored),
            Err(e) => warnings.push(format!("invalid user_profile: {e}")),
         },
         Some(other) => warnings.push(format!("user_profile must be a table, got {other}")),
         None => {},
      }

      for kind in AssetKind::ALL {
         let overrides = read_overrides(table, kind, &mut warnings);
         *snapshot.overrides_mut(kind) = overrides;
      }

      (snapshot, warnings)
   }

   pub fn overrides(&self, kind: AssetKind) -> &StatusOverrides {
      match kind {
         AssetKind::Agent => &self.agents,
         AssetKind::Material => &self.materials,
      }
   }

   pub fn overrides_mut(&mut self, kind: AssetKind) -> &mut StatusOverrides {
      match kind {
         AssetKind::Agent => &mut self.agents,
         AssetKind::Material => &mut self.materials,
      }
   }

   /// Demotes every forced agent after the first one to `enabled`.
   pub fn enforce_single_forced_agent(&mut self) -> Vec<String> {
      let forced: Vec<String> = self.agents.forced_ids().map(String::from).collect();
      let Some((kept, demoted)) = forced.split_first() else {
         return Vec::new();
      };

      demoted
         .iter()
         .map(|id| {
            self.agents.set(id.clone(), AssetStatus::Enabled);
            format!("agent {id} was forced alongside {kept}; demoted to enabled")
         })
         .collect()
   }
}

fn read_overrides(table: &Table, kind: AssetKind, warnings: &mut Vec<String>) -> StatusOverrides {
   let key = kind.plural();
   let entries = match table.get(key) {
      Some(Value::Table(entries)) => entries,
      Some(other) => {
         warnings.push(format!("{key} must be a table, got {other}"));
         return StatusOverrides::new();
      },
      None => return StatusOverrides::new(),
   };

   let mut overrides = StatusOverrides::new();
   for (id, value) in entries {
      match value.as_str().and_then(AssetStatus::parse) {
         Some(status) => overrides.set(id.clone(), status),
         None => warnings.push(format!("{kind} {id} has invalid status {value}")),
      }
   }
   overrides
}

/// A partial settings update. Only present fields are written; absent fields
/// leave the on-disk document untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialSettings {
   pub code_autorun:       Option<bool>,
   pub openai_api_key:     Option<String>,
   pub user_profile:       Option<UserProfileSettings>,
   pub materials:          StatusOverrides,
   pub materials_to_reset: Vec<String>,
   pub agents:             StatusOverrides,
   pub agents_to_reset:    Vec<String>,
}

impl PartialSettings {
   pub fn with_status(kind: AssetKind, id: impl Into<String>, status: AssetStatus) -> Self {
      let mut partial = Self::default();
      partial.overrides_mut(kind).set(id, status);
      partial
   }

   pub fn overrides(&self, kind: AssetKind) -> &StatusOverrides {
      match kind {
         AssetKind::Agent => &self.agents,
         AssetKind::Material => &self.materials,
      }
   }

   pub fn overrides_mut(&mut self, kind: AssetKind) -> &mut StatusOverrides {
      match kind {
         AssetKind::Agent => &mut self.agents,
         AssetKind::Material => &mut self.materials,
      }
   }

   pub fn resets(&self, kind: AssetKind) -> &[String] {
      match kind {
         AssetKind::Agent => &self.agents_to_reset,
         AssetKind::Material => &self.materials_to_reset,
      }
   }

   pub fn resets_mut(&mut self, kind: AssetKind) -> &mut Vec<String> {
      match kind {
         AssetKind::Agent => &mut self.agents_to_reset,
         AssetKind::Material => &mut self.materials_to_reset,
      }
   }

   pub fn is_empty(&self) -> bool {
      self.code_autorun.is_none()
         && self.openai_api_key.is_none()
         && self.user_profile.is_none()
         && AssetKind::ALL
            .iter()
            .all(|&kind| self.overrides(kind).is_empty() && self.resets(kind).is_empty())
   }
}
