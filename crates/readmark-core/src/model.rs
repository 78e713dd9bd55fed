// ABOUTME: Persisted data model: the store root, its config, users, documents, and reading history.
// ABOUTME: Field names match the on-disk JSON layout, including files written by older schema versions.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::encoding::{self, BackupEncoding};

/// Highest store schema version this build can read and migrate to.
pub const SCHEMA_VERSION: u32 = 4;

/// Listen address used when the config leaves it empty.
pub const DEFAULT_LISTEN_ADDRESS: &str = ":8080";

/// Older revisions wrote `null` for empty maps and lists.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The root record: everything readmark persists lives under one `Database`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub schema: u32,
    #[serde(default)]
    pub config: Config,
    #[serde(default, deserialize_with = "null_as_default")]
    pub users: BTreeMap<String, User>,
}

impl Default for Database {
    /// A fresh store is already at the current schema, so no migration runs for it.
    fn default() -> Self {
        Self {
            schema: SCHEMA_VERSION,
            config: Config::default(),
            users: BTreeMap::new(),
        }
    }
}

impl Database {
    /// Look up a user by exact (case-sensitive) username.
    pub fn user(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }
}

/// Server settings stored alongside the data. Only changed by editing the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listen_address: String,
    #[serde(default)]
    pub disable_registration: bool,
    #[serde(default, rename = "enable_debug_log")]
    pub debug_log: bool,
    #[serde(default)]
    pub store_history: bool,
    #[serde(default, with = "encoding::optional")]
    pub backup_encoding_type: Option<BackupEncoding>,
    #[serde(default)]
    pub backup_on_startup: bool,
    #[serde(default, rename = "enable_webui")]
    pub web_ui: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            disable_registration: false,
            debug_log: false,
            store_history: false,
            backup_encoding_type: Some(BackupEncoding::Msgpack),
            backup_on_startup: false,
            web_ui: false,
        }
    }
}

/// A registered account and everything synced under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Opaque shared secret, compared byte for byte. Clients send it pre-hashed.
    pub password: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub documents: BTreeMap<String, Document>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub history: BTreeMap<String, HistoryRecord>,
}

impl User {
    /// Create a user with no documents and no history.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            documents: BTreeMap::new(),
            history: BTreeMap::new(),
        }
    }
}

/// Current reading position of one document for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, rename = "document")]
    pub document_id: String,
    /// Reader-specific cursor (an xpointer or CFI); never interpreted.
    #[serde(default)]
    pub progress: String,
    #[serde(default)]
    pub percentage: f32,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub device_id: String,
    /// Unix seconds of the last sync.
    #[serde(default)]
    pub timestamp: i64,
    /// Display name set from the web UI.
    #[serde(default)]
    pub pretty_name: String,
}

impl Document {
    /// Build the stored snapshot for an incoming update.
    pub fn from_update(update: ProgressUpdate, timestamp: i64, pretty_name: String) -> Self {
        Self {
            document_id: update.document,
            progress: update.progress,
            percentage: update.percentage,
            device: update.device,
            device_id: update.device_id,
            timestamp,
            pretty_name,
        }
    }
}

/// Superseded snapshots of a document, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub document_history: Vec<Document>,
}

/// Progress payload sent by reading devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub document: String,
    #[serde(default)]
    pub progress: String,
    #[serde(default)]
    pub percentage: f32,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub device_id: String,
}
