// ABOUTME: Core library for readmark, containing the persisted data model.
// ABOUTME: This crate defines the store, user, document, and config types shared by all readmark components.

pub mod encoding;
pub mod model;

pub use encoding::{BackupEncoding, UnsupportedEncoding};
pub use model::{
    Config, DEFAULT_LISTEN_ADDRESS, Database, Document, HistoryRecord, ProgressUpdate, SCHEMA_VERSION,
    User,
};
