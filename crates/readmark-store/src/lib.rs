// ABOUTME: Persistence layer for readmark, owning the live store file and its lifecycle.
// ABOUTME: Provides the record store, atomic JSON persistence, schema migrations, and envelope backup/restore.

pub mod backup;
pub mod envelope;
pub mod migration;
pub mod persist;
pub mod store;

pub use backup::{BACKUP_LABEL, BackupError, backup, read_backup, restore};
pub use envelope::{Envelope, EnvelopeError};
pub use migration::{MigrationError, MigrationReport, MigrationStep, Migrator, run_migrations};
pub use persist::{PersistError, PersistWriter};
pub use store::{RecordStore, StoreError};
