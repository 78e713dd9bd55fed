// ABOUTME: Sequential schema migrations for the store, applied in strictly ascending version order.
// ABOUTME: Takes a backup before the first transformation and persists the migrated store afterwards.

use std::fmt;
use std::path::PathBuf;

use readmark_core::{BackupEncoding, Database};
use thiserror::Error;

use crate::backup::{BackupError, write_backup};
use crate::persist::PersistError;
use crate::store::RecordStore;

/// Errors that can occur while building or running migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("pre-migration backup failed: {0}")]
    Backup(#[from] BackupError),

    #[error("persist error: {0}")]
    Persist(#[from] PersistError),

    #[error("more than one migration step registered for version {0}")]
    DuplicateStep(u32),
}

/// One transformation that moves the store to `version`.
#[derive(Clone, Copy)]
pub struct MigrationStep {
    pub version: u32,
    pub name: &'static str,
    apply: fn(&mut Database),
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl MigrationStep {
    pub const fn new(version: u32, name: &'static str, apply: fn(&mut Database)) -> Self {
        Self {
            version,
            name,
            apply,
        }
    }
}

/// Outcome of a migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
    /// `(version, name)` of every step applied, in order.
    pub applied: Vec<(u32, &'static str)>,
    /// Backup taken before the first step; `None` when nothing was pending.
    pub backup: Option<PathBuf>,
}

/// An ordered list of migration steps.
///
/// Steps are sorted by version when the migrator is built, so the order they
/// are passed in does not matter.
#[derive(Debug, Clone)]
pub struct Migrator {
    steps: Vec<MigrationStep>,
}

impl Migrator {
    /// Build a migrator from arbitrary steps. Two steps for the same version are rejected.
    pub fn new(mut steps: Vec<MigrationStep>) -> Result<Self, MigrationError> {
        steps.sort_by_key(|step| step.version);
        if let Some(pair) = steps.windows(2).find(|pair| pair[0].version == pair[1].version) {
            return Err(MigrationError::DuplicateStep(pair[0].version));
        }
        Ok(Self { steps })
    }

    /// The migrations shipped with this build, ending at [`readmark_core::SCHEMA_VERSION`].
    pub fn builtin() -> Self {
        let mut steps = vec![
            MigrationStep::new(1, "init_history", init_history),
            MigrationStep::new(2, "default_backup_encoding", default_backup_encoding),
            MigrationStep::new(3, "default_backup_on_startup", default_backup_on_startup),
            MigrationStep::new(4, "document_ids", document_ids),
        ];
        steps.sort_by_key(|step| step.version);
        Self { steps }
    }

    /// Schema version reached after all steps have run.
    pub fn target_version(&self) -> u32 {
        self.steps.last().map_or(0, |step| step.version)
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Apply every step newer than the store's schema, bumping the schema after each one.
    fn apply_pending(&self, db: &mut Database) -> Vec<(u32, &'static str)> {
        let mut applied = Vec::new();
        for step in &self.steps {
            if db.schema < step.version {
                tracing::info!(
                    from = db.schema,
                    to = step.version,
                    step = step.name,
                    "migrating schema"
                );
                (step.apply)(db);
                db.schema = step.version;
                applied.push((step.version, step.name));
            }
        }
        applied
    }
}

impl Default for Migrator {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Bring the store up to the migrator's target version.
///
/// Does nothing (and takes no backup) when the store is already current.
/// Otherwise the whole run happens under the store lock: backup first, and if
/// that fails nothing is touched.
pub async fn run_migrations(
    store: &RecordStore,
    migrator: &Migrator,
) -> Result<MigrationReport, MigrationError> {
    let mut db = store.lock().await;
    let from = db.schema;
    let target = migrator.target_version();

    tracing::debug!(schema = from, target, "checking for database schema migrations");
    if from >= target {
        tracing::debug!("no migrations to do");
        return Ok(MigrationReport {
            from,
            to: from,
            applied: Vec::new(),
            backup: None,
        });
    }

    tracing::info!(schema = from, target, "migrations are available, performing backup");
    let backup = write_backup(&db, store.writer())?;

    let applied = migrator.apply_pending(&mut db);
    store.writer().write(&db)?;

    tracing::info!(from, to = db.schema, steps = applied.len(), "schema migration complete");
    Ok(MigrationReport {
        from,
        to: db.schema,
        applied,
        backup: Some(backup),
    })
}

/// Schema 0 predates history retention; start every user with an empty history.
fn init_history(db: &mut Database) {
    for user in db.users.values_mut() {
        user.history.clear();
    }
}

fn default_backup_encoding(db: &mut Database) {
    db.config.backup_encoding_type = Some(BackupEncoding::Msgpack);
}

fn default_backup_on_startup(db: &mut Database) {
    db.config.backup_on_startup = false;
}

/// Older revisions did not store the id inside the document; copy it from the map key.
fn document_ids(db: &mut Database) {
    for user in db.users.values_mut() {
        for (id, document) in user.documents.iter_mut() {
            document.document_id = id.clone();
        }
    }
}
