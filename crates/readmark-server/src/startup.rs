// ABOUTME: Startup sequence: locate the store file, optionally restore a backup, load, migrate, and take startup backups.
// ABOUTME: Restore and migration failures stop startup; the opportunistic backups only log their failures.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use readmark_core::Config;
use readmark_store::{
    BackupError, MigrationError, Migrator, RecordStore, StoreError, backup, restore, run_migrations,
};
use thiserror::Error;

/// Places a store file is looked for, in order.
pub const DATABASE_SEARCH_PATHS: [&str; 2] = ["/data/database.json", "./database.json"];

/// Directory preferred for a new store file when it exists.
pub const DATA_DIR: &str = "/data";

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to restore backup: {0}")]
    Restore(#[source] BackupError),

    #[error("failed to load database: {0}")]
    Load(#[from] StoreError),

    #[error("failed to migrate database: {0}")]
    Migrate(#[from] MigrationError),
}

/// Pick the store file: an explicit path wins, otherwise the first
/// non-empty file on the search path, otherwise a new file under `/data`
/// when that directory exists.
pub fn resolve_database_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    let candidates: Vec<PathBuf> = DATABASE_SEARCH_PATHS.iter().map(PathBuf::from).collect();
    find_database(&candidates, Path::new(DATA_DIR))
}

fn find_database(candidates: &[PathBuf], data_dir: &Path) -> PathBuf {
    if let Some(found) = candidates
        .iter()
        .find(|path| fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 1))
    {
        return found.clone();
    }

    match candidates {
        [in_data, ..] if data_dir.is_dir() => in_data.clone(),
        [.., local] => local.clone(),
        [] => PathBuf::from("database.json"),
    }
}

/// Restore `restore_from` over `db_path` when given, then load the store.
///
/// A restored store keeps the schema of its backup until [`prepare_store`]
/// migrates it.
pub fn load_store(
    db_path: &Path,
    restore_from: Option<&Path>,
) -> Result<Arc<RecordStore>, StartupError> {
    if let Some(backup_file) = restore_from {
        restore(backup_file, db_path).map_err(StartupError::Restore)?;
    }

    let store = RecordStore::load_or_init(db_path)?;
    tracing::info!(path = %db_path.display(), "using database file");
    Ok(Arc::new(store))
}

/// Bring a loaded store up to the current schema and take the requested backups.
/// Returns the config as it stands after migrating.
pub async fn prepare_store(
    store: &RecordStore,
    backup_requested: bool,
) -> Result<Config, StartupError> {
    let report = run_migrations(store, &Migrator::builtin()).await?;
    if !report.applied.is_empty() {
        tracing::info!(
            from = report.from,
            to = report.to,
            steps = report.applied.len(),
            "database migrated"
        );
    }

    if backup_requested {
        take_backup(store, "requested").await;
    }
    let config = store.config().await;
    if config.backup_on_startup {
        take_backup(store, "startup").await;
    }

    Ok(config)
}

async fn take_backup(store: &RecordStore, reason: &str) {
    match backup(store).await {
        Ok(path) => tracing::info!(reason, path = %path.display(), "backup written"),
        Err(e) => tracing::warn!(reason, "backup failed, continuing startup: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readmark_core::{BackupEncoding, Database, SCHEMA_VERSION, User};
    use readmark_store::{PersistWriter, read_backup};
    use tempfile::TempDir;

    fn bak_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "bak"))
            .collect()
    }

    #[test]
    fn explicit_path_wins() {
        let path = PathBuf::from("/somewhere/else.json");
        assert_eq!(resolve_database_path(Some(path.clone())), path);
    }

    #[test]
    fn first_non_empty_candidate_is_used() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.json");
        let second = dir.path().join("b.json");
        fs::write(&first, "\n").unwrap();
        fs::write(&second, "{}\n").unwrap();

        let found = find_database(&[first, second.clone()], &dir.path().join("missing"));

        assert_eq!(found, second);
    }

    #[test]
    fn new_store_prefers_data_dir_when_present() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let candidates = [data.join("database.json"), dir.path().join("database.json")];

        assert_eq!(find_database(&candidates, &data), candidates[1]);

        fs::create_dir(&data).unwrap();
        assert_eq!(find_database(&candidates, &data), candidates[0]);
    }

    #[tokio::test]
    async fn load_creates_a_fresh_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");

        let store = load_store(&path, None).unwrap();
        prepare_store(&store, false).await.unwrap();

        assert_eq!(store.schema().await, SCHEMA_VERSION);
        assert!(path.exists());
        assert!(bak_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn old_store_is_migrated_with_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        let mut db = Database::default();
        db.schema = 0;
        db.config.backup_encoding_type = None;
        db.users.insert("alice".into(), User::new("alice", "pw"));
        PersistWriter::new(&path).write(&db).unwrap();

        let store = load_store(&path, None).unwrap();
        prepare_store(&store, false).await.unwrap();

        assert_eq!(store.schema().await, SCHEMA_VERSION);
        let backups = bak_files(dir.path());
        assert_eq!(backups.len(), 1);
        assert_eq!(read_backup(&backups[0]).unwrap().schema, 0);
    }

    #[tokio::test]
    async fn restore_runs_before_load() {
        let source_dir = TempDir::new().unwrap();
        let source = load_store(&source_dir.path().join("database.json"), None).unwrap();
        source.add_user("alice", "pw").await.unwrap();
        let backup_file = backup(&source).await.unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        let store = load_store(&path, Some(&backup_file)).unwrap();

        assert!(store.authenticate("alice", "pw").await);
    }

    #[test]
    fn failed_restore_stops_startup() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("bogus.bak");
        fs::write(&bogus, "not a backup").unwrap();

        let err = load_store(&dir.path().join("database.json"), Some(&bogus)).unwrap_err();

        assert!(matches!(err, StartupError::Restore(_)));
        assert!(!dir.path().join("database.json").exists());
    }

    #[tokio::test]
    async fn requested_and_startup_backups_are_taken() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        let mut db = Database::default();
        db.config.backup_on_startup = true;
        PersistWriter::new(&path).write(&db).unwrap();

        let store = load_store(&path, None).unwrap();
        prepare_store(&store, true).await.unwrap();

        assert_eq!(bak_files(dir.path()).len(), 2);
    }

    #[tokio::test]
    async fn requested_backup_keeps_the_pre_migration_copy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        let mut db = Database::default();
        db.schema = 0;
        db.config.backup_encoding_type = None;
        db.users.insert("alice".into(), User::new("alice", "pw"));
        PersistWriter::new(&path).write(&db).unwrap();

        let store = load_store(&path, None).unwrap();
        prepare_store(&store, true).await.unwrap();

        let mut schemas: Vec<u32> = bak_files(dir.path())
            .iter()
            .map(|file| read_backup(file).unwrap().schema)
            .collect();
        schemas.sort_unstable();
        assert_eq!(schemas, vec![0, SCHEMA_VERSION]);
    }

    #[tokio::test]
    async fn prepare_returns_the_migrated_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        let mut db = Database::default();
        db.schema = 1;
        db.config.backup_encoding_type = None;
        db.config.listen_address = "127.0.0.1:9191".to_string();
        PersistWriter::new(&path).write(&db).unwrap();

        let store = load_store(&path, None).unwrap();
        let config = prepare_store(&store, false).await.unwrap();

        assert_eq!(config.backup_encoding_type, Some(BackupEncoding::Msgpack));
        assert_eq!(config.listen_address, "127.0.0.1:9191");
        assert_eq!(config, store.config().await);
    }

    #[tokio::test]
    async fn backup_failure_does_not_stop_startup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        let mut db = Database::default();
        db.config.backup_encoding_type = None;
        PersistWriter::new(&path).write(&db).unwrap();

        let store = load_store(&path, None).unwrap();

        prepare_store(&store, true).await.unwrap();
        assert!(bak_files(dir.path()).is_empty());
    }
}
