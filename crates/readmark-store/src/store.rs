// ABOUTME: The live record store: in-memory Database behind one process-wide lock, persisted on every mutation.
// ABOUTME: Handles loading or initializing the primary file and all user/document operations.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use readmark_core::{
    Config, DEFAULT_LISTEN_ADDRESS, Database, Document, HistoryRecord, ProgressUpdate, User,
};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::persist::{PersistError, PersistWriter};

/// Errors returned by record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The change is applied in memory but was not written to disk.
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),

    #[error("username '{0}' is already taken")]
    DuplicateUser(String),

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("unknown document '{document}' for user '{username}'")]
    UnknownDocument { username: String, document: String },
}

impl StoreError {
    /// True for lookups of users or documents that do not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::UnknownUser(_) | StoreError::UnknownDocument { .. }
        )
    }
}

/// Authoritative state for the whole process.
///
/// Every operation, reads included, goes through one exclusive lock. Mutations
/// write the full file before the lock is released, so the file on disk is
/// always the result of some completed mutation.
pub struct RecordStore {
    db: Mutex<Database>,
    writer: PersistWriter,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("path", &self.writer.path())
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    /// Wrap an already-loaded database. Nothing is written until the first mutation.
    pub fn new(db: Database, writer: PersistWriter) -> Self {
        Self {
            db: Mutex::new(db),
            writer,
        }
    }

    /// Load the store from `path`, or create a default one there when the file
    /// is missing or empty.
    pub fn load_or_init(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let writer = PersistWriter::new(path.clone());

        let contents = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        if contents.len() <= 1 {
            tracing::info!(path = %path.display(), "no database found, creating an empty one");
            let db = Database::default();
            writer.write(&db)?;
            return Ok(Self::new(db, writer));
        }

        let mut db: Database = serde_json::from_slice(&contents)?;
        if db.config.listen_address.is_empty() {
            db.config.listen_address = DEFAULT_LISTEN_ADDRESS.to_string();
        }

        tracing::info!(
            path = %path.display(),
            schema = db.schema,
            users = db.users.len(),
            "loaded database"
        );
        Ok(Self::new(db, writer))
    }

    /// Path of the primary store file.
    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    pub(crate) fn writer(&self) -> &PersistWriter {
        &self.writer
    }

    /// Acquire the store lock. Held across persistence, backup, and migration.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().await
    }

    /// Write the current state again, e.g. after an earlier persist failure.
    pub async fn persist(&self) -> Result<usize, StoreError> {
        let db = self.db.lock().await;
        Ok(self.writer.write(&db)?)
    }

    /// Register a new user with empty documents and history.
    pub async fn add_user(&self, username: &str, password: &str) -> Result<(), StoreError> {
        let mut db = self.db.lock().await;

        if db.users.contains_key(username) {
            return Err(StoreError::DuplicateUser(username.to_string()));
        }

        db.users
            .insert(username.to_string(), User::new(username, password));
        tracing::info!(user = username, "registered user");

        self.writer.write(&db)?;
        Ok(())
    }

    /// Record new progress for a document, returning the stored snapshot.
    ///
    /// With history retention on, the snapshot being replaced is appended to
    /// the document's history first. The display name survives the update.
    pub async fn upsert_document(
        &self,
        username: &str,
        update: ProgressUpdate,
    ) -> Result<Document, StoreError> {
        let mut db = self.db.lock().await;
        let store_history = db.config.store_history;

        let user = db
            .users
            .get_mut(username)
            .ok_or_else(|| StoreError::UnknownUser(username.to_string()))?;

        let previous = user.documents.get(&update.document).cloned();

        if store_history && let Some(previous) = &previous {
            tracing::debug!(
                user = username,
                document = %update.document,
                "progress went from {:.2} % to {:.2} %",
                previous.percentage * 100.0,
                update.percentage * 100.0
            );
            user.history
                .entry(update.document.clone())
                .or_default()
                .document_history
                .push(previous.clone());
        }

        let pretty_name = previous.map(|doc| doc.pretty_name).unwrap_or_default();
        let document = Document::from_update(update, Utc::now().timestamp(), pretty_name);
        user.documents
            .insert(document.document_id.clone(), document.clone());

        self.writer.write(&db)?;
        Ok(document)
    }

    /// Change only the display name of an existing document.
    pub async fn set_pretty_name(
        &self,
        username: &str,
        document_id: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let mut db = self.db.lock().await;

        let user = db
            .users
            .get_mut(username)
            .ok_or_else(|| StoreError::UnknownUser(username.to_string()))?;
        let document = user
            .documents
            .get_mut(document_id)
            .ok_or_else(|| StoreError::UnknownDocument {
                username: username.to_string(),
                document: document_id.to_string(),
            })?;
        document.pretty_name = name.to_string();

        self.writer.write(&db)?;
        Ok(())
    }

    pub async fn get_document(
        &self,
        username: &str,
        document_id: &str,
    ) -> Result<Document, StoreError> {
        let db = self.db.lock().await;
        let user = db
            .user(username)
            .ok_or_else(|| StoreError::UnknownUser(username.to_string()))?;
        user.documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownDocument {
                username: username.to_string(),
                document: document_id.to_string(),
            })
    }

    /// Every document of a user with its history, ordered by document id.
    pub async fn list_documents(
        &self,
        username: &str,
    ) -> Result<Vec<(Document, HistoryRecord)>, StoreError> {
        let db = self.db.lock().await;
        let user = db
            .user(username)
            .ok_or_else(|| StoreError::UnknownUser(username.to_string()))?;

        Ok(user
            .documents
            .iter()
            .map(|(id, doc)| {
                let history = user.history.get(id).cloned().unwrap_or_default();
                (doc.clone(), history)
            })
            .collect())
    }

    /// Check a shared secret. Unknown users never authenticate.
    pub async fn authenticate(&self, username: &str, key: &str) -> bool {
        let db = self.db.lock().await;
        db.user(username)
            .is_some_and(|user| user.password.as_bytes() == key.as_bytes())
    }

    pub async fn config(&self) -> Config {
        self.db.lock().await.config.clone()
    }

    pub async fn schema(&self) -> u32 {
        self.db.lock().await.schema
    }

    /// A copy of the entire database.
    pub async fn snapshot(&self) -> Database {
        self.db.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> RecordStore {
        RecordStore::load_or_init(dir.path().join("database.json")).unwrap()
    }

    fn history_store(dir: &TempDir) -> RecordStore {
        let path = dir.path().join("database.json");
        let mut db = Database::default();
        db.config.store_history = true;
        PersistWriter::new(&path).write(&db).unwrap();
        RecordStore::load_or_init(path).unwrap()
    }

    fn update(document: &str, percentage: f32) -> ProgressUpdate {
        ProgressUpdate {
            document: document.to_string(),
            progress: "cfi(/6/4)".to_string(),
            percentage,
            device: "kobo".to_string(),
            device_id: "K-1".to_string(),
        }
    }

    fn on_disk(store: &RecordStore) -> Database {
        serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap()
    }

    #[test]
    fn debug_shows_path_but_not_records() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::default();
        db.users.insert("alice".to_string(), User::new("alice", "secret-key"));
        let store = RecordStore::new(db, PersistWriter::new(dir.path().join("database.json")));

        let shown = format!("{:?}", Arc::new(store));

        assert!(shown.starts_with("RecordStore"));
        assert!(shown.contains("database.json"));
        assert!(!shown.contains("secret-key"));
    }

    #[tokio::test]
    async fn load_or_init_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.snapshot().await, Database::default());
        assert_eq!(on_disk(&store), Database::default());
    }

    #[tokio::test]
    async fn load_or_init_treats_one_byte_file_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        fs::write(&path, "\n").unwrap();

        let store = RecordStore::load_or_init(&path).unwrap();

        assert_eq!(store.snapshot().await, Database::default());
    }

    #[tokio::test]
    async fn load_or_init_fills_empty_listen_address() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        fs::write(
            &path,
            r#"{"schema": 4, "config": {"listen_address": ""}, "users": {}}"#,
        )
        .unwrap();

        let store = RecordStore::load_or_init(&path).unwrap();

        assert_eq!(store.config().await.listen_address, ":8080");
    }

    #[tokio::test]
    async fn load_or_init_rejects_corrupt_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.json");
        fs::write(&path, r#"{"schema": 4, "users": {"#).unwrap();

        let result = RecordStore::load_or_init(&path);

        assert!(matches!(result, Err(StoreError::Json(_))));
    }

    #[tokio::test]
    async fn add_user_persists() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.add_user("alice", "p1").await.unwrap();

        let disk = on_disk(&store);
        let alice = disk.user("alice").unwrap();
        assert_eq!(alice.password, "p1");
        assert!(alice.documents.is_empty());
        assert!(alice.history.is_empty());
    }

    #[tokio::test]
    async fn duplicate_user_is_rejected_and_original_kept() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.add_user("alice", "p1").await.unwrap();
        let err = store.add_user("alice", "p2").await.unwrap_err();

        assert!(matches!(err, StoreError::DuplicateUser(ref name) if name == "alice"));
        assert_eq!(store.snapshot().await.user("alice").unwrap().password, "p1");
        assert_eq!(on_disk(&store).user("alice").unwrap().password, "p1");
    }

    #[tokio::test]
    async fn usernames_are_case_sensitive() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.add_user("alice", "p1").await.unwrap();
        store.add_user("Alice", "p2").await.unwrap();

        assert_eq!(store.snapshot().await.users.len(), 2);
    }

    #[tokio::test]
    async fn upsert_requires_known_user() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let err = store
            .upsert_document("ghost", update("bookA", 0.1))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::UnknownUser(_)));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn upsert_with_history_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = history_store(&dir);
        store.add_user("alice", "p1").await.unwrap();

        let first = store
            .upsert_document("alice", update("bookA", 0.42))
            .await
            .unwrap();
        let second = store
            .upsert_document("alice", update("bookA", 0.58))
            .await
            .unwrap();

        let current = store.get_document("alice", "bookA").await.unwrap();
        assert_eq!(current, second);
        assert_eq!(current.percentage, 0.58);

        let listed = store.list_documents("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1.document_history, vec![first]);
        assert_eq!(on_disk(&store), store.snapshot().await);
    }

    #[tokio::test]
    async fn upsert_without_history_discards_previous() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add_user("alice", "p1").await.unwrap();

        store
            .upsert_document("alice", update("bookA", 0.1))
            .await
            .unwrap();
        store
            .upsert_document("alice", update("bookA", 0.2))
            .await
            .unwrap();

        let listed = store.list_documents("alice").await.unwrap();
        assert!(listed[0].1.document_history.is_empty());
    }

    #[tokio::test]
    async fn upsert_keeps_pretty_name_and_sets_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add_user("alice", "p1").await.unwrap();
        store
            .upsert_document("alice", update("bookA", 0.1))
            .await
            .unwrap();
        store
            .set_pretty_name("alice", "bookA", "Moby Dick")
            .await
            .unwrap();

        let before = Utc::now().timestamp();
        let stored = store
            .upsert_document("alice", update("bookA", 0.9))
            .await
            .unwrap();

        assert_eq!(stored.pretty_name, "Moby Dick");
        assert_eq!(stored.document_id, "bookA");
        assert!(stored.timestamp >= before);
    }

    #[tokio::test]
    async fn percentage_is_stored_verbatim() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add_user("alice", "p1").await.unwrap();

        store
            .upsert_document("alice", update("odd", 3.5))
            .await
            .unwrap();

        assert_eq!(
            store.get_document("alice", "odd").await.unwrap().percentage,
            3.5
        );
    }

    #[tokio::test]
    async fn set_pretty_name_preserves_progress() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add_user("alice", "p1").await.unwrap();
        let original = store
            .upsert_document("alice", update("bookA", 0.3))
            .await
            .unwrap();

        store
            .set_pretty_name("alice", "bookA", "Nice Title")
            .await
            .unwrap();

        let renamed = store.get_document("alice", "bookA").await.unwrap();
        assert_eq!(renamed.pretty_name, "Nice Title");
        assert_eq!(renamed.progress, original.progress);
        assert_eq!(renamed.timestamp, original.timestamp);
        assert_eq!(on_disk(&store).users["alice"].documents["bookA"], renamed);
    }

    #[tokio::test]
    async fn set_pretty_name_reports_missing_targets() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add_user("alice", "p1").await.unwrap();

        let no_user = store.set_pretty_name("bob", "x", "y").await.unwrap_err();
        let no_doc = store.set_pretty_name("alice", "x", "y").await.unwrap_err();

        assert!(matches!(no_user, StoreError::UnknownUser(_)));
        assert!(matches!(no_doc, StoreError::UnknownDocument { .. }));
    }

    #[tokio::test]
    async fn get_document_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add_user("alice", "p1").await.unwrap();

        let err = store.get_document("alice", "missing").await.unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_documents_is_ordered_by_id() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add_user("alice", "p1").await.unwrap();
        for id in ["c", "a", "b"] {
            store.upsert_document("alice", update(id, 0.5)).await.unwrap();
        }

        let ids: Vec<String> = store
            .list_documents("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|(doc, _)| doc.document_id)
            .collect();

        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn authenticate_compares_exactly() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add_user("alice", "5f4dcc3b").await.unwrap();

        assert!(store.authenticate("alice", "5f4dcc3b").await);
        assert!(!store.authenticate("alice", "5F4DCC3B").await);
        assert!(!store.authenticate("alice", "").await);
        assert!(!store.authenticate("bob", "5f4dcc3b").await);
    }

    #[tokio::test]
    async fn failed_persist_keeps_change_in_memory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file").unwrap();
        let store = RecordStore::new(
            Database::default(),
            PersistWriter::new(blocker.join("database.json")),
        );

        let err = store.add_user("alice", "p1").await.unwrap_err();

        assert!(matches!(err, StoreError::Persist(_)));
        assert!(store.snapshot().await.user("alice").is_some());
        assert!(store.persist().await.is_err());
    }

    #[tokio::test]
    async fn concurrent_upserts_all_land() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(history_store(&dir));
        store.add_user("alice", "p1").await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store
                    .upsert_document("alice", update("shared", i as f32 / 16.0))
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let listed = store.list_documents("alice").await.unwrap();
        assert_eq!(listed[0].1.document_history.len(), 15);
        assert_eq!(on_disk(&store), store.snapshot().await);
    }
}
