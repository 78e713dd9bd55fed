// ABOUTME: Full-store backup into a self-describing envelope file, and restore from one.
// ABOUTME: Restore validates label, headers, encoding, and schema before anything touches the live store file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};
use readmark_core::{BackupEncoding, Database, SCHEMA_VERSION, UnsupportedEncoding};
use thiserror::Error;

use crate::envelope::{Envelope, EnvelopeError};
use crate::persist::{self, PersistError, PersistWriter};
use crate::store::RecordStore;

/// Type label of readmark backup envelopes.
pub const BACKUP_LABEL: &str = "READMARK BACKUP";

/// Value of the `App` header.
pub const APP_HEADER: &str = "https://github.com/readmark/readmark";

/// First schema that knows about `backup_encoding_type`. Older stores always back up as JSON.
const MULTI_ENCODING_SCHEMA: u32 = 2;

/// Errors that can occur while creating or restoring a backup.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("persist error: {0}")]
    Persist(#[from] PersistError),

    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack encode error: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode error: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    #[error("the file does not contain a readmark backup, it contains '{0}'")]
    InvalidEnvelope(String),

    #[error("the backup does not specify a '{0}' header")]
    MissingHeader(&'static str),

    #[error("the backup's Schema header is not a number: '{0}'")]
    InvalidSchemaHeader(String),

    #[error(transparent)]
    UnsupportedEncoding(#[from] UnsupportedEncoding),

    #[error(
        "can not restore a backup from a newer version: the backup has schema {backup}, this build supports up to {supported}"
    )]
    IncompatibleSchema { backup: u32, supported: u32 },
}

/// Back up the live store next to its primary file and return the backup's path.
///
/// The store is persisted first, so the primary file and the backup agree.
pub async fn backup(store: &RecordStore) -> Result<PathBuf, BackupError> {
    let db = store.lock().await;
    write_backup(&db, store.writer())
}

/// Backup body for a store that is already locked by the caller.
pub(crate) fn write_backup(db: &Database, writer: &PersistWriter) -> Result<PathBuf, BackupError> {
    writer.write(db)?;

    let now = Local::now();
    let envelope = encode_backup(db, now)?;
    let encoded = envelope.encode();
    let base = backup_path(writer.path(), now);
    let mut attempt = 0;
    let path = loop {
        let candidate = numbered(&base, attempt);
        match persist::write_new(&candidate, encoded.as_bytes()) {
            Ok(()) => break candidate,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    };

    tracing::info!(
        path = %path.display(),
        schema = db.schema,
        content_type = envelope.header("Content-Type").unwrap_or_default(),
        "created backup"
    );
    Ok(path)
}

/// Encoding a backup of `db` will use.
pub fn backup_encoding(db: &Database) -> Result<BackupEncoding, BackupError> {
    if db.schema < MULTI_ENCODING_SCHEMA {
        return Ok(BackupEncoding::Json);
    }
    db.config
        .backup_encoding_type
        .ok_or_else(|| UnsupportedEncoding(String::new()).into())
}

/// Wrap the encoded store in an envelope stamped with `created_at`.
pub fn encode_backup(db: &Database, created_at: DateTime<Local>) -> Result<Envelope, BackupError> {
    let encoding = backup_encoding(db)?;
    let body = encode_body(db, encoding)?;

    Ok(Envelope::new(BACKUP_LABEL)
        .with_header("App", APP_HEADER)
        .with_header("Content-Type", encoding.content_type())
        .with_header(
            "Created-At",
            created_at.to_rfc3339_opts(SecondsFormat::Secs, false),
        )
        .with_header("Schema", db.schema.to_string())
        .with_body(body))
}

pub fn encode_body(db: &Database, encoding: BackupEncoding) -> Result<Vec<u8>, BackupError> {
    match encoding {
        BackupEncoding::Json => Ok(serde_json::to_vec(db)?),
        BackupEncoding::Msgpack => Ok(rmp_serde::to_vec_named(db)?),
    }
}

pub fn decode_body(body: &[u8], encoding: BackupEncoding) -> Result<Database, BackupError> {
    match encoding {
        BackupEncoding::Json => Ok(serde_json::from_slice(body)?),
        BackupEncoding::Msgpack => Ok(rmp_serde::from_slice(body)?),
    }
}

/// `/data/database.json` becomes `/data/database_2026-03-01-09:05:07.bak`.
pub fn backup_path(db_path: &Path, now: DateTime<Local>) -> PathBuf {
    let base = db_path.to_string_lossy().replacen(".json", "", 1);
    PathBuf::from(format!(
        "{}_{}-{}.bak",
        base,
        now.format("%Y-%m-%d"),
        now.format("%H:%M:%S")
    ))
}

/// `database_<ts>.bak` for the first attempt, then `database_<ts>-1.bak`, `-2`, ...
fn numbered(base: &Path, attempt: u32) -> PathBuf {
    if attempt == 0 {
        return base.to_path_buf();
    }
    let name = base.to_string_lossy();
    let stem = name.strip_suffix(".bak").unwrap_or(&name);
    PathBuf::from(format!("{stem}-{attempt}.bak"))
}

/// Read and validate a backup file without touching anything else.
pub fn read_backup(path: &Path) -> Result<Database, BackupError> {
    let bytes = fs::read(path)?;
    let text = std::str::from_utf8(&bytes).map_err(EnvelopeError::from)?;
    let envelope = Envelope::decode(text)?;

    if envelope.label != BACKUP_LABEL {
        return Err(BackupError::InvalidEnvelope(envelope.label));
    }

    let content_type = envelope
        .header("Content-Type")
        .ok_or(BackupError::MissingHeader("Content-Type"))?;
    let schema_header = envelope
        .header("Schema")
        .ok_or(BackupError::MissingHeader("Schema"))?;
    let header_schema: u32 = schema_header
        .parse()
        .map_err(|_| BackupError::InvalidSchemaHeader(schema_header.to_string()))?;
    check_schema(header_schema)?;

    let encoding = BackupEncoding::from_content_type(content_type)?;
    let db = decode_body(&envelope.body, encoding)?;
    check_schema(db.schema)?;

    if db.schema != header_schema {
        tracing::warn!(
            header = header_schema,
            body = db.schema,
            "backup Schema header disagrees with the stored schema, using the stored one"
        );
    }

    Ok(db)
}

/// Replace the store file at `db_path` with the contents of a backup.
///
/// Must run before the store is loaded. The restored store keeps its own
/// schema; migrations only run on the next load.
pub fn restore(backup_path: &Path, db_path: &Path) -> Result<Database, BackupError> {
    tracing::info!(backup = %backup_path.display(), "trying to restore database");

    let db = read_backup(backup_path)?;

    tracing::info!(path = %db_path.display(), schema = db.schema, "restoring the database file");
    PersistWriter::new(db_path).write(&db)?;

    tracing::info!("restore complete");
    Ok(db)
}

fn check_schema(schema: u32) -> Result<(), BackupError> {
    if schema > SCHEMA_VERSION {
        return Err(BackupError::IncompatibleSchema {
            backup: schema,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(())
}
