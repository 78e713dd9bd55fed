// ABOUTME: Closed set of body encodings used by backup envelopes.
// ABOUTME: Resolves config strings and MIME content types into BackupEncoding, rejecting anything else.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Raised when a config value or content type names an encoding readmark does not speak.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported backup encoding '{0}'")]
pub struct UnsupportedEncoding(pub String);

/// Encoding of the store inside a backup envelope body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupEncoding {
    Json,
    Msgpack,
}

impl BackupEncoding {
    /// The value used for `backup_encoding_type` in the store config.
    pub fn as_str(self) -> &'static str {
        match self {
            BackupEncoding::Json => "json",
            BackupEncoding::Msgpack => "msgpack",
        }
    }

    /// The MIME type written to the envelope's `Content-Type` header.
    pub fn content_type(self) -> &'static str {
        match self {
            BackupEncoding::Json => "application/json",
            BackupEncoding::Msgpack => "application/vnd.msgpack",
        }
    }

    /// Resolve an envelope `Content-Type` header back into an encoding.
    pub fn from_content_type(content_type: &str) -> Result<Self, UnsupportedEncoding> {
        match content_type.trim() {
            "application/json" => Ok(BackupEncoding::Json),
            "application/vnd.msgpack" => Ok(BackupEncoding::Msgpack),
            other => Err(UnsupportedEncoding(other.to_string())),
        }
    }
}

impl FromStr for BackupEncoding {
    type Err = UnsupportedEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(BackupEncoding::Json),
            "msgpack" => Ok(BackupEncoding::Msgpack),
            other => Err(UnsupportedEncoding(other.to_string())),
        }
    }
}

impl fmt::Display for BackupEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serde adapter for `Option<BackupEncoding>` config fields.
///
/// Stores older than schema 2 have no encoding at all, so a missing field or an
/// empty string decodes to `None`. Unknown names are a decode error.
pub(crate) mod optional {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::BackupEncoding;

    pub fn serialize<S>(value: &Option<BackupEncoding>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.map(BackupEncoding::as_str).unwrap_or(""))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<BackupEncoding>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") => Ok(None),
            Some(name) => name.parse().map(Some).map_err(D::Error::custom),
        }
    }
}
