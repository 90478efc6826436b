use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

pub mod json;
pub mod memory;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to load '{key}' from '{path}': {source}")]
    LoadFailed {
        key: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON from '{path}': {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to save '{key}' to '{path}': {source}")]
    SaveFailed {
        key: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize '{key}' to JSON: {source}")]
    SerializeFailed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create backup at '{path}': {source}")]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to cleanup old backups in '{dir}': {source}")]
    CleanupFailed {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid storage key '{0}': only letters, digits, '-' and '_' are allowed")]
    InvalidKey(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Opaque key-value persistence for JSON blobs.
///
/// `save` replaces the whole value under `key`; there are no partial writes.
pub trait Storage {
    fn load(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn save(&self, key: &str, value: &Value) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for &S {
    fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        (**self).save(key, value)
    }
}

pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Serializes `value` and saves it under `key`
pub fn save_as<T: serde::Serialize>(
    storage: &impl Storage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_value(value).map_err(|e| StorageError::SerializeFailed {
        key: key.to_string(),
        source: e,
    })?;
    storage.save(key, &json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("tasks").is_ok());
        assert!(validate_key("lastBackup").is_ok());
        assert!(validate_key("last_backup-2").is_ok());
        assert!(matches!(validate_key(""), Err(StorageError::InvalidKey(_))));
        assert!(matches!(
            validate_key("../etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
