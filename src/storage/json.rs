use std::{
    fs::{self, OpenOptions, rename, write},
    path::PathBuf,
};

use fs2::FileExt;
use serde_json::{Value, to_string_pretty};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::{Storage, StorageError, validate_key};

/// Backups kept per key
const MAX_BACKUPS: usize = 5;

/// Stores each key as `<dir>/<key>.json`.
///
/// Saves go through a temp file renamed into place while holding an
/// exclusive lock on `<dir>/<key>.lock`; the previous file is copied into
/// `<dir>/backups/` first and only the newest backups are kept.
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn get_key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn get_backup_dir(&self) -> PathBuf {
        self.dir.join("backups")
    }

    fn get_backup_path(&self, key: &str) -> PathBuf {
        let nanos = jiff::Timestamp::now().as_nanosecond();
        self.get_backup_dir().join(format!("{key}-{nanos:020}.json"))
    }

    fn create_backup(&self, key: &str) -> Result<u64, StorageError> {
        let path = self.get_key_path(key);
        let file_exists = fs::exists(&path).map_err(|e| StorageError::BackupFailed {
            path: path.clone(),
            source: e,
        })?;
        if !file_exists {
            return Ok(0);
        }

        let backups_dir = self.get_backup_dir();
        fs::create_dir_all(&backups_dir).map_err(|e| StorageError::BackupFailed {
            path: backups_dir.clone(),
            source: e,
        })?;

        let backup_path = self.get_backup_path(key);
        fs::copy(&path, &backup_path).map_err(|e| StorageError::BackupFailed {
            path: backup_path,
            source: e,
        })
    }

    fn cleanup_old_backups(&self, key: &str) -> Result<(), StorageError> {
        let backup_dir = self.get_backup_dir();
        let backup_dir_exists =
            fs::exists(&backup_dir).map_err(|e| StorageError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?;
        if !backup_dir_exists {
            return Ok(());
        }

        let prefix = format!("{key}-");
        let mut file_entries = fs::read_dir(&backup_dir)
            .map_err(|e| StorageError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?
            .flatten()
            .filter(|entry| entry.metadata().map(|m| m.is_file()).unwrap_or(false))
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .map(|entry| entry.path())
            .collect::<Vec<_>>();

        file_entries.sort();

        let number_of_files_to_delete = file_entries.len().saturating_sub(MAX_BACKUPS);
        for file_path in &file_entries[..number_of_files_to_delete] {
            fs::remove_file(file_path).map_err(|e| StorageError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?;
        }

        Ok(())
    }
}

impl Storage for JsonFileStorage {
    #[tracing::instrument(skip(self), fields(dir = %self.dir.display()))]
    fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        validate_key(key)?;
        let path = self.get_key_path(key);

        match fs::read_to_string(&path) {
            Ok(content) => {
                let value = serde_json::from_str(&content).map_err(|e| {
                    StorageError::ParseFailed {
                        path: path.clone(),
                        source: e,
                    }
                })?;
                debug!(file = %path.display(), "loaded key");
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::LoadFailed {
                key: key.to_string(),
                path,
                source: e,
            }),
        }
    }

    #[tracing::instrument(skip(self, value), fields(dir = %self.dir.display()))]
    fn save(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = self.get_key_path(key);
        let save_failed = |path: PathBuf, source: std::io::Error| StorageError::SaveFailed {
            key: key.to_string(),
            path,
            source,
        };

        fs::create_dir_all(&self.dir).map_err(|e| save_failed(self.dir.clone(), e))?;

        let json = to_string_pretty(value).map_err(|e| StorageError::SerializeFailed {
            key: key.to_string(),
            source: e,
        })?;

        let temp_path = self.dir.join(format!("{key}.json.tmp.{}", Uuid::new_v4()));
        write(&temp_path, json).map_err(|e| save_failed(temp_path.clone(), e))?;

        let lock_file_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_file_path)
            .map_err(|e| save_failed(lock_file_path.clone(), e))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| save_failed(lock_file_path.clone(), e))?;

        let replaced = self
            .create_backup(key)
            .and_then(|_| self.cleanup_old_backups(key))
            .and_then(|_| rename(&temp_path, &path).map_err(|e| save_failed(path.clone(), e)));

        if replaced.is_err() && fs::remove_file(&temp_path).is_err() {
            warn!(file = %temp_path.display(), "could not remove temp file");
        }

        let unlocked = lock_file
            .unlock()
            .map_err(|e| save_failed(lock_file_path, e));

        replaced?;
        unlocked?;
        debug!(file = %path.display(), "saved key");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn count_backups(dir: &std::path::Path, key: &str) -> usize {
        fs::read_dir(dir.join("backups"))
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| {
                        entry
                            .file_name()
                            .to_string_lossy()
                            .starts_with(&format!("{key}-"))
                    })
                    .count()
            })
            .unwrap_or(0)
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().to_path_buf());

        let value = json!([{"text": "Some Task", "completed": false}]);
        storage.save("tasks", &value).unwrap();

        assert_eq!(storage.load("tasks").unwrap(), Some(value));
        assert!(dir.path().join("tasks.json").exists());
    }

    #[test]
    fn test_load_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("not-yet-created"));
        assert_eq!(storage.load("tasks").unwrap(), None);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tasks.json"), "{ this is not valid json }").unwrap();

        let storage = JsonFileStorage::new(dir.path().to_path_buf());
        match storage.load("tasks") {
            Err(StorageError::ParseFailed { .. }) => {}
            other => panic!("Expected ParseFailed error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().to_path_buf());
        assert!(matches!(
            storage.save("../escape", &json!(1)),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_backup_creation_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().to_path_buf());

        for i in 1..=8 {
            storage.save("tasks", &json!({ "round": i })).unwrap();
        }
        storage.save("sort", &json!({"key": "none"})).unwrap();

        assert_eq!(count_backups(dir.path(), "tasks"), MAX_BACKUPS);
        assert_eq!(count_backups(dir.path(), "sort"), 0);
        assert_eq!(storage.load("tasks").unwrap(), Some(json!({ "round": 8 })));
    }

    #[test]
    fn test_backup_directory_created_on_second_save() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().to_path_buf());
        let backups_dir = dir.path().join("backups");

        storage.save("tasks", &json!([])).unwrap();
        assert!(
            !backups_dir.exists(),
            "Backups dir should not exist after first save"
        );

        storage.save("tasks", &json!([1])).unwrap();
        assert!(
            backups_dir.is_dir(),
            "Backups dir should be created on second save"
        );
    }
}
