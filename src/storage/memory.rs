use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::Value;

use crate::storage::{Storage, StorageError, validate_key};

/// Keeps every key in memory. Handy for embedding and for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RefCell<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.borrow().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        validate_key(key)?;
        Ok(self.get(key))
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        validate_key(key)?;
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_replaces_previous_value() {
        let storage = MemoryStorage::new();
        storage.save("tasks", &json!([1])).unwrap();
        storage.save("tasks", &json!([2, 3])).unwrap();
        assert_eq!(storage.load("tasks").unwrap(), Some(json!([2, 3])));
        assert_eq!(storage.load("missing").unwrap(), None);
        assert_eq!(storage.keys(), vec!["tasks".to_string()]);
    }
}
