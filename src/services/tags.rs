use thiserror::Error;
use tracing::info;

use crate::{
    models::task::{ValidationError, normalize_tag},
    services::tasks::TaskStore,
    storage::{Storage, StorageError},
};

#[derive(Debug, Error)]
pub enum RenameTagError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct RenameTagParameters {
    pub old: String,
    pub new: String,
}

/// Renames a tag across every task, merging into `new` when it already
/// exists. Returns how many tasks were retagged; renaming a tag onto itself,
/// or renaming a tag nobody uses, changes nothing.
pub fn rename_tag<S: Storage>(
    store: &mut TaskStore<S>,
    parameters: RenameTagParameters,
) -> Result<usize, RenameTagError> {
    let old = normalize_tag(&parameters.old)
        .ok_or_else(|| ValidationError::InvalidTag(parameters.old.clone()))?;
    let new = normalize_tag(&parameters.new)
        .ok_or_else(|| ValidationError::InvalidTag(parameters.new.clone()))?;

    if old == new || !store.tags().contains(&old) {
        return Ok(0);
    }

    let retagged = store.transact(|state| {
        let retagged = state.tags.rename(&mut state.tasks, &old, &new);
        Ok::<_, RenameTagError>(retagged)
    })?;

    info!(%old, %new, retagged, "renamed tag");
    Ok(retagged)
}

/// Tags with their task counts, most used first
pub fn tag_summary<S: Storage>(store: &TaskStore<S>, limit: Option<usize>) -> Vec<(String, usize)> {
    let tags = store.tags();
    tags.top_n(limit.unwrap_or(tags.len()))
        .into_iter()
        .map(|(tag, count)| (tag.to_string(), count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{store::TAGS_KEY, tags::TagRegistry},
        services::tasks::CreateTaskParameters,
        storage::memory::MemoryStorage,
    };
    use pretty_assertions::assert_eq;

    fn store_with(tagged: &[&[&str]]) -> TaskStore<MemoryStorage> {
        let mut store = TaskStore::open(MemoryStorage::new()).unwrap();
        for (i, tags) in tagged.iter().enumerate() {
            store
                .create(CreateTaskParameters {
                    text: format!("Task number {i}"),
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                    ..CreateTaskParameters::default()
                })
                .unwrap();
        }
        store
    }

    fn rename(old: &str, new: &str) -> RenameTagParameters {
        RenameTagParameters {
            old: old.to_string(),
            new: new.to_string(),
        }
    }

    #[test]
    fn test_rename_merges_into_existing_tag() {
        let mut store = store_with(&[&["work"], &["work"], &["work"], &["job"], &["job"]]);

        let retagged = rename_tag(&mut store, rename("work", "job")).unwrap();

        assert_eq!(retagged, 3);
        assert_eq!(store.tags().count("job"), 5);
        assert!(!store.tags().contains("work"));
        assert!(store.tasks().iter().all(|t| !t.has_tag("work")));
        assert_eq!(
            store.storage().get(TAGS_KEY).unwrap(),
            serde_json::json!({"job": 5})
        );
    }

    #[test]
    fn test_rename_is_case_insensitive() {
        let mut store = store_with(&[&["work"]]);
        assert_eq!(rename_tag(&mut store, rename("WORK", "Office")).unwrap(), 1);
        assert_eq!(store.tags().count("office"), 1);
    }

    #[test]
    fn test_rename_to_same_tag_is_noop() {
        let mut store = store_with(&[&["work"]]);
        assert_eq!(rename_tag(&mut store, rename("work", " Work ")).unwrap(), 0);
        assert_eq!(store.tags().count("work"), 1);
    }

    #[test]
    fn test_rename_to_invalid_tag_fails() {
        let mut store = store_with(&[&["work"]]);
        assert!(matches!(
            rename_tag(&mut store, rename("work", "***")),
            Err(RenameTagError::Validation(ValidationError::InvalidTag(_)))
        ));
        assert_eq!(store.tags().count("work"), 1);
    }

    #[test]
    fn test_registry_stays_consistent_with_tasks() {
        let mut store = store_with(&[&["a", "b"], &["b", "c"], &["c"]]);
        rename_tag(&mut store, rename("c", "a")).unwrap();
        assert_eq!(store.tags(), &TagRegistry::rebuild_from(store.tasks()));
    }

    #[test]
    fn test_tag_summary() {
        let store = store_with(&[&["home"], &["work", "home"], &["misc"]]);
        assert_eq!(
            tag_summary(&store, Some(2)),
            vec![("home".to_string(), 2), ("work".to_string(), 1)]
        );
        assert_eq!(tag_summary(&store, None).len(), 3);
    }
}
