use uuid::Uuid;

use crate::models::{query::SortState, tags::TagRegistry, task::Task};

/// Storage keys the task store reads and writes
pub const TASKS_KEY: &str = "tasks";
pub const TAGS_KEY: &str = "tags";
pub const SORT_KEY: &str = "sort";
pub const LAST_BACKUP_KEY: &str = "lastBackup";

/// In-memory state behind a task store: the manual order of tasks plus the
/// state derived from it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Store {
    pub tasks: Vec<Task>,
    pub tags: TagRegistry,
    pub sort: SortState,
}

impl Store {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let tags = TagRegistry::rebuild_from(&tasks);
        Self {
            tasks,
            tags,
            sort: SortState::default(),
        }
    }

    pub fn get_task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    pub fn last_created(&self) -> Option<jiff::Timestamp> {
        self.tasks.iter().map(|t| t.created).max()
    }

    /// Tasks whose short id starts with `prefix` (case-insensitive)
    pub fn find_by_prefix(&self, prefix: &str) -> Vec<&Task> {
        let prefix = prefix.trim().to_lowercase().replace('-', "");
        if prefix.is_empty() {
            return vec![];
        }
        self.tasks
            .iter()
            .filter(|t| t.id.simple().to_string().starts_with(&prefix))
            .collect()
    }
}
