use std::collections::{HashMap, HashSet};

use jiff::civil::Date;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    models::{
        query::{QuerySpec, SortState},
        store::{SORT_KEY, Store, TAGS_KEY, TASKS_KEY},
        tags::TagRegistry,
        task::{
            Priority, Task, ValidationError, next_created, normalize_description, normalize_tags,
            today, validate_due_date, validate_text,
        },
    },
    query::{self, View},
    reorder::reconcile,
    services::transfer::{ImportFormatError, parse_tasks},
    storage::{Storage, StorageError, save_as},
};

#[derive(Debug, Error)]
pub enum OpenStoreError {
    #[error("Stored task list is corrupt: {0}")]
    Corrupt(#[from] ImportFormatError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum CreateTaskError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum UpdateTaskError {
    #[error("Task '{0}' not found")]
    TaskNotFound(Uuid),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum RemoveTaskError {
    #[error("Task '{0}' not found")]
    TaskNotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum ReorderTasksError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Default, Clone)]
pub struct CreateTaskParameters {
    pub text: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub priority: Priority,
    pub due_date: Option<Date>,
}

/// Partial update; `None` leaves a field untouched. The nested options of
/// `description` and `due_date` allow clearing them.
#[derive(Debug, Default, Clone)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub description: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<Date>>,
}

/// Owns the manual order of tasks and the tag registry derived from it.
///
/// Every mutation is prepared on a copy of the state, written to storage in
/// full, and only then made visible, so a failed operation changes nothing.
pub struct TaskStore<S: Storage> {
    state: Store,
    storage: S,
}

impl<S: Storage> TaskStore<S> {
    #[tracing::instrument(skip(storage))]
    pub fn open(storage: S) -> Result<Self, OpenStoreError> {
        let tasks = match storage.load(TASKS_KEY)? {
            Some(value) => parse_tasks(&value)?,
            None => vec![],
        };
        let mut state = Store::with_tasks(tasks);

        if let Some(stored_tags) = storage.load(TAGS_KEY)? {
            match serde_json::from_value::<TagRegistry>(stored_tags) {
                Ok(stored) if stored == state.tags => {}
                Ok(_) => warn!("stored tag counts disagree with tasks, using rebuilt counts"),
                Err(e) => warn!(error = %e, "ignoring unreadable tag counts"),
            }
        }

        if let Some(sort) = storage.load(SORT_KEY)? {
            match serde_json::from_value::<SortState>(sort) {
                Ok(sort) => state.sort = sort,
                Err(e) => warn!(error = %e, "ignoring unreadable sort state"),
            }
        }

        info!(tasks = state.tasks.len(), tags = state.tags.len(), "opened task store");
        Ok(Self { state, storage })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.state.tasks
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.state.tags
    }

    pub fn sort(&self) -> SortState {
        self.state.sort
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.state.get_task(id)
    }

    pub fn find_by_prefix(&self, prefix: &str) -> Vec<&Task> {
        self.state.find_by_prefix(prefix)
    }

    pub fn view(&self, spec: &QuerySpec) -> View<'_> {
        query::view(&self.state.tasks, spec)
    }

    #[tracing::instrument(skip(self, parameters))]
    pub fn create(&mut self, parameters: CreateTaskParameters) -> Result<Task, CreateTaskError> {
        let text = validate_text(&parameters.text)?;
        let due_date = validate_due_date(parameters.due_date, today())?;
        let tags = normalize_tags(&parameters.tags)?;

        let mut id = Uuid::new_v4();
        while self.state.get_task(id).is_some() {
            id = Uuid::new_v4();
        }

        let task = Task {
            id,
            text,
            description: normalize_description(parameters.description),
            tags,
            completed: false,
            priority: parameters.priority,
            due_date,
            created: next_created(self.state.last_created()),
        };

        let created = self.transact(|store| {
            store.tags.apply(&task.tags, &[] as &[&str]);
            store.tasks.push(task.clone());
            Ok::<_, CreateTaskError>(task)
        })?;

        info!(id = %created.id, "created task");
        Ok(created)
    }

    #[tracing::instrument(skip(self, patch))]
    pub fn update(&mut self, id: Uuid, patch: TaskPatch) -> Result<Task, UpdateTaskError> {
        let updated = self.transact(|store| {
            let index = store.position(id).ok_or(UpdateTaskError::TaskNotFound(id))?;
            let mut task = store.tasks[index].clone();

            if let Some(text) = patch.text {
                task.text = validate_text(&text)?;
            }
            if let Some(description) = patch.description {
                task.description = normalize_description(description);
            }
            if let Some(due_date) = patch.due_date {
                task.due_date = validate_due_date(due_date, today())?;
            }
            if let Some(priority) = patch.priority {
                task.priority = priority;
            }
            if let Some(completed) = patch.completed {
                task.completed = completed;
            }
            if let Some(tags) = patch.tags {
                let tags = normalize_tags(&tags)?;
                let added: Vec<&String> = tags.iter().filter(|t| !task.tags.contains(*t)).collect();
                let removed: Vec<&String> = task.tags.iter().filter(|t| !tags.contains(*t)).collect();
                store.tags.apply(&added, &removed);
                task.tags = tags;
            }

            store.tasks[index] = task.clone();
            Ok::<_, UpdateTaskError>(task)
        })?;

        debug!(id = %updated.id, "updated task");
        Ok(updated)
    }

    /// Flips the completed flag
    pub fn toggle(&mut self, id: Uuid) -> Result<Task, UpdateTaskError> {
        let completed = self
            .state
            .get_task(id)
            .map(|t| t.completed)
            .ok_or(UpdateTaskError::TaskNotFound(id))?;
        self.update(
            id,
            TaskPatch {
                completed: Some(!completed),
                ..TaskPatch::default()
            },
        )
    }

    #[tracing::instrument(skip(self))]
    pub fn remove(&mut self, id: Uuid) -> Result<Task, RemoveTaskError> {
        let removed = self.transact(|store| {
            let index = store.position(id).ok_or(RemoveTaskError::TaskNotFound(id))?;
            let task = store.tasks.remove(index);
            store.tags.apply(&[] as &[&str], &task.tags);
            Ok::<_, RemoveTaskError>(task)
        })?;

        info!(id = %removed.id, "removed task");
        Ok(removed)
    }

    /// Takes the visible ids in their new order and splices them back into
    /// the full list, leaving hidden tasks where they were.
    #[tracing::instrument(skip(self, visible), fields(visible = visible.len()))]
    pub fn reorder(&mut self, visible: &[Uuid]) -> Result<(), ReorderTasksError> {
        let mut seen = HashSet::with_capacity(visible.len());
        for id in visible {
            if self.state.get_task(*id).is_none() {
                return Err(ValidationError::UnknownTask(*id).into());
            }
            if !seen.insert(*id) {
                return Err(ValidationError::DuplicateTask(*id).into());
            }
        }

        self.transact(|store| {
            let current: Vec<Uuid> = store.tasks.iter().map(|t| t.id).collect();
            let order = reconcile(&current, visible);
            let mut by_id: HashMap<Uuid, Task> = store.tasks.drain(..).map(|t| (t.id, t)).collect();
            store.tasks = order.iter().filter_map(|id| by_id.remove(id)).collect();
            Ok::<_, ReorderTasksError>(())
        })?;

        debug!("reordered tasks");
        Ok(())
    }

    /// Removes every task; returns how many were dropped
    #[tracing::instrument(skip(self))]
    pub fn clear(&mut self) -> Result<usize, StorageError> {
        let cleared = self.transact(|store| {
            let count = store.tasks.len();
            store.tasks.clear();
            store.tags.clear();
            Ok::<_, StorageError>(count)
        })?;

        info!(cleared, "cleared all tasks");
        Ok(cleared)
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_completed(&mut self) -> Result<usize, StorageError> {
        let cleared = self.transact(|store| {
            let before = store.tasks.len();
            store.tasks.retain(|t| !t.completed);
            store.tags = TagRegistry::rebuild_from(&store.tasks);
            Ok::<_, StorageError>(before - store.tasks.len())
        })?;

        info!(cleared, "cleared completed tasks");
        Ok(cleared)
    }

    /// Swaps in a whole new task list, e.g. after an import
    pub fn replace_tasks(&mut self, tasks: Vec<Task>) -> Result<(), StorageError> {
        self.transact(|store| {
            store.tags = TagRegistry::rebuild_from(&tasks);
            store.tasks = tasks;
            Ok::<_, StorageError>(())
        })
    }

    pub fn set_sort(&mut self, sort: SortState) -> Result<(), StorageError> {
        save_as(&self.storage, SORT_KEY, &sort)?;
        self.state.sort = sort;
        Ok(())
    }

    /// Runs `change` against a copy of the state, persists the result and
    /// commits it. Nothing is kept if either step fails.
    ///
    /// Only the `tasks` write decides the outcome. The tag counts are a cache
    /// rebuilt on open, so failing to save them is logged and not reported.
    pub(crate) fn transact<T, E>(
        &mut self,
        change: impl FnOnce(&mut Store) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let mut next = self.state.clone();
        let result = change(&mut next)?;
        save_as(&self.storage, TASKS_KEY, &next.tasks)?;
        if let Err(e) = save_as(&self.storage, TAGS_KEY, &next.tags) {
            warn!(error = %e, "could not save tag counts, they will be rebuilt on open");
        }
        self.state = next;
        Ok(result)
    }
}
