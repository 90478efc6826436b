//! JSON export/import of the task list.
//!
//! Every task coming from outside the process (an import file or a stored
//! blob) goes through `parse_tasks`, which checks the shape and then builds
//! fully populated `Task` records. Ids and creation times are preserved when
//! they are valid; missing, malformed or duplicated ids are regenerated and
//! missing creation times are assigned in list order.

use std::collections::HashSet;

use jiff::Timestamp;
use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    models::{
        store::LAST_BACKUP_KEY,
        task::{Priority, Task, next_created, normalize_description, normalize_tag},
    },
    services::tasks::TaskStore,
    storage::{Storage, StorageError, save_as},
};

pub const EXPORT_VERSION: &str = "1.0";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_date: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImportFormatError {
    #[error("Import data is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Import data must be an object with a 'tasks' array, or an array of tasks")]
    UnexpectedShape,

    #[error("Import data has no 'tasks' field")]
    MissingTasks,

    #[error("The 'tasks' field must be an array")]
    TasksNotArray,

    #[error("Task #{index} is not an object")]
    TaskNotObject { index: usize },

    #[error("Task #{index} has no string 'text'")]
    MissingText { index: usize },

    #[error("Task #{index} has an empty 'text'")]
    EmptyText { index: usize },

    #[error("Task #{index} has no boolean 'completed'")]
    MissingCompleted { index: usize },
}

#[derive(Debug, Error)]
pub enum ImportTasksError {
    #[error("{0}")]
    Format(#[from] ImportFormatError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum ExportTasksError {
    #[error("Failed to serialize tasks: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub fn export_document(tasks: &[Task]) -> ExportDocument {
    ExportDocument {
        tasks: tasks.to_vec(),
        export_date: Some(Timestamp::now()),
        version: Some(EXPORT_VERSION.to_string()),
    }
}

/// Serializes the whole task list and records the time of this backup
#[tracing::instrument(skip(store))]
pub fn export_tasks<S: Storage>(store: &TaskStore<S>) -> Result<String, ExportTasksError> {
    let document = export_document(store.tasks());
    let json = serde_json::to_string_pretty(&document)?;
    if let Some(exported_at) = document.export_date {
        save_as(store.storage(), LAST_BACKUP_KEY, &exported_at)?;
    }
    info!(tasks = document.tasks.len(), "exported tasks");
    Ok(json)
}

pub fn last_backup(storage: &impl Storage) -> Result<Option<Timestamp>, StorageError> {
    Ok(storage
        .load(LAST_BACKUP_KEY)?
        .and_then(|value| serde_json::from_value(value).ok()))
}

/// Replaces the whole task list with the tasks in `content`.
/// Nothing changes unless the payload passes validation and is saved.
#[tracing::instrument(skip(store, content), fields(bytes = content.len()))]
pub fn import_tasks<S: Storage>(
    store: &mut TaskStore<S>,
    content: &str,
) -> Result<usize, ImportTasksError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| ImportFormatError::InvalidJson(e.to_string()))?;
    let tasks = parse_tasks(&value)?;
    let count = tasks.len();
    store.replace_tasks(tasks)?;
    info!(tasks = count, "imported tasks");
    Ok(count)
}

/// Accepts `{ "tasks": [...] }` or a bare array and returns normalized tasks
pub fn parse_tasks(value: &Value) -> Result<Vec<Task>, ImportFormatError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(document) => match document.get("tasks") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(ImportFormatError::TasksNotArray),
            None => return Err(ImportFormatError::MissingTasks),
        },
        _ => return Err(ImportFormatError::UnexpectedShape),
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let record = item
            .as_object()
            .ok_or(ImportFormatError::TaskNotObject { index })?;
        let text = record
            .get("text")
            .and_then(Value::as_str)
            .ok_or(ImportFormatError::MissingText { index })?;
        if text.trim().is_empty() {
            return Err(ImportFormatError::EmptyText { index });
        }
        let completed = record
            .get("completed")
            .and_then(Value::as_bool)
            .ok_or(ImportFormatError::MissingCompleted { index })?;
        records.push((record, text.trim().to_string(), completed));
    }

    let mut seen_ids = HashSet::with_capacity(records.len());
    let mut last_created = records
        .iter()
        .filter_map(|(record, _, _)| read_created(record))
        .max();

    let tasks = records
        .into_iter()
        .map(|(record, text, completed)| {
            let id = read_id(record)
                .filter(|id| !seen_ids.contains(id))
                .unwrap_or_else(|| fresh_id(&seen_ids));
            seen_ids.insert(id);

            let created = read_created(record).unwrap_or_else(|| {
                let created = next_created(last_created);
                last_created = Some(created);
                created
            });

            Task {
                id,
                text,
                description: normalize_description(
                    record
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                ),
                tags: read_tags(record),
                completed,
                priority: read_priority(record),
                due_date: read_due_date(record),
                created,
            }
        })
        .collect();

    Ok(tasks)
}

fn fresh_id(taken: &HashSet<Uuid>) -> Uuid {
    loop {
        let id = Uuid::new_v4();
        if !taken.contains(&id) {
            return id;
        }
    }
}

fn read_id(record: &Map<String, Value>) -> Option<Uuid> {
    record
        .get("id")
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

/// RFC 3339 strings, or milliseconds since the epoch
fn read_created(record: &Map<String, Value>) -> Option<Timestamp> {
    match record.get("created")? {
        Value::String(raw) => raw.parse().ok(),
        Value::Number(millis) => millis
            .as_i64()
            .and_then(|millis| Timestamp::from_millisecond(millis).ok()),
        _ => None,
    }
}

/// Tags may come as an array or as one comma separated string
fn read_tags(record: &Map<String, Value>) -> Vec<String> {
    let raw: Vec<&str> = match record.get("tags") {
        Some(Value::Array(tags)) => tags.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(tags)) => tags.split(',').collect(),
        _ => vec![],
    };

    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw.into_iter().filter_map(normalize_tag) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

fn read_priority(record: &Map<String, Value>) -> Priority {
    let parsed = match record.get("priority") {
        None | Some(Value::Null) => return Priority::default(),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .and_then(|n| Priority::try_from(n).ok()),
        Some(Value::String(s)) => s.parse().ok(),
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| {
        warn!(priority = ?record.get("priority"), "unreadable priority, using medium");
        Priority::default()
    })
}

/// Accepts `YYYY-MM-DD`, also as the prefix of a longer datetime string
fn read_due_date(record: &Map<String, Value>) -> Option<Date> {
    let raw = match record.get("dueDate") {
        Some(Value::String(raw)) if !raw.trim().is_empty() => raw.trim(),
        _ => return None,
    };
    let parsed = raw
        .parse::<Date>()
        .ok()
        .or_else(|| raw.get(..10).and_then(|prefix| prefix.parse().ok()));
    if parsed.is_none() {
        warn!(due_date = raw, "dropping unreadable due date");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tasks::CreateTaskParameters;
    use crate::storage::memory::MemoryStorage;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_store() -> TaskStore<MemoryStorage> {
        let mut store = TaskStore::open(MemoryStorage::new()).unwrap();
        store
            .create(CreateTaskParameters {
                text: "Write report".to_string(),
                tags: vec!["work".to_string()],
                priority: Priority::High,
                due_date: Some("2099-05-01".parse().unwrap()),
                ..CreateTaskParameters::default()
            })
            .unwrap();
        let done = store
            .create(CreateTaskParameters {
                text: "Water plants".to_string(),
                description: Some("balcony first".to_string()),
                ..CreateTaskParameters::default()
            })
            .unwrap();
        store.toggle(done.id).unwrap();
        store
    }

    #[test]
    fn test_export_then_import_round_trips() {
        let source = sample_store();
        let exported = export_tasks(&source).unwrap();

        let mut target = TaskStore::open(MemoryStorage::new()).unwrap();
        let count = import_tasks(&mut target, &exported).unwrap();

        assert_eq!(count, 2);
        assert_eq!(target.tasks(), source.tasks());
        assert_eq!(target.tags(), source.tags());
    }

    #[test]
    fn test_export_records_last_backup() {
        let store = sample_store();
        assert_eq!(last_backup(store.storage()).unwrap(), None);

        let exported = export_tasks(&store).unwrap();
        let document: ExportDocument = serde_json::from_str(&exported).unwrap();

        assert_eq!(document.version.as_deref(), Some(EXPORT_VERSION));
        assert_eq!(last_backup(store.storage()).unwrap(), document.export_date);
    }

    #[test]
    fn test_import_without_tasks_field_is_rejected() {
        let mut store = sample_store();
        let before = store.tasks().to_vec();

        let result = import_tasks(&mut store, r#"{"exportDate": "2024-01-01T00:00:00Z"}"#);

        assert!(matches!(
            result,
            Err(ImportTasksError::Format(ImportFormatError::MissingTasks))
        ));
        assert_eq!(store.tasks(), before.as_slice());
    }

    #[test]
    fn test_shape_errors() {
        assert_eq!(
            parse_tasks(&json!({"tasks": {}})),
            Err(ImportFormatError::TasksNotArray)
        );
        assert_eq!(parse_tasks(&json!(42)), Err(ImportFormatError::UnexpectedShape));
        assert_eq!(
            parse_tasks(&json!([{"text": "Fine task", "completed": false}, "nope"])),
            Err(ImportFormatError::TaskNotObject { index: 1 })
        );
        assert_eq!(
            parse_tasks(&json!([{"completed": false}])),
            Err(ImportFormatError::MissingText { index: 0 })
        );
        assert_eq!(
            parse_tasks(&json!([{"text": "Fine task", "completed": "yes"}])),
            Err(ImportFormatError::MissingCompleted { index: 0 })
        );
        assert_eq!(
            parse_tasks(&json!([{"text": "  ", "completed": true}])),
            Err(ImportFormatError::EmptyText { index: 0 })
        );
    }

    #[test]
    fn test_invalid_json_is_a_format_error() {
        let mut store = TaskStore::open(MemoryStorage::new()).unwrap();
        assert!(matches!(
            import_tasks(&mut store, "{ nope"),
            Err(ImportTasksError::Format(ImportFormatError::InvalidJson(_)))
        ));
    }

    #[test]
    fn test_legacy_records_are_normalized() {
        let tasks = parse_tasks(&json!([
            {"text": "Legacy one", "completed": false, "id": 1700000000000u64},
            {
                "text": " Legacy two ",
                "completed": true,
                "tags": "Home, Deep Work ,  ",
                "priority": "high",
                "dueDate": "2020-02-02T00:00:00.000Z",
                "created": 1700000000000u64
            },
            {"text": "Odd priority", "completed": false, "priority": 9, "dueDate": "soon"}
        ]))
        .unwrap();

        assert_eq!(tasks[0].priority, Priority::Medium);
        assert_eq!(tasks[0].tags, Vec::<String>::new());
        assert_eq!(tasks[1].text, "Legacy two");
        assert_eq!(tasks[1].tags, vec!["home".to_string(), "deep-work".to_string()]);
        assert_eq!(tasks[1].priority, Priority::High);
        assert_eq!(tasks[1].due_date, Some("2020-02-02".parse().unwrap()));
        assert_eq!(
            tasks[1].created,
            Timestamp::from_millisecond(1_700_000_000_000).unwrap()
        );
        assert_eq!(tasks[2].priority, Priority::Medium);
        assert_eq!(tasks[2].due_date, None);
        assert!(tasks[0].created > tasks[1].created);
        assert!(tasks[2].created > tasks[0].created);
    }

    #[test]
    fn test_duplicate_ids_are_regenerated() {
        let id = Uuid::new_v4().to_string();
        let tasks = parse_tasks(&json!({
            "tasks": [
                {"id": id, "text": "First copy", "completed": false},
                {"id": id, "text": "Second copy", "completed": false}
            ]
        }))
        .unwrap();

        assert_eq!(tasks[0].id.to_string(), id);
        assert_ne!(tasks[1].id, tasks[0].id);
    }
}
