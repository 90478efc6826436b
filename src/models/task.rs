use jiff::Timestamp;
use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Minimum number of (trimmed) characters a task title must have
pub const MIN_TEXT_LEN: usize = 3;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// UUID to identify the task, never reused
    pub id: Uuid,
    /// Title of the task
    pub text: String,
    /// Optional longer description
    #[serde(default)]
    pub description: Option<String>,
    /// Normalized tags, without duplicates
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the task is done
    #[serde(default)]
    pub completed: bool,
    /// Priority of the task
    #[serde(default)]
    pub priority: Priority,
    /// Calendar date the task is due
    #[serde(default)]
    pub due_date: Option<Date>,
    /// When the task was inserted in the store
    pub created: Timestamp,
}

impl Task {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// First eight hex chars of the id, used for display and lookup
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    pub fn is_overdue(&self, today: Date) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < today)
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    High = 1,
    #[default]
    Medium = 2,
    Low = 3,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::High),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::Low),
            other => Err(ValidationError::InvalidPriority(other)),
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority as u8
    }
}

impl std::str::FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "high" | "h" => Ok(Priority::High),
            "2" | "medium" | "m" => Ok(Priority::Medium),
            "3" | "low" | "l" => Ok(Priority::Low),
            _ => Err(ValidationError::UnknownPriority(s.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Task text must be at least 3 characters long (got '{0}')")]
    TextTooShort(String),

    #[error("Due date {0} is in the past")]
    DueDateInPast(Date),

    #[error("Invalid tag '{0}': tags may only contain letters, digits, '-' and '_'")]
    InvalidTag(String),

    #[error("Invalid priority {0}: expected 1 (high), 2 (medium) or 3 (low)")]
    InvalidPriority(u8),

    #[error("Unknown priority '{0}': expected high, medium or low")]
    UnknownPriority(String),

    #[error("Task '{0}' does not exist")]
    UnknownTask(Uuid),

    #[error("Task '{0}' appears more than once in the new order")]
    DuplicateTask(Uuid),
}

/// Trims and checks the minimum title length, returning the stored form
pub fn validate_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_TEXT_LEN {
        return Err(ValidationError::TextTooShort(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

pub fn validate_due_date(due_date: Option<Date>, today: Date) -> Result<Option<Date>, ValidationError> {
    match due_date {
        Some(date) if date < today => Err(ValidationError::DueDateInPast(date)),
        other => Ok(other),
    }
}

/// Blank descriptions are stored as absent
pub fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// Lowercases, collapses whitespace into `-` and drops anything outside
/// `[a-z0-9_-]`. Returns `None` when nothing is left.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let mut tag = String::with_capacity(raw.len());
    let mut pending_dash = false;

    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() {
            pending_dash = true;
            continue;
        }
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
            continue;
        }
        if pending_dash && !tag.is_empty() {
            tag.push('-');
        }
        pending_dash = false;
        tag.push(c);
    }

    if tag.is_empty() { None } else { Some(tag) }
}

/// Normalizes every tag, rejecting the first one that ends up empty
pub fn normalize_tags<S: AsRef<str>>(raw: &[S]) -> Result<Vec<String>, ValidationError> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for candidate in raw {
        let tag = normalize_tag(candidate.as_ref())
            .ok_or_else(|| ValidationError::InvalidTag(candidate.as_ref().to_string()))?;
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Ok(tags)
}

/// Next creation timestamp, strictly after `last`
pub fn next_created(last: Option<Timestamp>) -> Timestamp {
    let now = Timestamp::now();
    match last {
        Some(last) if now <= last => last
            .checked_add(jiff::SignedDuration::from_nanos(1))
            .unwrap_or(last),
        _ => now,
    }
}

pub fn today() -> Date {
    jiff::Zoned::now().date()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("  Work "), Some("work".to_string()));
        assert_eq!(normalize_tag("Deep   Focus"), Some("deep-focus".to_string()));
        assert_eq!(normalize_tag("q3_plan!"), Some("q3_plan".to_string()));
        assert_eq!(normalize_tag("¿?"), None);
        assert_eq!(normalize_tag("   "), None);
    }

    #[test]
    fn test_normalize_tags_dedups_and_rejects_empty() {
        let tags = normalize_tags(&["Home", "home ", "errands"]).unwrap();
        assert_eq!(tags, vec!["home".to_string(), "errands".to_string()]);

        let err = normalize_tags(&["ok", "!!"]).unwrap_err();
        assert_eq!(err, ValidationError::InvalidTag("!!".to_string()));
    }

    #[test]
    fn test_validate_text() {
        assert_eq!(validate_text("  Buy milk  ").unwrap(), "Buy milk");
        assert!(matches!(
            validate_text("  ab "),
            Err(ValidationError::TextTooShort(_))
        ));
        assert!(validate_text("").is_err());
    }

    #[test]
    fn test_validate_due_date() {
        let today = today();
        let yesterday = today.yesterday().unwrap();
        assert_eq!(validate_due_date(Some(today), today), Ok(Some(today)));
        assert_eq!(validate_due_date(None, today), Ok(None));
        assert_eq!(
            validate_due_date(Some(yesterday), today),
            Err(ValidationError::DueDateInPast(yesterday))
        );
    }

    #[test]
    fn test_priority_serializes_as_integer() {
        let json = serde_json::to_string(&Priority::High).unwrap();
        assert_eq!(json, "1");
        let parsed: Priority = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, Priority::Low);
        assert!(serde_json::from_str::<Priority>("7").is_err());
    }

    #[test]
    fn test_priority_from_str() {
        assert_eq!("high".parse::<Priority>(), Ok(Priority::High));
        assert_eq!("2".parse::<Priority>(), Ok(Priority::Medium));
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_next_created_is_strictly_increasing() {
        let first = next_created(None);
        let far_future = first
            .checked_add(jiff::SignedDuration::from_hours(1))
            .unwrap();
        let second = next_created(Some(far_future));
        assert!(second > far_future);
    }

    #[test]
    fn test_task_serializes_camel_case() {
        let task = Task {
            id: Uuid::new_v4(),
            text: "Write report".to_string(),
            description: None,
            tags: vec!["work".to_string()],
            completed: false,
            priority: Priority::High,
            due_date: Some("2030-01-15".parse().unwrap()),
            created: Timestamp::now(),
        };
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["dueDate"], "2030-01-15");
        assert_eq!(value["priority"], 1);
    }
}
