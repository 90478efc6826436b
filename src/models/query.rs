use std::cmp::Ordering;

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::models::task::Priority;

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

/// Column the list is sorted by when no quick sort is engaged
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    None,
    Title,
    Date,
    DueDate,
    Priority,
    Status,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// One-shot sort picked from a menu, it wins over the column sort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickSort {
    /// High priority first
    Priority,
    /// Newest first
    Date,
    /// By title, honoring the sort direction
    Title,
}

/// Persisted column sort
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

/// Everything the query engine needs to turn the task list into a view
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub status: StatusFilter,
    pub priority: Option<Priority>,
    pub tag: Option<String>,
    pub due_from: Option<Date>,
    pub due_to: Option<Date>,
    pub search: Option<String>,
    /// Typed search text is only applied once the caller switches it on
    pub search_active: bool,
    pub quick_sort: Option<QuickSort>,
    pub sort: SortState,
}

impl QuerySpec {
    /// The trimmed search text, when the text filter should run
    pub fn active_search(&self) -> Option<&str> {
        if !self.search_active {
            return None;
        }
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|query| !query.is_empty())
    }

    pub fn has_due_range(&self) -> bool {
        self.due_from.is_some() || self.due_to.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_search_requires_toggle() {
        let mut spec = QuerySpec {
            search: Some("  milk ".to_string()),
            ..QuerySpec::default()
        };
        assert_eq!(spec.active_search(), None);

        spec.search_active = true;
        assert_eq!(spec.active_search(), Some("milk"));

        spec.search = Some("   ".to_string());
        assert_eq!(spec.active_search(), None);
    }

    #[test]
    fn test_sort_state_json_shape() {
        let state = SortState {
            key: SortKey::DueDate,
            direction: SortDirection::Desc,
        };
        let value = serde_json::to_value(state).unwrap();
        assert_eq!(value, serde_json::json!({"key": "dueDate", "direction": "desc"}));
    }
}
