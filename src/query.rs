//! Turns the authoritative task list into the list shown to the user.
//!
//! `view` is a pure function: it borrows the tasks, never reorders or edits
//! them, and everything it needs comes from the `QuerySpec`.

use std::cmp::Ordering;

use jiff::civil::Date;
use tracing::trace;

use crate::models::{
    query::{QuerySpec, QuickSort, SortDirection, SortKey, SortState, StatusFilter},
    task::{Task, normalize_tag},
};

pub mod fuzzy;

use fuzzy::Match;

/// Which field of a task matched the search text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchField {
    Text,
    Description,
    /// Index into the task's tags
    Tag(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHit {
    pub field: MatchField,
    pub matched: Match,
}

#[derive(Debug, Clone)]
pub struct ViewEntry<'a> {
    pub task: &'a Task,
    /// Empty unless the text filter ran
    pub hits: Vec<FieldHit>,
}

impl ViewEntry<'_> {
    /// Substring span inside the title, for highlighting
    pub fn text_span(&self) -> Option<std::ops::Range<usize>> {
        self.hits.iter().find_map(|hit| match (&hit.field, &hit.matched) {
            (MatchField::Text, Match::Substring(span)) => Some(span.clone()),
            _ => None,
        })
    }

    pub fn tag_matched(&self, index: usize) -> bool {
        self.hits.iter().any(|hit| hit.field == MatchField::Tag(index))
    }
}

#[derive(Debug, Clone, Default)]
pub struct View<'a> {
    pub entries: Vec<ViewEntry<'a>>,
    /// Number of tasks the search text matched, when it was applied
    pub search_matches: Option<usize>,
}

impl<'a> View<'a> {
    pub fn tasks(&self) -> impl Iterator<Item = &'a Task> + '_ {
        self.entries.iter().map(|entry| entry.task)
    }

    pub fn ids(&self) -> Vec<uuid::Uuid> {
        self.tasks().map(|t| t.id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
}

pub fn stats(tasks: &[Task]) -> Stats {
    let completed = tasks.iter().filter(|t| t.completed).count();
    Stats {
        total: tasks.len(),
        active: tasks.len() - completed,
        completed,
    }
}

pub fn view<'a>(tasks: &'a [Task], spec: &QuerySpec) -> View<'a> {
    // `Some(None)`: the filter names a tag no task can carry
    let tag_filter = spec.tag.as_deref().map(normalize_tag);
    let search = spec.active_search();

    let mut entries: Vec<ViewEntry<'a>> = Vec::new();
    for task in tasks {
        if !matches_status(task, spec.status) {
            continue;
        }
        if spec.priority.is_some_and(|p| p != task.priority) {
            continue;
        }
        match &tag_filter {
            Some(Some(tag)) if !task.has_tag(tag) => continue,
            Some(None) => continue,
            _ => {}
        }
        if spec.has_due_range() && !within_due_range(task.due_date, spec.due_from, spec.due_to) {
            continue;
        }

        let hits = match search {
            Some(query) => {
                let hits = search_task(task, query);
                if hits.is_empty() {
                    continue;
                }
                hits
            }
            None => vec![],
        };

        entries.push(ViewEntry { task, hits });
    }

    let search_matches = search.map(|_| entries.len());
    sort_entries(&mut entries, spec);

    trace!(
        total = tasks.len(),
        shown = entries.len(),
        ?search_matches,
        "computed view"
    );

    View {
        entries,
        search_matches,
    }
}

fn matches_status(task: &Task, status: StatusFilter) -> bool {
    match status {
        StatusFilter::All => true,
        StatusFilter::Active => !task.completed,
        StatusFilter::Completed => task.completed,
    }
}

/// Inclusive on both ends; a task without a due date never fits a range
fn within_due_range(due: Option<Date>, from: Option<Date>, to: Option<Date>) -> bool {
    let Some(due) = due else {
        return false;
    };
    from.is_none_or(|from| due >= from) && to.is_none_or(|to| due <= to)
}

fn search_task(task: &Task, query: &str) -> Vec<FieldHit> {
    let mut hits = Vec::new();

    if let Some(matched) = fuzzy::find(&task.text, query) {
        hits.push(FieldHit {
            field: MatchField::Text,
            matched,
        });
    }

    if let Some(matched) = task
        .description
        .as_deref()
        .and_then(|description| fuzzy::find(description, query))
    {
        hits.push(FieldHit {
            field: MatchField::Description,
            matched,
        });
    }

    for (index, tag) in task.tags.iter().enumerate() {
        if let Some(matched) = fuzzy::find(tag, query) {
            hits.push(FieldHit {
                field: MatchField::Tag(index),
                matched,
            });
        }
    }

    hits
}

// `sort_by` is stable, so equal keys keep their manual order.
fn sort_entries(entries: &mut [ViewEntry<'_>], spec: &QuerySpec) {
    if let Some(quick) = spec.quick_sort {
        entries.sort_by(|a, b| compare_quick(a.task, b.task, quick, spec.sort.direction));
    } else if spec.sort.key != SortKey::None {
        entries.sort_by(|a, b| compare_column(a.task, b.task, spec.sort));
    } else {
        entries.sort_by_key(|entry| entry.task.completed);
    }
}

fn compare_quick(a: &Task, b: &Task, quick: QuickSort, direction: SortDirection) -> Ordering {
    match quick {
        QuickSort::Priority => a.priority.cmp(&b.priority),
        QuickSort::Date => b.created.cmp(&a.created),
        QuickSort::Title => direction.apply(compare_titles(&a.text, &b.text)),
    }
}

fn compare_column(a: &Task, b: &Task, sort: SortState) -> Ordering {
    match sort.key {
        SortKey::None => Ordering::Equal,
        SortKey::Title => sort.direction.apply(compare_titles(&a.text, &b.text)),
        SortKey::Date => sort.direction.apply(a.created.cmp(&b.created)),
        SortKey::Priority => sort.direction.apply(a.priority.cmp(&b.priority)),
        SortKey::Status => sort.direction.apply(a.completed.cmp(&b.completed)),
        // Undated tasks go last in both directions.
        SortKey::DueDate => match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => sort.direction.apply(x.cmp(&y)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

/// Case-insensitive collation used for titles
pub fn compare_titles(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}
