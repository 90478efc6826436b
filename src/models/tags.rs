use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::task::{Task, normalize_tag};

/// Number of tasks referencing each tag, in first-seen order.
///
/// Derived state: `rebuild_from` over the task list is always the reference
/// result, the other mutators only patch it incrementally.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct TagRegistry {
    counts: IndexMap<String, usize>,
}

impl TagRegistry {
    pub fn rebuild_from(tasks: &[Task]) -> Self {
        let mut registry = TagRegistry::default();
        for task in tasks {
            registry.apply(&task.tags, &[] as &[&str]);
        }
        registry
    }

    pub fn apply<A, R>(&mut self, added: &[A], removed: &[R])
    where
        A: AsRef<str>,
        R: AsRef<str>,
    {
        for tag in added {
            *self.counts.entry(tag.as_ref().to_string()).or_insert(0) += 1;
        }
        for tag in removed {
            let tag = tag.as_ref();
            if let Some(count) = self.counts.get_mut(tag) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.counts.shift_remove(tag);
                }
            }
        }
    }

    /// Moves every task tagged `old` over to `new`, merging the counts.
    /// Both names are compared case-insensitively; renaming a tag onto
    /// itself does nothing. Returns how many tasks were retagged.
    pub fn rename(&mut self, tasks: &mut [Task], old: &str, new: &str) -> usize {
        let (Some(old), Some(new)) = (normalize_tag(old), normalize_tag(new)) else {
            return 0;
        };
        if old == new {
            return 0;
        }

        let mut retagged = 0;
        for task in tasks.iter_mut().filter(|t| t.has_tag(&old)) {
            if task.has_tag(&new) {
                task.tags.retain(|t| *t != old);
                self.apply::<&str, _>(&[], &[old.as_str()]);
            } else {
                for tag in task.tags.iter_mut().filter(|t| **t == old) {
                    *tag = new.clone();
                }
                self.apply(&[new.as_str()], &[old.as_str()]);
            }
            retagged += 1;
        }

        // Drop a stale entry even when no task held it.
        self.counts.shift_remove(&old);
        debug!(%old, %new, retagged, "renamed tag");
        retagged
    }

    /// Up to `n` tags by descending count; equal counts keep insertion order
    pub fn top_n(&self, n: usize) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> = self
            .counts
            .iter()
            .map(|(tag, count)| (tag.as_str(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(n);
        entries
    }

    pub fn count(&self, tag: &str) -> usize {
        self.counts.get(tag).copied().unwrap_or(0)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.counts.contains_key(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(tag, count)| (tag.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
