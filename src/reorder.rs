//! Maps a reordered view back onto the full manual order.

use std::collections::HashSet;
use std::hash::Hash;

/// Applies the new order of the visible items to the complete list.
///
/// The visible group is spliced in, as a block and in its new order, at the
/// slot of whichever visible item came first in `current`. Hidden items keep
/// their relative order. Ids in `visible` that never occur in `current` make
/// the group land at the end.
///
/// NOTE: when filters hide items that sat between visible ones, those hidden
/// items end up after the whole block. That is the intended placement for
/// now, even if it can surprise users dragging inside a filtered view.
pub fn reconcile<T>(current: &[T], visible: &[T]) -> Vec<T>
where
    T: Clone + Eq + Hash,
{
    if visible.is_empty() {
        return current.to_vec();
    }

    let moved: HashSet<&T> = visible.iter().collect();
    let anchor = current.iter().position(|item| moved.contains(item));

    let mut reconciled = Vec::with_capacity(current.len().max(visible.len()));
    for (index, item) in current.iter().enumerate() {
        if Some(index) == anchor {
            reconciled.extend_from_slice(visible);
        }
        if !moved.contains(item) {
            reconciled.push(item.clone());
        }
    }
    if anchor.is_none() {
        reconciled.extend_from_slice(visible);
    }

    reconciled
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reorder_anchors_at_first_visible_position() {
        let current = ["A", "B", "C", "D", "E"];
        assert_eq!(reconcile(&current, &["D", "B"]), vec!["A", "D", "B", "C", "E"]);
    }

    #[test]
    fn test_reorder_with_everything_visible_is_the_new_order() {
        let current = [1, 2, 3, 4];
        assert_eq!(reconcile(&current, &[4, 2, 1, 3]), vec![4, 2, 1, 3]);
    }

    #[test]
    fn test_hidden_items_keep_relative_order() {
        let current = ["h1", "v1", "h2", "v2", "h3", "v3"];
        let reconciled = reconcile(&current, &["v3", "v1", "v2"]);
        assert_eq!(reconciled, vec!["h1", "v3", "v1", "v2", "h2", "h3"]);
    }

    #[test]
    fn test_anchor_item_itself_moved_down() {
        let current = ["A", "B", "C", "D"];
        assert_eq!(reconcile(&current, &["C", "A"]), vec!["C", "A", "B", "D"]);
    }

    #[test]
    fn test_empty_visible_group_keeps_order() {
        let current = ["A", "B"];
        assert_eq!(reconcile(&current, &[]), vec!["A", "B"]);
    }

    #[test]
    fn test_unanchored_group_is_appended() {
        let current = ["A", "B"];
        assert_eq!(reconcile(&current, &["X"]), vec!["A", "B", "X"]);
    }
}
