//! Forgiving free-text matching: substring first, bounded edit distance as
//! a fallback.

use std::ops::Range;

/// How a query matched a piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    /// Case-insensitive substring hit, as a byte range into the haystack
    Substring(Range<usize>),
    /// Whole-string match within the edit-distance budget
    Approximate { distance: usize },
}

/// Finds how `query` matches `haystack`, if it does at all.
///
/// An empty query never matches. Queries of a single char only match by
/// containment; longer ones fall back to the Levenshtein distance between
/// the two whole strings, accepted when it is at most
/// `max(1, floor(query_len * 0.28))`.
pub fn find(haystack: &str, query: &str) -> Option<Match> {
    let query = query.trim();
    let query_len = query.chars().count();
    if query_len == 0 {
        return None;
    }

    if let Some(span) = find_ignore_case(haystack, query) {
        return Some(Match::Substring(span));
    }
    if query_len <= 1 {
        return None;
    }

    let distance = levenshtein(haystack, query);
    if distance <= max_distance(query_len) {
        Some(Match::Approximate { distance })
    } else {
        None
    }
}

pub fn matches(haystack: &str, query: &str) -> bool {
    find(haystack, query).is_some()
}

fn max_distance(query_len: usize) -> usize {
    (query_len * 28 / 100).max(1)
}

/// Classic edit distance with unit costs, comparing chars case-insensitively.
/// Keeps two rows of `b.len() + 1` cells.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().flat_map(char::to_lowercase).collect();
    let b: Vec<char> = b.chars().flat_map(char::to_lowercase).collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            let deletion = previous[j + 1] + 1;
            let insertion = current[j] + 1;
            current[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Byte range of the first case-insensitive occurrence of `needle`
pub fn find_ignore_case(haystack: &str, needle: &str) -> Option<Range<usize>> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }

    for (start, _) in haystack.char_indices() {
        let mut expected = needle.iter().peekable();
        for (offset, c) in haystack[start..].char_indices() {
            let folded_matches = c
                .to_lowercase()
                .all(|lower| expected.next().is_some_and(|e| *e == lower));
            if !folded_matches {
                break;
            }
            if expected.peek().is_none() {
                return Some(start..start + offset + c.len_utf8());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_known_distances() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("kitten", "sitten"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("Flaw", "lawn"), 2);
    }

    #[test]
    fn test_levenshtein_ignores_case() {
        assert_eq!(levenshtein("HeLLo", "hello"), 0);
    }

    #[test]
    fn test_matches_within_distance_budget() {
        assert!(matches("kitten", "sitten"));
        assert!(!matches("kitten", "xyz"));
    }

    #[test]
    fn test_empty_query_never_matches() {
        assert!(!matches("anything", ""));
        assert!(!matches("anything", "   "));
        assert!(!matches("", ""));
    }

    #[test]
    fn test_single_char_query_is_containment_only() {
        assert!(matches("Buy milk", "m"));
        assert!(matches("Buy milk", "M"));
        assert!(!matches("b", "x"));
    }

    #[test]
    fn test_substring_match_is_case_insensitive() {
        assert_eq!(find("Call the Dentist", "dentist"), Some(Match::Substring(9..16)));
    }

    #[test]
    fn test_budget_grows_with_query_length() {
        // 11 chars -> floor(3.08) = 3 edits allowed
        assert!(matches("documentation", "docmntation"));
        // 4 chars -> budget of 1
        assert!(!matches("milk", "mxxk"));
        assert!(matches("milk", "silk"));
    }

    #[test]
    fn test_approximate_match_reports_distance() {
        assert_eq!(find("groceries", "grocerys"), Some(Match::Approximate { distance: 2 }));
    }

    #[test]
    fn test_find_ignore_case_handles_multibyte() {
        let haystack = "Café Über";
        let span = find_ignore_case(haystack, "über").unwrap();
        assert_eq!(&haystack[span], "Über");
        assert_eq!(find_ignore_case("abc", "abcd"), None);
    }
}
