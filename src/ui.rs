use std::ops::Range;

use colored::*;
use jiff::{ToSpan, civil::Date};

use crate::{
    models::task::{Priority, Task},
    query::{MatchField, Stats, ViewEntry},
    weather::WeatherReport,
};

/// Get the terminal width, defaulting to 80 if unavailable
fn get_terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}

pub fn get_status_glyph(task: &Task, is_overdue: bool) -> ColoredString {
    if task.completed {
        "✓".dimmed()
    } else if is_overdue {
        "●".red()
    } else {
        "○".normal()
    }
}

fn priority_marker(priority: Priority) -> ColoredString {
    match priority {
        Priority::High => "!!".red().bold(),
        Priority::Medium => "! ".yellow(),
        Priority::Low => "  ".normal(),
    }
}

/// Splits `text` around a byte span, clamping spans that fall outside it
pub fn split_highlight<'t>(text: &'t str, span: &Range<usize>) -> (&'t str, &'t str, &'t str) {
    let start = span.start.min(text.len());
    let end = span.end.clamp(start, text.len());
    if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
        return (text, "", "");
    }
    (&text[..start], &text[start..end], &text[end..])
}

fn highlight(text: &str, span: Option<Range<usize>>) -> String {
    match span {
        Some(span) => {
            let (before, matched, after) = split_highlight(text, &span);
            format!("{before}{}{after}", matched.black().on_yellow())
        }
        None => text.to_string(),
    }
}

/// Format a due date relative to today (e.g. "today", "tomorrow", "Mar 01")
pub fn format_due(due: Date, today: Date) -> String {
    if due == today {
        "today".to_string()
    } else if today.checked_add(1.day()).ok() == Some(due) {
        "tomorrow".to_string()
    } else if due.year() == today.year() {
        due.strftime("%b %d").to_string()
    } else {
        due.strftime("%Y-%m-%d").to_string()
    }
}

/// Render one entry of the view list: status, short id, priority, title
/// with the search hit highlighted, and right-aligned tags and due date.
pub fn render_task_line(entry: &ViewEntry, today: Date) {
    let task = entry.task;
    let terminal_width = get_terminal_width();
    let is_overdue = task.is_overdue(today);

    let id_str = task.short_id();
    let title = highlight(&task.text, entry.text_span());
    let styled_title = if task.completed {
        title.dimmed().strikethrough()
    } else {
        title.bold()
    };

    let left_section = format!(
        "  {}  {}  {} {}",
        id_str.dimmed(),
        get_status_glyph(task, is_overdue),
        priority_marker(task.priority),
        styled_title
    );
    let left_visible_len = 2 + id_str.len() + 2 + 1 + 2 + 2 + 1 + task.text.chars().count();

    let mut right_parts = vec![];
    let mut right_visible_len = 0;
    for (index, tag) in task.tags.iter().enumerate() {
        let label = format!("#{tag}");
        right_visible_len += label.chars().count() + 1;
        if entry.tag_matched(index) {
            right_parts.push(label.black().on_yellow().to_string());
        } else {
            right_parts.push(label.blue().to_string());
        }
    }
    if let Some(due) = task.due_date {
        let label = format_due(due, today);
        right_visible_len += label.chars().count() + 1;
        if is_overdue {
            right_parts.push(label.red().to_string());
        } else {
            right_parts.push(label.dimmed().to_string());
        }
    }

    let right_section = right_parts.join(" ");
    if !right_section.is_empty() && left_visible_len + right_visible_len + 4 < terminal_width {
        let padding = terminal_width - left_visible_len - right_visible_len - 2;
        println!("{}{}{}", left_section, " ".repeat(padding), right_section);
    } else if !right_section.is_empty() {
        println!("{}  {}", left_section, right_section);
    } else {
        println!("{}", left_section);
    }

    if let Some(description) = &task.description {
        let described_hit = entry
            .hits
            .iter()
            .any(|hit| hit.field == MatchField::Description);
        let first_line = description.lines().next().unwrap_or_default();
        if described_hit {
            println!("{}{}", " ".repeat(16), first_line.yellow());
        } else {
            println!("{}{}", " ".repeat(16), first_line.dimmed());
        }
    }
}

/// Render a view header with title and count
pub fn render_view_header(title: &str, count: usize) {
    let task_word = if count == 1 { "task" } else { "tasks" };
    println!("\n  {} ({} {})\n", title.cyan().bold(), count, task_word);
}

pub fn render_search_summary(matches: Option<usize>, query: &str) {
    if let Some(matches) = matches {
        let word = if matches == 1 { "match" } else { "matches" };
        println!("  {} {} for \"{}\"\n", matches, word, query.yellow());
    }
}

pub fn render_stats(stats: Stats) {
    println!(
        "  {} total  {} {} active  {} {} completed",
        stats.total.to_string().bold(),
        "·".dimmed(),
        stats.active.to_string().bold(),
        "·".dimmed(),
        stats.completed.to_string().bold()
    );
}

pub fn render_tags(tags: &[(String, usize)]) {
    if tags.is_empty() {
        println!("No tags");
        return;
    }

    render_view_header("Tags", tags.len());
    let width = tags.iter().map(|(tag, _)| tag.chars().count()).max().unwrap_or(0);
    for (tag, count) in tags {
        let task_word = if *count == 1 { "task" } else { "tasks" };
        println!(
            "  {:<width$}  {}",
            format!("#{tag}").blue(),
            format!("{count} {task_word}").dimmed(),
            width = width + 1
        );
    }
    println!();
}

fn temperature_unit(units: &str) -> &'static str {
    match units {
        "imperial" => "°F",
        "standard" => "K",
        _ => "°C",
    }
}

pub fn render_weather(report: &WeatherReport, units: &str) {
    println!(
        "\n  {}  {}{}  {}",
        report.location.cyan().bold(),
        format!("{:.1}", report.temperature).bold(),
        temperature_unit(units),
        report.condition
    );
    if !report.description.is_empty() {
        println!("  {}\n", report.description.dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::civil::date;

    #[test]
    fn test_split_highlight() {
        assert_eq!(split_highlight("Buy milk", &(4..8)), ("Buy ", "milk", ""));
        assert_eq!(split_highlight("Buy milk", &(0..3)), ("", "Buy", " milk"));
        assert_eq!(split_highlight("short", &(3..99)), ("sho", "rt", ""));
    }

    #[test]
    fn test_split_highlight_rejects_broken_boundaries() {
        assert_eq!(split_highlight("café", &(0..4)), ("café", "", ""));
    }

    #[test]
    fn test_format_due() {
        let today = date(2026, 3, 30);
        assert_eq!(format_due(today, today), "today");
        assert_eq!(format_due(date(2026, 3, 31), today), "tomorrow");
        assert_eq!(format_due(date(2026, 4, 2), today), "Apr 02");
        assert_eq!(format_due(date(2027, 1, 5), today), "2027-01-05");
    }

    #[test]
    fn test_temperature_unit() {
        assert_eq!(temperature_unit("metric"), "°C");
        assert_eq!(temperature_unit("imperial"), "°F");
        assert_eq!(temperature_unit("standard"), "K");
    }
}
