use chrono::{DateTime, Datelike, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_DESCRIPTION_LIMIT: usize = 300;

static LINE_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\r\n|\n|<br\s*/?>").expect("valid line break regex"));

/// Shortens a description for a list row and flattens line breaks.
///
/// A description whose raw length reaches `limit` keeps its first `limit - 1`
/// characters; shorter ones keep the whole trimmed text. Lengths count chars,
/// and the cut is clamped to the trimmed text so short or empty input never
/// fails.
pub fn decorate_description(description: &str, limit: usize) -> String {
    let trimmed = description.trim();
    let raw_len = description.chars().count();
    let trimmed_len = trimmed.chars().count();

    let keep = if raw_len >= limit {
        limit.saturating_sub(1)
    } else {
        trimmed_len
    };
    let keep = keep.min(trimmed_len);

    let cut: String = trimmed.chars().take(keep).collect();
    LINE_BREAK_RE.replace_all(&cut, " ").into_owned()
}

/// "3 hours ago" style label with one-hour resolution.
pub fn relative_time(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(created);
    let past = elapsed >= Duration::zero();
    let span = if past { elapsed } else { -elapsed };

    if span < Duration::days(1) {
        let hours = span.num_hours();
        let unit = if hours == 1 { "hour" } else { "hours" };
        return if past {
            format!("{hours} {unit} ago")
        } else {
            format!("in {hours} {unit}")
        };
    }

    if span < Duration::weeks(1) {
        let days = (now.date_naive() - created.date_naive()).num_days().abs();
        return match (past, days) {
            (true, 1) => "Yesterday".to_string(),
            (false, 1) => "Tomorrow".to_string(),
            (true, n) => format!("{n} days ago"),
            (false, n) => format!("in {n} days"),
        };
    }

    if created.year() == now.year() {
        created.format("%b %-d").to_string()
    } else {
        created.format("%b %-d, %Y").to_string()
    }
}
