// ABOUTME: Post-processing helpers for resolved field values.
// ABOUTME: Publish-date parsing into UTC and the body-derived description fallback.

use chrono::{DateTime, Utc};

/// Maximum characters taken from the body when a description must be derived.
pub const DESCRIPTION_FALLBACK_CHARS: usize = 500;

/// Parse a date string, trying RFC3339 first then falling back to dateparser.
///
/// Loose date-only forms ("Jan 5, 2024") are parsed as midnight UTC before
/// dateparser is consulted, so the calendar day never shifts with the local
/// timezone. Returns None if all parsing attempts fail.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    const LOOSE_PATTERNS: &[&str] = &[
        "%b %e, %Y", // Jan 5, 2024
        "%e %b %Y",  // 5 Jan 2024
        "%b %d, %Y", // Jan 05, 2024
        "%d %b %Y",  // 05 Jan 2024
        "%B %e, %Y", // January 5, 2024
        "%e %B %Y",  // 5 January 2024
        "%B %d, %Y", // January 05, 2024
        "%d %B %Y",  // 05 January 2024
    ];
    for pat in LOOSE_PATTERNS {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(s, pat) {
            let naive_dt = date.and_hms_opt(0, 0, 0)?;
            return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive_dt, Utc));
        }
    }

    dateparser::parse(s).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Derives a description from the body: the first
/// [`DESCRIPTION_FALLBACK_CHARS`] characters, with `...` appended when cut.
pub fn description_from_body(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if body.chars().count() <= DESCRIPTION_FALLBACK_CHARS {
        return Some(body.to_string());
    }
    let cut: String = body.chars().take(DESCRIPTION_FALLBACK_CHARS).collect();
    Some(format!("{}...", cut.trim_end()))
}
