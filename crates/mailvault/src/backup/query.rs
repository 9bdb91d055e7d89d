//! Search filter construction for incremental runs

use chrono::{DateTime, Duration, Utc};

/// Combine a user filter with the incremental date predicate
///
/// The remote grammar is day-granular and evaluated in the mailbox's
/// timezone, so the `after:` date is one day before `since` (in UTC).
/// Messages near the boundary may be backed up twice; none are skipped.
pub fn build_query(filter: Option<&str>, since: Option<DateTime<Utc>>) -> Option<String> {
    let filter = filter.map(str::trim).filter(|f| !f.is_empty());
    let after = since.map(|ts| {
        let day = (ts - Duration::days(1)).date_naive();
        format!("after:{}", day.format("%Y/%m/%d"))
    });

    match (filter, after) {
        (Some(filter), Some(after)) => Some(format!("({}) {}", filter, after)),
        (Some(filter), None) => Some(filter.to_string()),
        (None, Some(after)) => Some(after),
        (None, None) => None,
    }
}
