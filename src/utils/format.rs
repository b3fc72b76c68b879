use chrono::{DateTime, Utc};

/// Relative-time display for timestamps, e.g. "12m ago", "3h ago".
/// Timestamps in the future (clock skew) degrade to "just now".
pub fn time_ago(then: DateTime<Utc>) -> String {
    time_ago_from(then, Utc::now())
}

fn time_ago_from(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - then).num_minutes();
    if minutes < 1 {
        // Covers negative diffs from clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            // Round up: 1h 30m+ becomes 2h
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else if minutes < 7 * 1440 {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    } else if minutes < 30 * 1440 {
        format!("{}w ago", minutes / (7 * 1440))
    } else if minutes < 365 * 1440 {
        format!("{}mo ago", minutes / (30 * 1440))
    } else {
        format!("{}y ago", minutes / (365 * 1440))
    }
}
