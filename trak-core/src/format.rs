//! Formatting helpers shared by the CLI and the report payload.

use chrono::{DateTime, Duration, Utc};

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>) -> String {
    let now = Utc::now();
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 5 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}

/// Format a session length as `"1h 5m"` or `"5m"`.
///
/// Negative durations (clock skew between processes) render as `"0m"`.
pub fn format_duration(duration: Duration) -> String {
    let minutes = duration.num_minutes().max(0);
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

/// Like [`format_duration`] but keeps seconds, for live status output.
pub fn format_duration_precise(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formats_hours_and_minutes() {
        assert_eq!(format_duration(Duration::minutes(5)), "5m");
        assert_eq!(format_duration(Duration::minutes(65)), "1h 5m");
        assert_eq!(format_duration(Duration::seconds(59)), "0m");
        assert_eq!(format_duration(Duration::seconds(-30)), "0m");
    }

    #[test]
    fn precise_duration_keeps_seconds() {
        assert_eq!(format_duration_precise(Duration::seconds(42)), "42s");
        assert_eq!(format_duration_precise(Duration::seconds(125)), "2m 5s");
        assert_eq!(format_duration_precise(Duration::seconds(3725)), "1h 2m 5s");
    }

    #[test]
    fn relative_time_for_recent_timestamp() {
        assert_eq!(format_relative_time(Utc::now()), "just now");
        let earlier = Utc::now() - Duration::minutes(3);
        assert_eq!(format_relative_time(earlier), "3m ago");
    }
}
