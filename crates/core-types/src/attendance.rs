use chrono::{DateTime, Utc};

/// Whole minutes between sign-in and sign-out. Clock skew never yields a
/// negative duration.
pub fn duration_minutes(signed_in_at: DateTime<Utc>, signed_out_at: DateTime<Utc>) -> i32 {
    let minutes = (signed_out_at - signed_in_at).num_minutes().max(0);
    i32::try_from(minutes).unwrap_or(i32::MAX)
}

/// `1 minute`, `45 minutes`, `1 hour`, `3 hours`, `2h 5m`.
pub fn format_duration(minutes: i32) -> String {
    if minutes < 60 {
        let unit = if minutes == 1 { "minute" } else { "minutes" };
        return format!("{} {}", minutes, unit);
    }
    let hours = minutes / 60;
    let remaining = minutes % 60;
    if remaining == 0 {
        let unit = if hours > 1 { "hours" } else { "hour" };
        return format!("{} {}", hours, unit);
    }
    format!("{}h {}m", hours, remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(0), "0 minutes");
        assert_eq!(format_duration(1), "1 minute");
        assert_eq!(format_duration(45), "45 minutes");
        assert_eq!(format_duration(60), "1 hour");
        assert_eq!(format_duration(180), "3 hours");
        assert_eq!(format_duration(125), "2h 5m");
    }

    #[test]
    fn duration_never_negative() {
        let now = Utc::now();
        assert_eq!(duration_minutes(now, now + Duration::minutes(95)), 95);
        assert_eq!(duration_minutes(now, now - Duration::minutes(5)), 0);
    }
}
