// Human-readable rendering of task durations

use chrono::Duration;

/// Compact duration formatting: `37s`, `5m`, `2h`, `2h15m`
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let total_minutes = total_seconds / 60;
    if total_minutes < 60 {
        return format!("{}m", total_minutes);
    }

    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if minutes == 0 {
        format!("{}h", hours)
    } else {
        format!("{}h{}m", hours, minutes)
    }
}
