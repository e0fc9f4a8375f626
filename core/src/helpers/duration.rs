use std::time::Duration;

/// Human readable duration for log lines, e.g. `1m 4s`, `12s`, `3s 250ms`, `18ms`.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    let secs = duration.as_secs();
    let minutes = secs / 60;
    let seconds = secs % 60;
    let ms = total_ms % 1000;

    match (minutes, secs) {
        (m, _) if m > 0 => format!("{}m {}s", m, seconds),
        (0, s) if s >= 10 => format!("{}s", s),
        (0, s) if s > 0 => format!("{}s {}ms", s, ms),
        _ => format!("{}ms", total_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(18)), "18ms");
        assert_eq!(format_duration(Duration::from_millis(3250)), "3s 250ms");
        assert_eq!(format_duration(Duration::from_secs(12)), "12s");
        assert_eq!(format_duration(Duration::from_secs(64)), "1m 4s");
        assert_eq!(format_duration(Duration::from_secs(3700)), "61m 40s");
    }
}
