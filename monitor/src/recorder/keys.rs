use chrono::{DateTime, TimeZone, Utc};

fn utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

/// Object key for an uploaded log snapshot.
/// e.g. "motion/2025-02-18/20250218T093000000Z_000007.png"
pub fn snapshot_key(prefix: &str, captured_at_ms: i64, seq: u64) -> String {
    let dt = utc(captured_at_ms);
    format!(
        "{prefix}{date}/{ts}_{seq:06}.png",
        date = dt.format("%Y-%m-%d"),
        ts = dt.format("%Y%m%dT%H%M%S%3fZ"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        // 2025-02-18T09:30:00.000Z
        let k = snapshot_key("motion/", 1739871000000, 7);
        assert_eq!(k, "motion/2025-02-18/20250218T093000000Z_000007.png");
    }

    #[test]
    fn keys_sort_in_capture_order() {
        let a = snapshot_key("", 1739871000000, 1);
        let b = snapshot_key("", 1739871000500, 2);
        assert!(a < b);
    }
}
