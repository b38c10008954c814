use chrono::{DateTime, Timelike, Utc};

/// Second-precision event time, used for `ChatMessage.timestamp`.
///
/// Truncates sub-second precision rather than rounding, matching how SQLite
/// `TEXT` timestamp columns are compared downstream.
pub fn now_secs() -> DateTime<Utc> {
    let now = Utc::now();
    now.date_naive()
        .and_hms_opt(now.time().hour(), now.time().minute(), now.time().second())
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_secs_has_no_subsecond_component() {
        let t = now_secs();
        assert_eq!(t.timestamp_subsec_nanos(), 0);
    }
}
