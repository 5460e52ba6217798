use chrono::{DateTime, Local, Utc};

/// Source of wall-clock time. Swapped for a fixed clock in tests.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Browser/system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Human-readable local time for card meta rows; `…` when the backend has no value yet.
pub(crate) fn format_timestamp(ts: Option<&DateTime<Utc>>) -> String {
    match ts {
        Some(t) => t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        None => "…".to_string(),
    }
}

/// `?list=<id>` link to a list, relative to the current page.
pub(crate) fn share_url(origin: &str, path: &str, list_id: &str) -> String {
    format!("{origin}{path}?list={}", urlencoding::encode(list_id))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp_missing() {
        assert_eq!(format_timestamp(None), "…");
    }

    #[test]
    fn test_share_url_encodes_id() {
        assert_eq!(
            share_url("https://shop.example", "/", "a b"),
            "https://shop.example/?list=a%20b"
        );
    }
}
