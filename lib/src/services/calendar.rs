// lib/src/services/calendar.rs
//! Google-calendar deep-link rendering. Pure formatting, no external call.

use chrono::{Duration, NaiveDateTime};
use url::form_urlencoded;

const BASE_URL: &str = "https://calendar.google.com/calendar/render";
const TIMESTAMP_FMT: &str = "%Y%m%dT%H%M%S";

/// Builds an add-to-calendar link for a one-hour event starting at `start`.
/// All free-text fields are URL-encoded.
pub fn google_calendar_link(title: &str, start: NaiveDateTime, description: &str) -> String {
    let end = start + Duration::hours(1);
    let dates = format!("{}/{}", start.format(TIMESTAMP_FMT), end.format(TIMESTAMP_FMT));
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("action", "TEMPLATE")
        .append_pair("text", title)
        .append_pair("dates", &dates)
        .append_pair("details", description)
        .finish();
    format!("{}?{}", BASE_URL, query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 24).unwrap().and_hms_opt(9, 30, 0).unwrap()
    }

    #[test]
    fn renders_one_hour_range_in_compact_format() {
        let link = google_calendar_link("Checkup", start(), "Room 2");
        assert_eq!(
            link,
            "https://calendar.google.com/calendar/render?action=TEMPLATE&text=Checkup&dates=20260824T093000%2F20260824T103000&details=Room+2"
        );
    }

    #[test]
    fn end_crosses_midnight() {
        let late = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap().and_hms_opt(23, 30, 0).unwrap();
        let link = google_calendar_link("t", late, "");
        assert!(link.contains("20260824T233000%2F20260825T003000"));
    }

    #[test]
    fn free_text_is_url_encoded() {
        let link = google_calendar_link("Medical Appointment - 陳小明", start(), "follow up & bloods");
        assert!(link.contains("text=Medical+Appointment+-+%E9%99%B3%E5%B0%8F%E6%98%8E"));
        assert!(link.contains("details=follow+up+%26+bloods"));
        assert!(!link.contains('陳'));
    }
}
