use chrono::{DateTime, NaiveDate, Utc};

/// Common date/time formats used throughout the application
pub mod formats {
    /// Date prefix for snapshot filenames: "20240120"
    pub const SNAPSHOT_DATE: &str = "%Y%m%d";

    /// Human-readable format for display: "2024-01-20 15:30:00"
    pub const DISPLAY_FULL: &str = "%Y-%m-%d %H:%M:%S";
}

/// Get current UTC timestamp
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Get the current UTC calendar date
pub fn today_utc() -> NaiveDate {
    now_utc().date_naive()
}

/// Format a date as the compact prefix used for snapshot filenames
pub fn format_snapshot_date(date: &NaiveDate) -> String {
    date.format(formats::SNAPSHOT_DATE).to_string()
}

/// Format a datetime for human-readable display
pub fn format_for_display(datetime: &DateTime<Utc>) -> String {
    datetime.format(formats::DISPLAY_FULL).to_string()
}

/// Convert Unix timestamp to DateTime, if it is representable
pub fn from_unix_timestamp(timestamp: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
}
