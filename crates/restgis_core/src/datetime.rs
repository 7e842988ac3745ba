//! Epoch-millisecond date conversion.
//!
//! Services store dates as whole milliseconds since 1970-01-01T00:00:00Z.
//! Conversions here are pure arithmetic and never apply a timezone shift.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Converts epoch milliseconds to a UTC-naive date/time.
///
/// Returns `None` for values outside the representable range.
pub fn millis_to_datetime(millis: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Converts a UTC-naive date/time to epoch milliseconds.
pub fn datetime_to_millis(datetime: &NaiveDateTime) -> i64 {
    datetime.and_utc().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn known_instant() {
        let dt = millis_to_datetime(1_429_885_595_000).unwrap();
        let expected = NaiveDate::from_ymd_opt(2015, 4, 24)
            .unwrap()
            .and_hms_opt(14, 26, 35)
            .unwrap();
        assert_eq!(dt, expected);
        assert_eq!(datetime_to_millis(&dt), 1_429_885_595_000);
    }

    #[test]
    fn keeps_milliseconds_and_negatives() {
        let dt = millis_to_datetime(-1).unwrap();
        assert_eq!(dt.to_string(), "1969-12-31 23:59:59.999");
        assert!(millis_to_datetime(i64::MAX).is_none());
    }
}
