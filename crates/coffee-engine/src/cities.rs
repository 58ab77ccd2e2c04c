//! City time zones for reading and printing meeting times.
//!
//! Only cities on a fixed offset all year are listed. Members anywhere else
//! enter and see times in UTC.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone, Utc};

const HOUR: i32 = 3600;

const FIXED_OFFSETS: &[(&str, i32)] = &[
    ("Moscow", 3 * HOUR),
    ("St Petersburg", 3 * HOUR),
    ("Minsk", 3 * HOUR),
    ("Nizhny Novgorod", 3 * HOUR),
    ("Istanbul", 3 * HOUR),
    ("Yerevan", 4 * HOUR),
    ("Tbilisi", 4 * HOUR),
    ("Yekaterinburg", 5 * HOUR),
    ("Novosibirsk", 7 * HOUR),
];

pub fn offset_for(city: &str) -> Option<FixedOffset> {
    let city = city.trim();
    FIXED_OFFSETS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(city))
        .and_then(|(_, secs)| FixedOffset::east_opt(*secs))
}

/// Parse `dd.mm HH:MM` as local time in `city`, in the current year.
pub fn parse_local_time(text: &str, city: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let with_year = format!("{} {}", now.year(), text.trim());
    let naive = NaiveDateTime::parse_from_str(&with_year, "%Y %d.%m %H:%M").ok()?;
    match offset_for(city) {
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|t| t.with_timezone(&Utc)),
        None => Some(naive.and_utc()),
    }
}

/// e.g. `06 July at 15:00 (UTC+03:00)`
pub fn format_local(time: DateTime<Utc>, city: &str) -> String {
    match offset_for(city) {
        Some(offset) => format!(
            "{} (UTC{})",
            time.with_timezone(&offset).format("%d %B at %H:%M"),
            offset
        ),
        None => format!("{} (UTC)", time.format("%d %B at %H:%M")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 7, 5, 4, 20, 0).unwrap()
    }

    #[test]
    fn parses_in_city_offset() {
        let t = parse_local_time("06.07 15:00", "Moscow", now()).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2020, 7, 6, 12, 0, 0).unwrap());

        let t = parse_local_time(" 06.07 15:00 ", "novosibirsk", now()).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2020, 7, 6, 8, 0, 0).unwrap());
    }

    #[test]
    fn unknown_city_uses_utc() {
        assert!(offset_for("London").is_none());
        let t = parse_local_time("06.07 15:00", "London", now()).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2020, 7, 6, 15, 0, 0).unwrap());
        assert_eq!(format_local(t, "London"), "06 July at 15:00 (UTC)");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_local_time("tomorrow", "Moscow", now()).is_none());
        assert!(parse_local_time("32.07 15:00", "Moscow", now()).is_none());
        assert!(parse_local_time("06.07", "Moscow", now()).is_none());
    }

    #[test]
    fn formats_in_city_offset() {
        let t = Utc.with_ymd_and_hms(2020, 7, 6, 12, 0, 0).unwrap();
        assert_eq!(format_local(t, "Moscow"), "06 July at 15:00 (UTC+03:00)");
    }
}
