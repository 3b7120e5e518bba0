use chrono::format::strftime::StrftimeItems;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Europe::Stockholm;

use crate::error::DateParseError;

const MONTHS_SV: [(&str, u32); 12] = [
    ("januari", 1),
    ("februari", 2),
    ("mars", 3),
    ("april", 4),
    ("maj", 5),
    ("juni", 6),
    ("juli", 7),
    ("augusti", 8),
    ("september", 9),
    ("oktober", 10),
    ("november", 11),
    ("december", 12),
];

pub fn format_rfc822(datetime: DateTime<Utc>) -> String {
    let format = StrftimeItems::new("%a, %d %b %Y %H:%M:%S %z");
    datetime
        .with_timezone(&Stockholm)
        .format_with_items(format)
        .to_string()
}

/// Compact `yyyyMMddHHmmss` stamp used as the guid fragment.
pub fn format_guid_stamp(datetime: DateTime<Utc>) -> String {
    datetime
        .with_timezone(&Stockholm)
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// Calendar date of `datetime` on the wall clock of the news site.
pub fn local_date(datetime: DateTime<Utc>) -> NaiveDate {
    datetime.with_timezone(&Stockholm).date_naive()
}

pub fn local_year(datetime: DateTime<Utc>) -> i32 {
    use chrono::Datelike;
    datetime.with_timezone(&Stockholm).year()
}

/// Parses dates such as `5 oktober 2026` into local midnight.
pub fn parse_news_date(date_str: &str) -> Result<DateTime<Utc>, DateParseError> {
    let parts: Vec<&str> = date_str.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(DateParseError::Format(date_str.to_string()));
    }

    let day = parts[0].trim_end_matches('.').parse::<u32>()?;
    let month_name = parts[1].to_lowercase();
    let month = MONTHS_SV
        .iter()
        .find(|(name, _)| *name == month_name)
        .map(|(_, number)| *number)
        .ok_or_else(|| DateParseError::Month(parts[1].to_string()))?;
    let year = parts[2].parse::<i32>()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| DateParseError::OutOfRange(date_str.to_string()))?;
    let datetime = NaiveDateTime::new(date, NaiveTime::MIN);
    let stockholm_time = Stockholm
        .from_local_datetime(&datetime)
        .earliest()
        .ok_or_else(|| DateParseError::OutOfRange(date_str.to_string()))?;

    Ok(stockholm_time.with_timezone(&Utc))
}
