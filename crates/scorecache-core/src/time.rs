use crate::error::{CoreError, Result};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

const MATCH_DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

/// Milliseconds since the Unix epoch, used as the `writtenAt` stamp of cache entries.
pub fn now_epoch_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Today's date in UTC as `YYYY-MM-DD`.
pub fn today_utc() -> Result<String> {
    Ok(OffsetDateTime::now_utc().date().format(MATCH_DATE_FORMAT)?)
}

/// Parse a `YYYY-MM-DD` match date.
pub fn parse_match_date(s: &str) -> Result<Date> {
    Date::parse(s.trim(), MATCH_DATE_FORMAT)
        .map_err(|e| CoreError::invalid_date(format!("'{s}': {e}")))
}

/// Parse a match date and render it back as `YYYY-MM-DD`, so equivalent
/// spellings share one cache key.
pub fn canonical_match_date(s: &str) -> Result<String> {
    Ok(parse_match_date(s)?.format(MATCH_DATE_FORMAT)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_match_date() {
        let date = parse_match_date("2025-06-16").unwrap();
        assert_eq!(date.year(), 2025);
        assert_eq!(u8::from(date.month()), 6);
        assert_eq!(date.day(), 16);
    }

    #[test]
    fn test_parse_match_date_rejects_garbage() {
        assert!(parse_match_date("16/06/2025").is_err());
        assert!(parse_match_date("2025-02-30").is_err());
    }

    #[test]
    fn test_canonical_match_date() {
        assert_eq!(canonical_match_date(" 2025-06-16 ").unwrap(), "2025-06-16");
        assert!(matches!(
            canonical_match_date("not-a-date"),
            Err(CoreError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_today_round_trips() {
        let today = today_utc().unwrap();
        assert!(parse_match_date(&today).is_ok());
    }
}
