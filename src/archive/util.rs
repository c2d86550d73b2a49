use crate::error::{ArchiveError, ArchiveResult};
use anyhow::{Context, Result};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

pub fn base_name(path: &Path) -> &str {
    path.file_name().and_then(|s| s.to_str()).unwrap_or("")
}

/// Resolve a wall-clock time in `tz`. Fails on gaps and folds.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> ArchiveResult<DateTime<Tz>> {
    tz.from_local_datetime(&naive)
        .single()
        .ok_or_else(|| ArchiveError::InvalidLocalTime(naive.to_string()))
}

pub fn local_midnight(date: NaiveDate, tz: Tz) -> ArchiveResult<DateTime<Tz>> {
    localize(date.and_time(chrono::NaiveTime::MIN), tz)
}

/// Date stored at offset 3 (length 8, `YYYYMMDD`) of an archive file name.
pub fn parse_embedded_date(name: &str, tz: Tz) -> ArchiveResult<DateTime<Tz>> {
    parse_date_at(name, 3, tz)
}

pub fn parse_date_at(name: &str, offset: usize, tz: Tz) -> ArchiveResult<DateTime<Tz>> {
    let malformed = |segment: &str| ArchiveError::MalformedDate {
        name: name.to_string(),
        segment: segment.to_string(),
    };
    let segment = name
        .get(offset..offset + 8)
        .ok_or_else(|| malformed(name.get(offset..).unwrap_or("")))?;
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(segment));
    }
    let date = NaiveDate::parse_from_str(segment, "%Y%m%d").map_err(|_| malformed(segment))?;
    local_midnight(date, tz)
}

/// Parse a `YYYY-MM-DD` command line date as local midnight.
pub fn parse_day(value: &str, tz: Tz) -> Result<DateTime<Tz>> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date `{value}`, expected YYYY-MM-DD"))?;
    Ok(local_midnight(date, tz)?)
}

pub fn today_midnight(tz: Tz) -> ArchiveResult<DateTime<Tz>> {
    local_midnight(Utc::now().with_timezone(&tz).date_naive(), tz)
}

/// Newest day still considered complete upstream: today minus the safety window.
pub fn default_cutoff(tz: Tz, safety_window_days: u64) -> ArchiveResult<DateTime<Tz>> {
    let today = today_midnight(tz)?.date_naive();
    let day = today
        .checked_sub_days(Days::new(safety_window_days))
        .unwrap_or(NaiveDate::MIN);
    local_midnight(day, tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn embedded_date_uses_fixed_offset() {
        let tz: Tz = "Asia/Tokyo".parse().expect("tz");
        let got = parse_embedded_date("scb2020070112.log.gz", tz).expect("date");
        assert_eq!((got.year(), got.month(), got.day()), (2020, 7, 1));
        assert_eq!(got.format("%H:%M %z").to_string(), "00:00 +0900");
    }

    #[test]
    fn malformed_segments_are_rejected() {
        let tz: Tz = "Asia/Tokyo".parse().expect("tz");
        for name in ["scb2020O701.gz", "scb+2020070.gz", "scb20201301.gz", "scb2020"] {
            let err = parse_embedded_date(name, tz).unwrap_err();
            assert!(matches!(err, ArchiveError::MalformedDate { .. }), "{name}");
        }
    }

    #[test]
    fn cutoff_trails_today() {
        let tz: Tz = "Asia/Tokyo".parse().expect("tz");
        let cutoff = default_cutoff(tz, 8).expect("cutoff");
        let today = today_midnight(tz).expect("today");
        assert_eq!((today - cutoff).num_days(), 8);
    }
}
