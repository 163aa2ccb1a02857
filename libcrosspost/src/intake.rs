//! Schedule intake: reading per-user CSV files and selecting the rows
//! due in the upcoming posting window.
//!
//! Rows are never mutated or deleted; the CSV is treated as a read-only
//! source of truth and deduplication happens against `posted_content`.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use crate::error::{CrosspostError, Result};
use crate::types::{synthetic_post_id, IntakeItem, Platform, PostType, ScheduleRow};

/// Half-open interval `[start, end)` of scheduled times eligible for
/// dispatch on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PostingWindow {
    /// The window `[now + offset, now + offset + length)`.
    pub fn ahead_of(now: DateTime<Utc>, offset_hours: i64, length_hours: i64) -> Self {
        let start = now + Duration::hours(offset_hours);
        Self {
            start,
            end: start + Duration::hours(length_hours),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Parse a schedule timestamp.
///
/// RFC 3339 is preferred; the legacy `YYYY-MM-DD HH:MM:SS` form is
/// accepted and read as UTC.
pub fn parse_schedule_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Read a schedule CSV and return the validated rows whose scheduled
/// time falls inside the window and whose type the platform supports.
///
/// Malformed rows are skipped with a warning, never fatal: one bad line
/// in a user's file must not block their other posts. Only an unreadable
/// file is an error.
pub fn select_due_rows(
    path: &Path,
    platform: Platform,
    window: &PostingWindow,
) -> Result<Vec<IntakeItem>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        CrosspostError::InvalidInput(format!(
            "Failed to read schedule file {}: {}",
            path.display(),
            e
        ))
    })?;

    let mut items = Vec::new();

    for (line, result) in reader.deserialize::<ScheduleRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                warn!(file = %path.display(), line, error = %e, "Skipping malformed schedule row");
                continue;
            }
        };

        match validate_row(row, platform, window) {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(reason) => {
                warn!(file = %path.display(), line, reason, "Skipping schedule row");
            }
        }
    }

    Ok(items)
}

/// Returns `Ok(Some)` for a dispatchable row, `Ok(None)` for a valid row
/// outside the window, `Err` with a reason for an invalid one.
fn validate_row(
    row: ScheduleRow,
    platform: Platform,
    window: &PostingWindow,
) -> std::result::Result<Option<IntakeItem>, String> {
    let date_time = row
        .date_time
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or("missing date_time")?;
    let scheduled_at =
        parse_schedule_time(date_time).ok_or_else(|| format!("unparseable date_time '{}'", date_time))?;

    if !window.contains(scheduled_at) {
        return Ok(None);
    }

    let content = row
        .content
        .filter(|s| !s.trim().is_empty())
        .ok_or("missing content")?;

    let kind = row
        .kind
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or("missing type")?;
    let post_type = PostType::from_str(kind)?;

    if !platform.supports(post_type) {
        return Err(format!(
            "type '{}' is not supported on {}",
            post_type, platform
        ));
    }

    let media_url = row.url.filter(|s| !s.trim().is_empty());
    if post_type.requires_url() && media_url.is_none() {
        return Err(format!("type '{}' requires a url", post_type));
    }

    // Rows may arrive without an id; give them a stable-enough synthetic
    // one so the delivery record can still be tracked.
    let post_id = match row.id.filter(|s| !s.trim().is_empty()) {
        Some(id) => id,
        None => {
            let id = synthetic_post_id();
            warn!(synthetic_id = %id, "Schedule row has no id, generated one");
            id
        }
    };

    Ok(Some(IntakeItem {
        post_id,
        content,
        post_type,
        media_url,
        scheduled_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn window() -> (DateTime<Utc>, PostingWindow) {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        (now, PostingWindow::ahead_of(now, 3, 1))
    }

    fn write_csv(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("schedule.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "id,content,type,url,date_time").unwrap();
        write!(f, "{}", body).unwrap();
        path
    }

    #[test]
    fn test_window_bounds() {
        let (now, w) = window();
        assert_eq!(w.start, now + Duration::hours(3));
        assert_eq!(w.end, now + Duration::hours(4));

        // Half-open: start included, end excluded
        assert!(w.contains(w.start));
        assert!(!w.contains(w.end));
        assert!(!w.contains(w.start - Duration::seconds(1)));
        assert!(w.contains(w.end - Duration::seconds(1)));
    }

    #[test]
    fn test_parse_schedule_time_formats() {
        assert_eq!(
            parse_schedule_time("2026-03-01 15:30:00").unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 15, 30, 0).unwrap()
        );
        assert_eq!(
            parse_schedule_time("2026-03-01T15:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 13, 30, 0).unwrap()
        );
        assert!(parse_schedule_time("next tuesday").is_none());
    }

    #[test]
    fn test_selects_only_rows_in_window() {
        let dir = tempfile::tempdir().unwrap();
        let (_, w) = window();
        let path = write_csv(
            &dir,
            "p-1,hello,text,,2026-03-01 15:00:00\n\
             p-2,early,text,,2026-03-01 14:59:59\n\
             p-3,late,text,,2026-03-01 16:00:00\n",
        );

        let items = select_due_rows(&path, Platform::Linkedin, &w).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].post_id, "p-1");
        assert_eq!(items[0].content, "hello");
    }

    #[test]
    fn test_invalid_rows_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (_, w) = window();
        let path = write_csv(
            &dir,
            "p-1,,text,,2026-03-01 15:00:00\n\
             p-2,no date,text,,\n\
             p-3,bad type,carousel,,2026-03-01 15:00:00\n\
             p-4,image without url,image,,2026-03-01 15:00:00\n\
             p-5,fine,text,,2026-03-01 15:00:00\n",
        );

        let items = select_due_rows(&path, Platform::Linkedin, &w).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].post_id, "p-5");
    }

    #[test]
    fn test_platform_filters_unsupported_types() {
        let dir = tempfile::tempdir().unwrap();
        let (_, w) = window();
        let path = write_csv(
            &dir,
            "p-1,a video,video,https://cdn.example/v.mp4,2026-03-01 15:00:00\n\
             p-2,some text,text,,2026-03-01 15:00:00\n",
        );

        // TikTok takes only the video, LinkedIn only the text
        let tiktok = select_due_rows(&path, Platform::Tiktok, &w).unwrap();
        assert_eq!(tiktok.len(), 1);
        assert_eq!(tiktok[0].post_id, "p-1");
        assert_eq!(tiktok[0].media_url.as_deref(), Some("https://cdn.example/v.mp4"));

        let linkedin = select_due_rows(&path, Platform::Linkedin, &w).unwrap();
        assert_eq!(linkedin.len(), 1);
        assert_eq!(linkedin[0].post_id, "p-2");
    }

    #[test]
    fn test_missing_id_gets_synthetic_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let (_, w) = window();
        let path = write_csv(&dir, ",orphan row,text,,2026-03-01 15:00:00\n");

        let items = select_due_rows(&path, Platform::X, &w).unwrap();
        assert_eq!(items.len(), 1);
        assert!(uuid::Uuid::parse_str(&items[0].post_id).is_ok());
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let (_, w) = window();
        let missing = std::path::Path::new("/nonexistent/schedule.csv");
        assert!(select_due_rows(missing, Platform::X, &w).is_err());
    }
}
