use std::fmt;
use std::io::Error;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;

use crate::engine::DEFAULT_PAGE_SIZE;
use crate::record::{AttendanceFilter, SortKey};

pub const DEFAULT_EVENT_DATE: &str = "2026-01-25T00:00:00";
pub const DEFAULT_LOG_FILE: &str = "rsvp-admin.log";
pub const PAGE_SIZES: [usize; 4] = [5, 10, 20, 50];

pub const HELP_TEXT: &str = "\
q          Quit
?          Show this help
/          Search by name (Esc clears)
g          Go to page
a d e      Show attending, declined, everyone
n p c      Sort by name, party size, submission time (again to flip)
N P C      Sort by name, party size, submission time from page 1
← →        Previous and next page
Home End   First and last page
1-9        Jump to a page
+ -        Larger or smaller pages
r          Reload confirmations
Esc        Close popup";

#[derive(Debug)]
pub enum RsvpError {
    IoError(Error),
    PolarsError(PolarsError),
    LoadingFailed(String),
    FileNotFound,
    PermissionDenied,
    UnknownFileType,
    MissingColumn(String),
    InvalidRecord { row: Option<usize>, reason: String },
    InvalidDate(String),
}

impl From<Error> for RsvpError {
    fn from(err: Error) -> Self {
        RsvpError::IoError(err)
    }
}

impl From<PolarsError> for RsvpError {
    fn from(err: PolarsError) -> Self {
        RsvpError::PolarsError(err)
    }
}

impl fmt::Display for RsvpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RsvpError::IoError(e) => write!(f, "I/O error: {e}"),
            RsvpError::PolarsError(e) => write!(f, "Could not read records: {e}"),
            RsvpError::LoadingFailed(reason) => write!(f, "Loading failed: {reason}"),
            RsvpError::FileNotFound => write!(f, "File not found"),
            RsvpError::PermissionDenied => write!(f, "Permission denied"),
            RsvpError::UnknownFileType => write!(f, "Unknown file type"),
            RsvpError::MissingColumn(name) => write!(f, "Missing column \"{name}\""),
            RsvpError::InvalidRecord { row: Some(row), reason } => {
                write!(f, "Invalid record in row {row}: {reason}")
            }
            RsvpError::InvalidRecord { row: None, reason } => write!(f, "Invalid record: {reason}"),
            RsvpError::InvalidDate(value) => write!(f, "Invalid date \"{value}\""),
        }
    }
}

impl std::error::Error for RsvpError {}

#[derive(Debug, Clone, Setters)]
pub struct AdminConfig {
    pub records_path: PathBuf,
    pub page_size: usize,
    pub event_poll_time: u64,
    pub event_date: NaiveDateTime,
    pub log_file: PathBuf,
}

impl AdminConfig {
    pub fn new(records_path: PathBuf) -> Result<Self, RsvpError> {
        Ok(AdminConfig {
            records_path,
            page_size: DEFAULT_PAGE_SIZE,
            event_poll_time: 100,
            event_date: parse_event_date(DEFAULT_EVENT_DATE)?,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
        })
    }
}

/// Accepts `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS` or a bare date.
pub fn parse_event_date(s: &str) -> Result<NaiveDateTime, RsvpError> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|_| RsvpError::InvalidDate(s.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Search,
    GoToPage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    Exit,
    Help,
    Reload,
    Search,
    GoTo,
    NextPage,
    PreviousPage,
    FirstPage,
    LastPage,
    JumpToPage(usize),
    ShowAttendance(AttendanceFilter),
    ToggleSort(SortKey),
    SortBy(SortKey),
    GrowPageSize,
    ShrinkPageSize,
    Resize(u16, u16),
    RawKey(KeyEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn event_date_formats() {
        let d = parse_event_date("2026-01-25T00:00:00").unwrap();
        assert_eq!((d.year(), d.month(), d.day(), d.hour()), (2026, 1, 25, 0));
        let d = parse_event_date("2026-01-25 18:30:00").unwrap();
        assert_eq!((d.hour(), d.minute()), (18, 30));
        let d = parse_event_date("2026-02-01").unwrap();
        assert_eq!((d.month(), d.day(), d.hour()), (2, 1, 0));
        assert!(matches!(parse_event_date("next friday"), Err(RsvpError::InvalidDate(_))));
    }

    #[test]
    fn config_defaults_and_setters() {
        let cfg = AdminConfig::new(PathBuf::from("rsvp.csv")).unwrap().page_size(20);
        assert_eq!(cfg.page_size, 20);
        assert_eq!(cfg.event_poll_time, 100);
        assert_eq!(cfg.log_file, PathBuf::from(DEFAULT_LOG_FILE));
    }

    #[test]
    fn errors_render_for_the_status_line() {
        let e = RsvpError::InvalidRecord { row: Some(3), reason: "name must not be empty".into() };
        assert_eq!(e.to_string(), "Invalid record in row 3: name must not be empty");
        assert_eq!(RsvpError::MissingColumn("name".into()).to_string(), "Missing column \"name\"");
    }
}
