//! Record sources.
//!
//! The admin view only ever reads a snapshot of the confirmations. A source
//! hands out the whole collection at once, [`spawn_fetch`] runs it off the UI
//! thread and delivers the result through a channel.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::Instant;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use polars::prelude::*;
use rayon::prelude::*;
use tracing::{debug, error, info, trace};

use crate::domain::RsvpError;
use crate::record::Record;

pub const COL_ID: &str = "id";
pub const COL_NAME: &str = "name";
pub const COL_PARTY_SIZE: &str = "party_size";
pub const COL_ATTENDING: &str = "attending";
pub const COL_CREATED_AT: &str = "created_at";

const REQUIRED_COLUMNS: &[&str] = &[COL_NAME, COL_PARTY_SIZE, COL_ATTENDING];
const COLUMNS: &[&str] = &[COL_ID, COL_NAME, COL_PARTY_SIZE, COL_ATTENDING, COL_CREATED_AT];

pub type FetchResult = Result<Vec<Record>, RsvpError>;

pub trait RecordSource: Send + Sync {
    fn fetch_all(&self) -> FetchResult;

    /// Short human readable origin, shown in the title bar.
    fn describe(&self) -> String;
}

/// Runs `source.fetch_all()` on the rayon pool.
pub fn spawn_fetch(source: Arc<dyn RecordSource>) -> Receiver<FetchResult> {
    let (tx, rx) = mpsc::channel();
    rayon::spawn(move || {
        let start_time = Instant::now();
        let result = source.fetch_all();
        let duration = start_time.elapsed().as_millis();
        match &result {
            Ok(records) => info!(
                "Fetched {} records from {} in {duration}ms",
                records.len(),
                source.describe()
            ),
            Err(e) => error!("Fetching from {} failed: {e}", source.describe()),
        }
        if tx.send(result).is_err() {
            debug!("Fetch result dropped, a newer fetch superseded it");
        }
    });
    rx
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileType {
    CSV,
    JSON,
    PARQUET,
    ARROW,
}

#[derive(Debug)]
struct FileInfo {
    path: PathBuf,
    file_size: u64,
    file_type: FileType,
}

/// Reads an export of the remote collection.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        FileSource { path }
    }

    fn detect_file_type(path: &Path) -> Result<FileType, RsvpError> {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
            .as_deref()
        {
            Some("CSV") => Ok(FileType::CSV),
            Some("JSON") => Ok(FileType::JSON),
            Some("PARQUET") | Some("PQ") => Ok(FileType::PARQUET),
            Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::ARROW),
            _ => Err(RsvpError::UnknownFileType),
        }
    }

    fn get_file_info(path: &Path) -> Result<FileInfo, RsvpError> {
        let metadata = fs::metadata(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => RsvpError::FileNotFound,
            ErrorKind::PermissionDenied => RsvpError::PermissionDenied,
            _ => RsvpError::IoError(e),
        })?;
        if !metadata.is_file() {
            return Err(RsvpError::LoadingFailed("Not a file!".into()));
        }

        Ok(FileInfo {
            path: path.to_path_buf(),
            file_size: metadata.len(),
            file_type: Self::detect_file_type(path)?,
        })
    }

    fn read_frame(info: &FileInfo) -> Result<DataFrame, RsvpError> {
        let df = match info.file_type {
            FileType::CSV => LazyCsvReader::new(PlPath::Local(info.path.as_path().into()))
                .with_has_header(true)
                .finish()?
                .collect()?,
            FileType::JSON => JsonReader::new(File::open(&info.path)?).finish()?,
            FileType::PARQUET => LazyFrame::scan_parquet(
                PlPath::Local(info.path.as_path().into()),
                ScanArgsParquet::default(),
            )?
            .collect()?,
            FileType::ARROW => LazyFrame::scan_ipc(
                PlPath::Local(info.path.as_path().into()),
                polars::io::ipc::IpcScanOptions,
                UnifiedScanArgs::default(),
            )?
            .collect()?,
        };
        Ok(df)
    }

    fn has_column(df: &DataFrame, name: &str) -> bool {
        df.get_column_names().iter().any(|c| c.as_str() == name)
    }

    // Every value as trimmed text, nulls stay None
    fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, PolarsError> {
        let col = df.column(name)?.cast(&DataType::String)?;
        let series = col.str()?;
        Ok(series
            .into_iter()
            .map(|value| value.map(|s| s.trim().to_string()))
            .collect())
    }

    fn build_records(df: &DataFrame) -> Result<Vec<Record>, RsvpError> {
        for name in REQUIRED_COLUMNS {
            if !Self::has_column(df, name) {
                return Err(RsvpError::MissingColumn(name.to_string()));
            }
        }

        // Convert columns in parallel, optional columns that are absent yield None
        let columns: Result<Vec<Option<Vec<Option<String>>>>, PolarsError> = COLUMNS
            .par_iter()
            .map(|name| {
                if Self::has_column(df, name) {
                    Self::string_column(df, name).map(Some)
                } else {
                    Ok(None)
                }
            })
            .collect();
        let columns = columns?;
        let [ids, names, party_sizes, attendances, timestamps] = columns.as_slice() else {
            return Err(RsvpError::LoadingFailed("Unexpected column layout".into()));
        };
        let cell = |column: &Option<Vec<Option<String>>>, idx: usize| -> Option<String> {
            column
                .as_ref()
                .and_then(|c| c.get(idx).cloned().flatten())
                .filter(|s| !s.is_empty())
        };

        (0..df.height())
            .map(|idx| {
                let row = idx + 1;
                let invalid = |reason: String| RsvpError::InvalidRecord {
                    row: Some(row),
                    reason,
                };

                let name = cell(names, idx).unwrap_or_default();
                let party_size = match cell(party_sizes, idx) {
                    Some(s) => parse_party_size(&s).ok_or_else(|| invalid(format!("invalid party size \"{s}\"")))?,
                    None => 0,
                };
                let attending = match cell(attendances, idx) {
                    Some(s) => parse_attending(&s).ok_or_else(|| invalid(format!("invalid attendance \"{s}\"")))?,
                    None => return Err(invalid("attendance is missing".into())),
                };
                let id = match cell(ids, idx) {
                    Some(s) => Some(parse_id(&s).ok_or_else(|| invalid(format!("invalid id \"{s}\"")))?),
                    None => None,
                };
                let created_at = match cell(timestamps, idx) {
                    Some(s) => Some(parse_timestamp(&s).ok_or_else(|| invalid(format!("invalid timestamp \"{s}\"")))?),
                    None => None,
                };

                let record = Record::confirmation(&name, party_size, attending).map_err(|e| match e {
                    RsvpError::InvalidRecord { reason, .. } => invalid(reason),
                    other => other,
                })?;
                Ok(record.with_id(id).with_created_at(created_at))
            })
            .collect()
    }
}

impl RecordSource for FileSource {
    fn fetch_all(&self) -> FetchResult {
        let info = Self::get_file_info(&self.path)?;
        trace!(
            "Reading {:?} file {} ({} bytes)",
            info.file_type,
            info.path.display(),
            info.file_size
        );
        let df = Self::read_frame(&info)?;
        debug!("Read frame with shape {:?}", df.shape());
        Self::build_records(&df)
    }

    fn describe(&self) -> String {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string()
    }
}

/// A fixed collection, or a fixed failure.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct MemorySource {
    records: Result<Vec<Record>, String>,
}

#[cfg(test)]
impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        MemorySource { records: Ok(records) }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        MemorySource {
            records: Err(reason.into()),
        }
    }
}

#[cfg(test)]
impl RecordSource for MemorySource {
    fn fetch_all(&self) -> FetchResult {
        self.records
            .clone()
            .map_err(RsvpError::LoadingFailed)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

fn parse_attending(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_party_size(s: &str) -> Option<u32> {
    s.parse::<u32>().ok().or_else(|| {
        let f: f64 = s.parse().ok()?;
        (f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64).then_some(f as u32)
    })
}

fn parse_id(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().or_else(|| {
        let f: f64 = s.parse().ok()?;
        (f.fract() == 0.0).then_some(f as i64)
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                .ok()
                .map(|t| t.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    #[test]
    fn reads_csv_export() {
        let records = FileSource::new(fixture("rsvp_01.csv")).fetch_all().unwrap();
        assert_eq!(records.len(), 6);

        let ana = &records[0];
        assert_eq!(ana.id, Some(1));
        assert_eq!(ana.name, "Ana");
        assert_eq!(ana.party_size, 2);
        assert!(ana.attending);
        assert!(ana.created_at.is_some());

        // Declined rows never keep a party size
        let beto = &records[1];
        assert!(!beto.attending);
        assert_eq!(beto.party_size, 0);
        assert!(records.iter().any(|r| r.created_at.is_none()));
    }

    #[test]
    fn reads_json_export() {
        let records = FileSource::new(fixture("rsvp_01.json")).fetch_all().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[2].name, "Ángela");
        assert_eq!(records[2].party_size, 3);
        assert!(records[3].created_at.is_none());
    }

    fn export_frame() -> DataFrame {
        polars::df!(
            "id" => [1i64, 2, 3],
            "name" => ["Ana", "Beto", "Ángela"],
            "party_size" => [2i64, 4, 3],
            "attending" => [true, false, true],
            "created_at" => ["2025-11-02T10:00:00+00:00", "2025-11-02 11:30:00", "2025-11-03"],
        )
        .unwrap()
    }

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rsvp_admin_{}_{name}", std::process::id()))
    }

    fn assert_export(records: &[Record]) {
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].name, "Ana");
        assert_eq!(records[0].id, Some(1));
        assert_eq!(records[0].party_size, 2);
        assert!(!records[1].attending);
        assert_eq!(records[1].party_size, 0);
        assert_eq!(records[2].name, "Ángela");
        assert!(records.iter().all(|r| r.created_at.is_some()));
    }

    #[test]
    fn reads_parquet_export() {
        let path = scratch_file("export.parquet");
        let mut df = export_frame();
        ParquetWriter::new(File::create(&path).unwrap())
            .finish(&mut df)
            .unwrap();

        let records = FileSource::new(path.clone()).fetch_all();
        fs::remove_file(&path).unwrap();
        assert_export(&records.unwrap());
    }

    #[test]
    fn reads_arrow_export() {
        let path = scratch_file("export.arrow");
        let mut df = export_frame();
        IpcWriter::new(File::create(&path).unwrap())
            .finish(&mut df)
            .unwrap();

        let records = FileSource::new(path.clone()).fetch_all();
        fs::remove_file(&path).unwrap();
        assert_export(&records.unwrap());
    }

    #[test]
    fn missing_required_column() {
        let result = FileSource::new(fixture("rsvp_missing_column.csv")).fetch_all();
        assert!(matches!(result, Err(RsvpError::MissingColumn(c)) if c == COL_ATTENDING));
    }

    #[test]
    fn invalid_row_is_reported_with_its_number() {
        let result = FileSource::new(fixture("rsvp_bad_row.csv")).fetch_all();
        assert!(matches!(result, Err(RsvpError::InvalidRecord { row: Some(2), .. })));
    }

    #[test]
    fn unknown_and_missing_files() {
        assert!(matches!(
            FileSource::new(fixture("does_not_exist.csv")).fetch_all(),
            Err(RsvpError::FileNotFound)
        ));
        assert!(matches!(
            FileSource::detect_file_type(Path::new("export.xlsx")),
            Err(RsvpError::UnknownFileType)
        ));
        assert_eq!(FileSource::detect_file_type(Path::new("a.PQ")).unwrap(), FileType::PARQUET);
    }

    #[test]
    fn cell_parsers() {
        assert_eq!(parse_attending("TRUE"), Some(true));
        assert_eq!(parse_attending("no"), Some(false));
        assert_eq!(parse_attending("maybe"), None);
        assert_eq!(parse_party_size("3"), Some(3));
        assert_eq!(parse_party_size("2.0"), Some(2));
        assert_eq!(parse_party_size("2.5"), None);
        assert_eq!(parse_party_size("-1"), None);
        assert_eq!(parse_id("42"), Some(42));
    }

    #[test]
    fn timestamp_formats() {
        let expected = DateTime::parse_from_rfc3339("2025-11-02T10:00:00Z").unwrap();
        for s in [
            "2025-11-02T10:00:00Z",
            "2025-11-02T10:00:00+00:00",
            "2025-11-02 10:00:00",
            "2025-11-02T10:00:00.000",
        ] {
            assert_eq!(parse_timestamp(s), Some(expected.with_timezone(&Utc)), "{s}");
        }
        assert!(parse_timestamp("2025-11-02").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn spawned_fetch_delivers_result() {
        let records = vec![Record::confirmation("Ana", 2, true).unwrap()];
        let rx = spawn_fetch(Arc::new(MemorySource::new(records.clone())));
        assert_eq!(rx.recv().unwrap().unwrap(), records);

        let rx = spawn_fetch(Arc::new(MemorySource::failing("offline")));
        assert!(matches!(rx.recv().unwrap(), Err(RsvpError::LoadingFailed(r)) if r == "offline"));
    }
}
