//! ZIP archive unpacking into per-quarter spreadsheet groups.

use regex::Regex;
use std::{
    collections::BTreeMap,
    io::{Cursor, Read},
    path::Path,
    sync::LazyLock,
};
use thiserror::Error;

use crate::reports::Quarter;

/// Errors raised while reading report files or archives.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Reading from disk failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive could not be opened as ZIP.
    #[error("malformed archive: {0}")]
    Malformed(#[from] zip::result::ZipError),

    /// The file is not a CSV/XLSX/XLS spreadsheet.
    #[error("unsupported file type: {0}")]
    Unsupported(String),

    /// The blocking extraction task did not finish.
    #[error("unpack task failed: {0}")]
    Task(String),
}

/// Largest spreadsheet accepted from an archive.
const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// One spreadsheet held in memory, ready for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpreadsheetFile {
    /// File name without directories.
    pub name: String,
    /// MIME type derived from the extension.
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl SpreadsheetFile {
    /// Read a spreadsheet from disk, rejecting unsupported extensions.
    pub async fn read(path: &Path) -> Result<Self, ArchiveError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let mime = spreadsheet_mime(&name)
            .ok_or_else(|| ArchiveError::Unsupported(path.display().to_string()))?;
        let bytes = tokio::fs::read(path).await?;
        Ok(Self { name, mime, bytes })
    }
}

/// MIME type for `.csv`, `.xlsx` and `.xls` names (case-insensitive); `None` otherwise.
pub fn spreadsheet_mime(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    if lower.ends_with(".csv") {
        Some("text/csv")
    } else if lower.ends_with(".xlsx") {
        Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
    } else if lower.ends_with(".xls") {
        Some("application/vnd.ms-excel")
    } else {
        None
    }
}

/// Whether a path looks like a ZIP archive.
pub fn is_zip(name: &str) -> bool {
    name.to_lowercase().ends_with(".zip")
}

/// Files of one quarter found in an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedReportGroup {
    pub quarter: Quarter,
    pub year: i32,
    pub files: Vec<SpreadsheetFile>,
}

impl ExtractedReportGroup {
    /// Period label such as `Q1 2025`.
    pub fn period(&self) -> String {
        format!("{} {}", self.quarter, self.year)
    }

    /// Sum of file sizes in bytes.
    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.bytes.len()).sum()
    }
}

static QUARTER_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)q([1-4])[\s_-]*(\d{4})").expect("valid quarter-first pattern")
});
static YEAR_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{4})[\s_-]*q([1-4])").expect("valid year-first pattern")
});

/// Find a quarter/year token in one path segment: `Q1 2025`, `q1_2025`, `2025-Q1`, ...
pub fn parse_quarter_token(segment: &str) -> Option<(Quarter, i32)> {
    if let Some(c) = QUARTER_FIRST.captures(segment) {
        let q = Quarter::from_number(c[1].parse().ok()?)?;
        return Some((q, c[2].parse().ok()?));
    }
    let c = YEAR_FIRST.captures(segment)?;
    let q = Quarter::from_number(c[2].parse().ok()?)?;
    Some((q, c[1].parse().ok()?))
}

/// Quarter/year from the first path segment carrying a token.
fn quarter_for_path(path: &str) -> Option<(Quarter, i32)> {
    path.split('/').find_map(parse_quarter_token)
}

/// Unpack an in-memory ZIP into groups sorted by year, then quarter.
///
/// Entries that are directories, not spreadsheets, or lack a quarter token
/// are skipped. Only an unreadable archive is an error.
pub fn unpack_archive(bytes: &[u8]) -> Result<Vec<ExtractedReportGroup>, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut groups: BTreeMap<(i32, Quarter), Vec<SpreadsheetFile>> = BTreeMap::new();
    let mut skipped = 0usize;

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("skipping corrupt zip entry {i}: {e}");
                skipped += 1;
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }

        let path = entry.name().to_string();
        let Some(mime) = spreadsheet_mime(&path) else {
            continue;
        };
        let Some((quarter, year)) = quarter_for_path(&path) else {
            skipped += 1;
            continue;
        };

        // The header size is untrusted; only what is actually read is allocated.
        let mut data = Vec::new();
        if let Err(e) = (&mut entry).take(MAX_ENTRY_BYTES + 1).read_to_end(&mut data) {
            tracing::warn!("skipping unreadable zip entry {path}: {e}");
            skipped += 1;
            continue;
        }
        if data.len() as u64 > MAX_ENTRY_BYTES {
            tracing::warn!("skipping zip entry {path}: larger than {MAX_ENTRY_BYTES} bytes");
            skipped += 1;
            continue;
        }

        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        groups.entry((year, quarter)).or_default().push(SpreadsheetFile {
            name,
            mime,
            bytes: data,
        });
    }

    tracing::info!(
        "archive unpacked: {} quarters, {} entries skipped",
        groups.len(),
        skipped
    );

    Ok(groups
        .into_iter()
        .map(|((year, quarter), files)| ExtractedReportGroup {
            quarter,
            year,
            files,
        })
        .collect())
}

/// Read an archive from disk and unpack it off the async runtime.
pub async fn unpack_archive_file(path: &Path) -> Result<Vec<ExtractedReportGroup>, ArchiveError> {
    let bytes = tokio::fs::read(path).await?;
    tokio::task::spawn_blocking(move || unpack_archive(&bytes))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}
