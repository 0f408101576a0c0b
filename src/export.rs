use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_xlsxwriter::{Workbook, XlsxError};

use crate::domain::LogEntry;

const COLUMNS: [&str; 5] = [
    "start_time",
    "end_time",
    "activity",
    "duration_minutes",
    "notes",
];
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xlsx error: {0}")]
    Xlsx(#[from] XlsxError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            other => Err(format!("unsupported export format `{other}` (use csv or xlsx)")),
        }
    }
}

/// Writes the whole log to a timestamped file inside `out_dir`.
pub fn export_log(
    entries: &[LogEntry],
    format: ExportFormat,
    out_dir: &Path,
    now: NaiveDateTime,
) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!(
        "timetrack_export_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    ));

    match format {
        ExportFormat::Csv => fs::write(&path, render_csv(entries))?,
        ExportFormat::Xlsx => write_xlsx(entries, &path)?,
    }
    Ok(path)
}

pub fn render_csv(entries: &[LogEntry]) -> String {
    let mut csv = COLUMNS.join(",");
    csv.push('\n');

    for entry in entries {
        let notes = entry.notes.join("\n");
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            entry.start_time.format(TIMESTAMP_FORMAT),
            entry.end_time.format(TIMESTAMP_FORMAT),
            csv_field(&entry.activity),
            entry.duration_minutes,
            csv_field(&notes)
        ));
    }

    csv
}

/// One sheet, a header row, then one row per entry with notes joined by newlines.
fn write_xlsx(entries: &[LogEntry], path: &Path) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, name) in (0u16..).zip(COLUMNS) {
        sheet.write_string(0, col, name)?;
    }

    for (row, entry) in (1u32..).zip(entries) {
        sheet.write_string(row, 0, entry.start_time.format(TIMESTAMP_FORMAT).to_string())?;
        sheet.write_string(row, 1, entry.end_time.format(TIMESTAMP_FORMAT).to_string())?;
        sheet.write_string(row, 2, entry.activity.as_str())?;
        sheet.write_number(row, 3, entry.duration_minutes)?;
        sheet.write_string(row, 4, entry.notes.join("\n"))?;
    }

    workbook.save(path)
}

fn csv_field(raw: &str) -> Cow<'_, str> {
    if raw.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", raw.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(raw)
    }
}
