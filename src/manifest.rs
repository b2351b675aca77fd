//! Reading the bulk downloader's `download_report.csv`.
//!
//! The report has one row per spreadsheet link with the columns
//! `PSM_ID,url,status,file`. Only rows whose download produced a usable
//! local document are handed to ingestion.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

/// Outcome the downloader recorded for one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Fetched as a PDF.
    Pdf,
    /// Fetched as an image and converted to a PDF.
    ImageToPdf,
    /// Saved as-is with an unrecognised content type.
    Raw,
    /// Already present locally from an earlier run.
    Skipped,
    /// The spreadsheet cell had no link.
    Empty,
    /// Every attempt failed.
    Failed,
    /// An image that could not be converted; the raw image was kept.
    ImageFailedRaw,
    Other(String),
}

impl DownloadStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "pdf" => Self::Pdf,
            "image->pdf" => Self::ImageToPdf,
            "raw" => Self::Raw,
            "skipped" => Self::Skipped,
            "empty" => Self::Empty,
            "failed" => Self::Failed,
            "image_failed_raw" => Self::ImageFailedRaw,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the downloader left a document worth extracting.
    pub fn is_ingestible(&self) -> bool {
        matches!(self, Self::Pdf | Self::ImageToPdf | Self::Raw | Self::Skipped)
    }
}

#[derive(Debug, Deserialize)]
struct ReportRow {
    #[serde(rename = "PSM_ID")]
    id: String,
    url: String,
    status: String,
    #[serde(default)]
    file: Option<String>,
}

/// One row of the download report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub url: String,
    pub status: DownloadStatus,
    /// Local file, resolved against the report's directory when relative.
    pub file: Option<PathBuf>,
}

impl ManifestEntry {
    /// The file to ingest, if the download succeeded.
    pub fn ingestible_path(&self) -> Option<&Path> {
        if self.status.is_ingestible() {
            self.file.as_deref()
        } else {
            None
        }
    }
}

/// Parse a download report, keeping rows in report order.
pub fn read_report(path: &Path) -> Result<Vec<ManifestEntry>> {
    let base = path.parent().unwrap_or(Path::new(""));
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut entries = Vec::new();
    for row in reader.deserialize() {
        let row: ReportRow = row?;
        let file = row
            .file
            .filter(|f| !f.is_empty())
            .map(|f| base.join(f));
        entries.push(ManifestEntry {
            id: row.id,
            url: row.url,
            status: DownloadStatus::parse(&row.status),
            file,
        });
    }
    Ok(entries)
}
