use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::data::migrations::{self, DATABASE_FILE_NAME, LEGACY_CSV_FILE_NAME};
use crate::data::{open_insights, repository};
use crate::error::AppError;
use crate::models::insight::{
    DuplicateFlag, EventKind, InsightRecord, InsightRow, EXPECTED_HEADER, URL_NOT_AVAILABLE,
};
use crate::models::origin::Domain;
use crate::paths;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only event log for one monitored folder.
#[derive(Debug, Clone)]
pub struct InsightStore {
    dir: PathBuf,
    monitored_folder: PathBuf,
}

impl InsightStore {
    /// Store under `home`, keyed by the monitored folder.
    pub fn for_folder(home: &Path, monitored_folder: &Path) -> Self {
        Self::at(paths::analytics_dir(home, monitored_folder), monitored_folder)
    }

    pub fn at(dir: PathBuf, monitored_folder: &Path) -> Self {
        Self {
            dir,
            monitored_folder: monitored_folder.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn database_path(&self) -> PathBuf {
        self.dir.join(DATABASE_FILE_NAME)
    }

    /// Creates the schema and pulls in legacy data. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir)?;
        let legacy_dir = paths::legacy_insights_dir(&self.monitored_folder);
        let copied = migrations::migrate_legacy_storage(&legacy_dir, &self.dir)?;
        if copied > 0 {
            tracing::info!("copied {copied} legacy file(s) from {}", legacy_dir.display());
        }

        let conn = open_insights(&self.database_path())?;
        match migrations::import_legacy_csv(&conn, &self.dir.join(LEGACY_CSV_FILE_NAME)) {
            Ok(0) => {}
            Ok(imported) => tracing::info!("imported {imported} legacy record(s)"),
            Err(e) => tracing::warn!("legacy log import skipped: {e}"),
        }
        Ok(())
    }

    fn connect(&self) -> Result<Connection, AppError> {
        fs::create_dir_all(&self.dir)?;
        open_insights(&self.database_path())
    }

    fn connect_existing(&self) -> Result<Option<Connection>, AppError> {
        if !self.database_path().is_file() {
            return Ok(None);
        }
        open_insights(&self.database_path()).map(Some)
    }

    /// Records one event, reading size and extension of `file_path` now.
    pub fn append(
        &self,
        event: EventKind,
        file_path: &Path,
        domain: &Domain,
        download_url: Option<&str>,
        is_duplicate: impl Into<DuplicateFlag>,
    ) -> Result<InsightRecord, AppError> {
        let file_size = fs::metadata(file_path)
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| i64::try_from(meta.len()).ok());
        let file_type = file_path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let download_url = download_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(URL_NOT_AVAILABLE);

        let record = repository::NewInsight {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            event,
            file_path: file_path.to_string_lossy().to_string(),
            domain: domain.as_str().to_string(),
            file_size,
            file_type,
            download_url: download_url.to_string(),
            is_duplicate: is_duplicate.into().is_set(),
        };

        let conn = self.connect()?;
        let id = repository::insert_insight(&conn, &record)?;
        repository::get_insight(&conn, id)?
            .ok_or_else(|| AppError::General(format!("record {id} vanished after insert")))
    }

    /// Every record, timestamp then id ascending. Empty when no store exists.
    pub fn list_all(&self) -> Result<Vec<InsightRecord>, AppError> {
        match self.connect_existing()? {
            Some(conn) => repository::list_insights(&conn),
            None => Ok(Vec::new()),
        }
    }

    pub fn list_after(&self, after_id: i64) -> Result<Vec<InsightRecord>, AppError> {
        match self.connect_existing()? {
            Some(conn) => repository::list_insights_after(&conn, after_id),
            None => Ok(Vec::new()),
        }
    }

    pub fn latest_id(&self) -> Result<i64, AppError> {
        match self.connect_existing()? {
            Some(conn) => repository::latest_insight_id(&conn),
            None => Ok(0),
        }
    }

    pub fn paths_for_domain(&self, domain: &str) -> Result<Vec<String>, AppError> {
        match self.connect_existing()? {
            Some(conn) => repository::list_paths_for_domain(&conn, domain),
            None => Ok(Vec::new()),
        }
    }

    /// Writes all records as CSV in canonical column order.
    pub fn export(&self, destination: &Path) -> Result<usize, AppError> {
        let records = self.list_all()?;
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(destination)?;
        writer.write_record(EXPECTED_HEADER)?;
        for record in &records {
            writer.serialize(InsightRow::from(record))?;
        }
        writer.flush()?;
        Ok(records.len())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainTotals {
    pub count: u64,
    pub bytes: u64,
    pub duplicates: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsightSummary {
    pub total_files: u64,
    pub total_bytes: u64,
    pub total_duplicates: u64,
    pub by_domain: BTreeMap<String, DomainTotals>,
}

fn record_date(record: &InsightRecord) -> Option<NaiveDate> {
    chrono::NaiveDateTime::parse_from_str(&record.timestamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.date())
}

/// Aggregates records, optionally within an inclusive date range. Records
/// with unreadable timestamps only count when no range is given.
pub fn summarize(
    records: &[InsightRecord],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> InsightSummary {
    let mut summary = InsightSummary::default();
    for record in records {
        if from.is_some() || to.is_some() {
            let Some(date) = record_date(record) else {
                continue;
            };
            if from.is_some_and(|start| date < start) || to.is_some_and(|end| date > end) {
                continue;
            }
        }

        let domain = match record.domain.trim() {
            "" => "Unknown".to_string(),
            other => other.to_string(),
        };
        let bytes = record.file_size.and_then(|s| u64::try_from(s).ok()).unwrap_or(0);

        let totals = summary.by_domain.entry(domain).or_default();
        totals.count += 1;
        totals.bytes += bytes;
        summary.total_files += 1;
        summary.total_bytes += bytes;
        if record.is_duplicate {
            totals.duplicates += 1;
            summary.total_duplicates += 1;
        }
    }
    summary
}

pub fn format_bytes(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{size} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
