use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rusqlite::Connection;

use crate::data::repository::{self, NewInsight};
use crate::error::AppError;
use crate::models::insight::{DuplicateFlag, EventKind, EXPECTED_HEADER};

pub const DATABASE_FILE_NAME: &str = "downloadInsightsAnalytics.db";
pub const LEGACY_CSV_FILE_NAME: &str = "downloadInsightsAnalytics.csv";

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS insights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    event TEXT NOT NULL,
    file_path TEXT NOT NULL,
    domain TEXT NOT NULL,
    file_size INTEGER,
    file_type TEXT,
    download_url TEXT,
    is_duplicate INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_insights_timestamp ON insights(timestamp);
CREATE INDEX IF NOT EXISTS idx_insights_domain ON insights(domain);
";

pub fn run_migrations(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch(SCHEMA_V1)?;
    Ok(())
}

/// Copies legacy artifacts from `legacy_dir` into `destination`, leaving
/// anything already present at the destination untouched.
pub fn migrate_legacy_storage(legacy_dir: &Path, destination: &Path) -> Result<usize, AppError> {
    if !legacy_dir.is_dir() {
        return Ok(0);
    }
    fs::create_dir_all(destination)?;

    let mut copied = 0;
    for name in [DATABASE_FILE_NAME, LEGACY_CSV_FILE_NAME] {
        let legacy = legacy_dir.join(name);
        let target = destination.join(name);
        if legacy.is_file() && !target.exists() {
            match fs::copy(&legacy, &target) {
                Ok(_) => copied += 1,
                Err(e) => tracing::warn!(
                    "could not copy legacy {} to {}: {e}",
                    legacy.display(),
                    target.display()
                ),
            }
        }
    }
    Ok(copied)
}

/// Imports a legacy delimited log into an empty `insights` table.
///
/// Columns are matched by header name; a missing duplicate column reads as
/// `No`, any other missing column as empty. A first row with no known column
/// names is treated as data in canonical order. Fields are decoded lossily so
/// logs written in a legacy code page still import; unreadable rows are skipped.
pub fn import_legacy_csv(conn: &Connection, csv_path: &Path) -> Result<usize, AppError> {
    if !csv_path.is_file() {
        return Ok(0);
    }
    if repository::count_insights(conn)? > 0 {
        return Ok(0);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(csv_path)?;

    let mut rows = Vec::new();
    for (line, row) in reader.byte_records().enumerate() {
        match row {
            Ok(row) => rows.push(decode_row(&row)),
            Err(e) => tracing::warn!("skipping unreadable legacy row {}: {e}", line + 1),
        }
    }
    let mut rows = rows.into_iter();

    let Some(first) = rows.next() else {
        return Ok(0);
    };

    let named: HashMap<String, usize> = first
        .iter()
        .enumerate()
        .map(|(index, name)| (name.trim().to_string(), index))
        .collect();
    let has_header = EXPECTED_HEADER.iter().any(|col| named.contains_key(*col));
    let header_map: HashMap<String, usize> = if has_header {
        named
    } else {
        EXPECTED_HEADER
            .iter()
            .enumerate()
            .map(|(index, name)| (name.to_string(), index))
            .collect()
    };

    let mut pending = Vec::new();
    if !has_header {
        pending.push(first);
    }
    pending.extend(rows);

    let tx = conn.unchecked_transaction()?;
    let mut imported = 0;
    for row in &pending {
        let field = |column: &str| legacy_field(&header_map, row, column);

        let raw_event = field("Event").unwrap_or("");
        let Ok(event) = raw_event.parse::<EventKind>() else {
            tracing::warn!("skipping legacy row with unknown event '{raw_event}'");
            continue;
        };

        let record = NewInsight {
            timestamp: field("Timestamp").unwrap_or("").to_string(),
            event,
            file_path: field("File Path").unwrap_or("").to_string(),
            domain: field("Domain").unwrap_or("").to_string(),
            file_size: field("File Size").and_then(|s| s.parse::<i64>().ok()),
            file_type: field("File Type").unwrap_or("").to_string(),
            download_url: field("Download URL").unwrap_or("").to_string(),
            is_duplicate: DuplicateFlag::from(field("Is Duplicate").unwrap_or("No")).is_set(),
        };
        repository::insert_insight(&tx, &record)?;
        imported += 1;
    }
    tx.commit()?;
    Ok(imported)
}

fn decode_row(row: &csv::ByteRecord) -> Vec<String> {
    row.iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}

fn legacy_field<'r>(
    header_map: &HashMap<String, usize>,
    row: &'r [String],
    column: &str,
) -> Option<&'r str> {
    header_map
        .get(column)
        .and_then(|index| row.get(*index))
        .map(|value| value.trim())
}
