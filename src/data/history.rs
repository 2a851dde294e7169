//! Read-only access to the browser's download history.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use tempfile::NamedTempFile;

use crate::data::history_locator::HistoryLocator;

const SNAPSHOT_BUSY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("history database is locked")]
    Locked,

    #[error("{0}")]
    NotFound(String),

    #[error("history database is missing at {0}")]
    SourceMissing(PathBuf),

    #[error("history query failed: {0}")]
    Query(String),
}

impl From<rusqlite::Error> for LookupError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => Self::Locked,
            _ => Self::Query(err.to_string()),
        }
    }
}

/// Narrow port the resolver consults: which URL produced this file?
pub trait OriginSource: Send + Sync {
    fn find_origin_url(&self, target_path: &str) -> Result<Option<String>, LookupError>;
}

/// Queries a private snapshot of the browser's `History` database.
pub struct BrowserHistory {
    locator: HistoryLocator,
    configured: Option<PathBuf>,
}

impl BrowserHistory {
    pub fn new(locator: HistoryLocator, configured: Option<PathBuf>) -> Self {
        Self {
            locator,
            configured,
        }
    }

    pub fn source_path(&self) -> Result<PathBuf, LookupError> {
        self.locator.locate(self.configured.as_deref()).ok_or_else(|| {
            LookupError::NotFound(
                "browser history database not found; set its path in the settings".to_string(),
            )
        })
    }
}

impl OriginSource for BrowserHistory {
    fn find_origin_url(&self, target_path: &str) -> Result<Option<String>, LookupError> {
        let source = self.source_path()?;
        let snapshot = snapshot(&source)?;
        query_origin_url(snapshot.path(), target_path)
    }
}

fn is_lock_violation(err: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33))
}

/// Copies `source` to a temp file that is removed when the handle drops.
pub fn snapshot(source: &Path) -> Result<NamedTempFile, LookupError> {
    let temp = tempfile::Builder::new()
        .prefix("download_insights_history_")
        .suffix(".db")
        .tempfile()
        .map_err(|e| LookupError::Query(format!("could not create snapshot: {e}")))?;

    match fs::copy(source, temp.path()) {
        Ok(_) => Ok(temp),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(LookupError::SourceMissing(source.to_path_buf()))
        }
        Err(e) if is_lock_violation(&e) => Err(LookupError::Locked),
        Err(e) => Err(LookupError::Query(format!(
            "could not copy {}: {e}",
            source.display()
        ))),
    }
}

/// First non-empty of `site_url`, `tab_url`, `tab_referrer_url` for the
/// download whose `target_path` equals `target_path`.
pub fn query_origin_url(db_path: &Path, target_path: &str) -> Result<Option<String>, LookupError> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(SNAPSHOT_BUSY_TIMEOUT)?;

    let row = conn
        .query_row(
            "SELECT site_url, tab_url, tab_referrer_url FROM downloads WHERE target_path = ?1",
            params![target_path],
            |row| {
                Ok([
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ])
            },
        )
        .optional()?;

    Ok(row.and_then(|urls| urls.into_iter().flatten().find(|url| !url.trim().is_empty())))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn write_history(path: &Path, rows: &[(&str, &str, &str, &str)]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE downloads (
                id INTEGER PRIMARY KEY,
                target_path TEXT NOT NULL,
                site_url TEXT,
                tab_url TEXT,
                tab_referrer_url TEXT
            );",
        )
        .unwrap();
        for (target, site, tab, referrer) in rows {
            conn.execute(
                "INSERT INTO downloads (target_path, site_url, tab_url, tab_referrer_url) VALUES (?1, ?2, ?3, ?4)",
                params![target, site, tab, referrer],
            )
            .unwrap();
        }
    }

    #[test]
    fn query_prefers_site_then_tab_then_referrer() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("History");
        write_history(
            &db,
            &[
                ("/dl/a.zip", "https://site.example/a", "https://tab.example", ""),
                ("/dl/b.zip", "", "https://tab.example/b", "https://ref.example"),
                ("/dl/c.zip", "", "", "https://ref.example/c"),
                ("/dl/d.zip", "", "", ""),
            ],
        );

        assert_eq!(
            query_origin_url(&db, "/dl/a.zip").unwrap().as_deref(),
            Some("https://site.example/a")
        );
        assert_eq!(
            query_origin_url(&db, "/dl/b.zip").unwrap().as_deref(),
            Some("https://tab.example/b")
        );
        assert_eq!(
            query_origin_url(&db, "/dl/c.zip").unwrap().as_deref(),
            Some("https://ref.example/c")
        );
        assert_eq!(query_origin_url(&db, "/dl/d.zip").unwrap(), None);
        assert_eq!(query_origin_url(&db, "/dl/missing.zip").unwrap(), None);
    }

    #[test]
    fn snapshot_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("History");
        write_history(&db, &[]);

        let snap = snapshot(&db).unwrap();
        let snap_path = snap.path().to_path_buf();
        assert!(snap_path.exists());
        drop(snap);
        assert!(!snap_path.exists());
    }

    #[test]
    fn snapshot_of_missing_source_reports_source_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = snapshot(&dir.path().join("History")).unwrap_err();
        assert!(matches!(err, LookupError::SourceMissing(_)));
    }

    #[test]
    fn browser_history_reads_configured_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("History");
        write_history(&db, &[("/dl/a.zip", "https://www.example.com/a", "", "")]);

        let history = BrowserHistory::new(HistoryLocator::with_roots(Vec::new()), Some(db));
        assert_eq!(
            history.find_origin_url("/dl/a.zip").unwrap().as_deref(),
            Some("https://www.example.com/a")
        );
    }

    #[test]
    fn browser_history_without_any_database_is_not_found() {
        let history = BrowserHistory::new(HistoryLocator::with_roots(Vec::new()), None);
        let err = history.find_origin_url("/dl/a.zip").unwrap_err();
        assert!(matches!(err, LookupError::NotFound(_)));
    }

    #[test]
    fn locked_sqlite_errors_map_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        assert!(matches!(LookupError::from(err), LookupError::Locked));
    }
}
