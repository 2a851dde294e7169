use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::AppError;
use crate::models::insight::{EventKind, InsightRecord};

/// Values for a record about to be inserted; the id is assigned by SQLite.
#[derive(Debug, Clone)]
pub struct NewInsight {
    pub timestamp: String,
    pub event: EventKind,
    pub file_path: String,
    pub domain: String,
    pub file_size: Option<i64>,
    pub file_type: String,
    pub download_url: String,
    pub is_duplicate: bool,
}

const SELECT_COLUMNS: &str = "SELECT id, timestamp, event, file_path, domain, file_size, file_type, download_url, is_duplicate FROM insights";

fn record_from_row(row: &Row<'_>) -> Result<InsightRecord, rusqlite::Error> {
    let event_str: String = row.get(2)?;
    let duplicate: i64 = row.get(8)?;
    Ok(InsightRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        event: event_str.parse::<EventKind>().unwrap_or(EventKind::Moved),
        file_path: row.get(3)?,
        domain: row.get(4)?,
        file_size: row.get(5)?,
        file_type: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        download_url: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        is_duplicate: duplicate != 0,
    })
}

pub fn insert_insight(conn: &Connection, record: &NewInsight) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO insights (timestamp, event, file_path, domain, file_size, file_type, download_url, is_duplicate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.timestamp,
            record.event.to_string(),
            record.file_path,
            record.domain,
            record.file_size,
            record.file_type,
            record.download_url,
            record.is_duplicate as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_insight(conn: &Connection, id: i64) -> Result<Option<InsightRecord>, AppError> {
    let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
    let record = conn
        .query_row(&sql, params![id], record_from_row)
        .optional()?;
    Ok(record)
}

/// All records, oldest first. Unparseable timestamps sort before parseable ones.
pub fn list_insights(conn: &Connection) -> Result<Vec<InsightRecord>, AppError> {
    let sql = format!("{SELECT_COLUMNS} ORDER BY datetime(timestamp) ASC, id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map([], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn list_insights_after(conn: &Connection, after_id: i64) -> Result<Vec<InsightRecord>, AppError> {
    let sql = format!("{SELECT_COLUMNS} WHERE id > ?1 ORDER BY id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params![after_id], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn list_paths_for_domain(conn: &Connection, domain: &str) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare("SELECT file_path FROM insights WHERE domain = ?1")?;
    let paths = stmt
        .query_map(params![domain], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(paths)
}

pub fn count_insights(conn: &Connection) -> Result<i64, AppError> {
    let count = conn.query_row("SELECT COUNT(*) FROM insights", [], |row| row.get(0))?;
    Ok(count)
}

pub fn latest_insight_id(conn: &Connection) -> Result<i64, AppError> {
    let id = conn.query_row("SELECT IFNULL(MAX(id), 0) FROM insights", [], |row| {
        row.get(0)
    })?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::migrations::run_migrations;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn sample(timestamp: &str, path: &str) -> NewInsight {
        NewInsight {
            timestamp: timestamp.to_string(),
            event: EventKind::Moved,
            file_path: path.to_string(),
            domain: "github".to_string(),
            file_size: Some(1024),
            file_type: ".zip".to_string(),
            download_url: "https://github.com/x.zip".to_string(),
            is_duplicate: false,
        }
    }

    #[test]
    fn test_insight_crud() {
        let conn = setup_db();

        let id = insert_insight(&conn, &sample("2025-01-01 10:00:00", "/dl/a.zip")).unwrap();
        assert_eq!(id, 1);

        let fetched = get_insight(&conn, id).unwrap().unwrap();
        assert_eq!(fetched.file_path, "/dl/a.zip");
        assert_eq!(fetched.event, EventKind::Moved);
        assert_eq!(fetched.file_size, Some(1024));

        assert!(get_insight(&conn, 99).unwrap().is_none());
    }

    #[test]
    fn test_list_orders_by_timestamp_then_id() {
        let conn = setup_db();
        insert_insight(&conn, &sample("2025-01-02 08:00:00", "/dl/late.zip")).unwrap();
        insert_insight(&conn, &sample("2025-01-01 08:00:00", "/dl/early-1.zip")).unwrap();
        insert_insight(&conn, &sample("2025-01-01 08:00:00", "/dl/early-2.zip")).unwrap();

        let paths: Vec<String> = list_insights(&conn)
            .unwrap()
            .into_iter()
            .map(|r| r.file_path)
            .collect();
        assert_eq!(paths, vec!["/dl/early-1.zip", "/dl/early-2.zip", "/dl/late.zip"]);
    }

    #[test]
    fn test_latest_id_and_count() {
        let conn = setup_db();
        assert_eq!(latest_insight_id(&conn).unwrap(), 0);
        assert_eq!(count_insights(&conn).unwrap(), 0);

        insert_insight(&conn, &sample("2025-01-01 10:00:00", "/dl/a.zip")).unwrap();
        insert_insight(&conn, &sample("2025-01-01 10:00:01", "/dl/b.zip")).unwrap();

        assert_eq!(latest_insight_id(&conn).unwrap(), 2);
        assert_eq!(count_insights(&conn).unwrap(), 2);
        assert_eq!(list_insights_after(&conn, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_paths_for_domain() {
        let conn = setup_db();
        insert_insight(&conn, &sample("2025-01-01 10:00:00", "/dl/github/a.zip")).unwrap();
        let mut other = sample("2025-01-01 10:00:00", "/dl/arxiv/p.pdf");
        other.domain = "arxiv".to_string();
        insert_insight(&conn, &other).unwrap();

        assert_eq!(
            list_paths_for_domain(&conn, "github").unwrap(),
            vec!["/dl/github/a.zip".to_string()]
        );
    }
}
