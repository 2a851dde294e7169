pub mod history;
pub mod history_locator;
pub mod migrations;
pub mod repository;

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::AppError;

pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the insight database with the lock-wait timeout and current schema.
pub fn open_insights(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}
