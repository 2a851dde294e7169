use std::path::Path;

use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::insight::InsightRecord;
use crate::paths;
use crate::services::insight_service::{self, InsightStore, InsightSummary};
use crate::state::AppState;

fn current_store(state: &AppState) -> Result<InsightStore, AppError> {
    let folder = state
        .config()
        .monitored_folder
        .ok_or_else(|| AppError::Config("no monitored folder is configured".to_string()))?;
    Ok(state.store_for(&paths::normalize(&folder)))
}

pub fn get_history(state: &AppState) -> Result<Vec<InsightRecord>, AppError> {
    current_store(state)?.list_all()
}

pub fn get_history_after(state: &AppState, after_id: i64) -> Result<Vec<InsightRecord>, AppError> {
    current_store(state)?.list_after(after_id)
}

pub fn get_latest_id(state: &AppState) -> Result<i64, AppError> {
    current_store(state)?.latest_id()
}

/// Records logged after `last_seen`, with the new high-water id. Read errors
/// are logged and leave `last_seen` unchanged so the caller can keep polling.
pub fn poll_new_records(state: &AppState, last_seen: i64) -> (Vec<InsightRecord>, i64) {
    let latest = match get_latest_id(state) {
        Ok(latest) if latest > last_seen => latest,
        Ok(_) => return (Vec::new(), last_seen),
        Err(e) => {
            tracing::warn!("could not poll the event log: {e}");
            return (Vec::new(), last_seen);
        }
    };
    match get_history_after(state, last_seen) {
        Ok(records) => (records, latest),
        Err(e) => {
            tracing::warn!("could not read new events: {e}");
            (Vec::new(), last_seen)
        }
    }
}

pub fn get_summary(
    state: &AppState,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<InsightSummary, AppError> {
    if let (Some(start), Some(end)) = (from, to) {
        if start > end {
            return Err(AppError::General(format!(
                "start date {start} is after end date {end}"
            )));
        }
    }
    let records = current_store(state)?.list_all()?;
    Ok(insight_service::summarize(&records, from, to))
}

/// Writes the full history as CSV; returns the number of rows written.
pub fn export_history(state: &AppState, destination: &Path) -> Result<usize, AppError> {
    current_store(state)?.export(destination)
}
