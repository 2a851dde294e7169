use std::path::PathBuf;
use std::sync::Arc;

use crate::data::history::{BrowserHistory, OriginSource};
use crate::data::history_locator::HistoryLocator;
use crate::error::AppError;
use crate::paths;
use crate::services::config_service;
use crate::services::message_service::MessageSink;
use crate::services::monitor_service::{self, STOP_TIMEOUT};
use crate::services::pipeline_service::DownloadPipeline;
use crate::services::relocation_service::PreviouslyLogged;
use crate::services::resolver_service::{DomainResolver, RetryPolicy};
use crate::services::stability_service::StabilityOptions;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorOptions {
    pub stability: StabilityOptions,
    pub retry: RetryPolicy,
}

/// The configured monitored folder, normalized, or a configuration error.
pub fn monitored_folder(state: &AppState) -> Result<PathBuf, AppError> {
    let folder = state
        .config()
        .monitored_folder
        .ok_or_else(|| AppError::Config("no monitored folder is configured".to_string()))?;
    let folder = paths::normalize(&folder);
    if !folder.is_dir() {
        return Err(AppError::Config(format!(
            "monitored folder does not exist: {}",
            folder.display()
        )));
    }
    Ok(folder)
}

/// Starts monitoring with the browser history found on this machine.
pub fn start_monitor(state: &AppState) -> Result<PathBuf, AppError> {
    let mut config = state.config();
    let saved = config_service::validate_history_path(state.config_store.as_ref(), &mut config)?;
    if saved.is_none() && state.config().history_db_path.is_some() {
        state.update_config(|current| current.history_db_path = None)?;
    }
    let source = BrowserHistory::new(HistoryLocator::platform_default(), saved);
    start_monitor_with(state, Arc::new(source), MonitorOptions::default())
}

pub fn start_monitor_with(
    state: &AppState,
    source: Arc<dyn OriginSource>,
    options: MonitorOptions,
) -> Result<PathBuf, AppError> {
    let mut monitor = state
        .monitor
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handle) = monitor.as_ref() {
        if handle.is_running() {
            return Err(AppError::General(format!(
                "already monitoring {}",
                handle.folder().display()
            )));
        }
    }

    let folder = monitored_folder(state)?;
    let store = state.store_for(&folder);
    store.initialize()?;

    let sink: Arc<dyn MessageSink> = state.messages.clone();
    let resolver = DomainResolver::new(source, options.retry, sink.clone());
    let pipeline = DownloadPipeline::new(
        folder.clone(),
        resolver,
        store.clone(),
        Box::new(PreviouslyLogged::new(store)),
        sink.clone(),
        options.stability,
    );
    let handle = monitor_service::start_monitoring(&folder, pipeline, sink)?;
    *monitor = Some(handle);
    tracing::info!("monitoring {}", folder.display());
    Ok(folder)
}

/// Returns false when nothing was running.
pub fn stop_monitor(state: &AppState) -> bool {
    let handle = state
        .monitor
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    match handle {
        Some(handle) => {
            if !handle.stop(STOP_TIMEOUT) {
                state
                    .messages
                    .emit("Monitor did not stop in time; it will exit after the current file.");
            }
            true
        }
        None => false,
    }
}
