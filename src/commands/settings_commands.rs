use std::path::{Path, PathBuf};

use crate::data::history_locator::HistoryLocator;
use crate::error::AppError;
use crate::models::settings::Config;
use crate::paths;
use crate::services::message_service::MessageSink;
use crate::state::AppState;

pub fn show_config(state: &AppState) -> Config {
    state.config()
}

/// Saves a new monitored folder. Takes effect the next time monitoring starts.
pub fn set_monitored_folder(state: &AppState, folder: &Path) -> Result<PathBuf, AppError> {
    let folder = paths::normalize(folder);
    if !folder.is_dir() {
        return Err(AppError::Config(format!(
            "not a directory: {}",
            folder.display()
        )));
    }
    if state.is_monitoring() {
        state.messages.emit(&format!(
            "Monitored folder changed to {}; restart monitoring to switch.",
            folder.display()
        ));
    }
    let saved = folder.clone();
    state.update_config(move |config| config.monitored_folder = Some(saved))?;
    Ok(folder)
}

pub fn set_history_path(state: &AppState, path: &Path) -> Result<PathBuf, AppError> {
    let path = paths::expand_home(path);
    if !path.is_file() {
        return Err(AppError::Config(format!(
            "history database not found at {}",
            path.display()
        )));
    }
    let saved = path.clone();
    state.update_config(move |config| config.history_db_path = Some(saved))?;
    Ok(path)
}

pub fn clear_history_path(state: &AppState) -> Result<(), AppError> {
    state.update_config(|config| config.history_db_path = None)?;
    Ok(())
}

/// Looks for the history database in the usual places and saves the first hit.
pub fn detect_history_path(state: &AppState) -> Result<Option<PathBuf>, AppError> {
    detect_history_path_with(state, &HistoryLocator::platform_default())
}

pub fn detect_history_path_with(
    state: &AppState,
    locator: &HistoryLocator,
) -> Result<Option<PathBuf>, AppError> {
    let Some(found) = locator.auto_detect() else {
        return Ok(None);
    };
    let saved = found.clone();
    state.update_config(move |config| config.history_db_path = Some(saved))?;
    Ok(Some(found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::config_service::{ConfigStore, MemoryConfigStore};
    use std::fs;
    use std::sync::Arc;

    fn test_state(home: &Path) -> (AppState, Arc<MemoryConfigStore>) {
        let store = Arc::new(MemoryConfigStore::default());
        let state = AppState::new(home.to_path_buf(), store.clone()).unwrap();
        (state, store)
    }

    #[test]
    fn set_folder_rejects_missing_directory() {
        let home = tempfile::tempdir().unwrap();
        let (state, _) = test_state(home.path());
        let result = set_monitored_folder(&state, &home.path().join("missing"));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn set_folder_saves_normalized_path() {
        let home = tempfile::tempdir().unwrap();
        let (state, store) = test_state(home.path());
        let folder = set_monitored_folder(&state, home.path()).unwrap();
        assert_eq!(store.load().unwrap().monitored_folder, Some(folder));
    }

    #[test]
    fn history_path_must_be_a_file() {
        let home = tempfile::tempdir().unwrap();
        let (state, store) = test_state(home.path());
        assert!(set_history_path(&state, &home.path().join("History")).is_err());

        let history = home.path().join("History");
        fs::write(&history, b"").unwrap();
        set_history_path(&state, &history).unwrap();
        assert_eq!(store.load().unwrap().history_db_path, Some(history));

        clear_history_path(&state).unwrap();
        assert_eq!(show_config(&state).history_db_path, None);
        assert_eq!(store.load().unwrap().history_db_path, None);
    }

    #[test]
    fn detect_saves_found_history() {
        let home = tempfile::tempdir().unwrap();
        let user_data = home.path().join("User Data");
        fs::create_dir_all(user_data.join("Default")).unwrap();
        fs::write(user_data.join("Default").join("History"), b"").unwrap();
        let (state, store) = test_state(home.path());

        let found = detect_history_path_with(&state, &HistoryLocator::with_roots(vec![user_data.clone()]))
            .unwrap();
        assert_eq!(found, Some(user_data.join("Default").join("History")));
        assert_eq!(store.load().unwrap().history_db_path, found);
    }

    #[test]
    fn detect_leaves_config_alone_when_nothing_found() {
        let home = tempfile::tempdir().unwrap();
        let (state, store) = test_state(home.path());
        let found =
            detect_history_path_with(&state, &HistoryLocator::with_roots(vec![home.path().join("none")]))
                .unwrap();
        assert_eq!(found, None);
        assert_eq!(store.load().unwrap().history_db_path, None);
    }
}
