use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::models::settings::Config;
use crate::services::config_service::ConfigStore;
use crate::services::insight_service::InsightStore;
use crate::services::message_service::MessageQueue;
use crate::services::monitor_service::MonitorHandle;

pub struct AppState {
    pub home: PathBuf,
    pub config: Mutex<Config>,
    pub config_store: Arc<dyn ConfigStore>,
    pub messages: Arc<MessageQueue>,
    pub monitor: Mutex<Option<MonitorHandle>>,
}

impl AppState {
    pub fn new(home: PathBuf, config_store: Arc<dyn ConfigStore>) -> Result<Self, AppError> {
        let config = config_store.load()?;
        Ok(Self {
            home,
            config: Mutex::new(config),
            config_store,
            messages: Arc::new(MessageQueue::new()),
            monitor: Mutex::new(None),
        })
    }

    pub fn config(&self) -> Config {
        self.config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Applies `change` and persists the result through the config store.
    pub fn update_config<F>(&self, change: F) -> Result<Config, AppError>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self
            .config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut updated = config.clone();
        change(&mut updated);
        self.config_store.save(&updated)?;
        *config = updated.clone();
        Ok(updated)
    }

    pub fn store_for(&self, monitored_folder: &Path) -> InsightStore {
        InsightStore::for_folder(&self.home, monitored_folder)
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(MonitorHandle::is_running)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::config_service::MemoryConfigStore;

    fn test_state(store: Arc<MemoryConfigStore>) -> AppState {
        AppState::new(std::env::temp_dir().join("download-insights-state"), store).unwrap()
    }

    #[test]
    fn update_config_persists_through_store() {
        let store = Arc::new(MemoryConfigStore::default());
        let state = test_state(store.clone());

        state
            .update_config(|config| config.monitored_folder = Some(PathBuf::from("/data/dl")))
            .unwrap();

        assert_eq!(
            state.config().monitored_folder,
            Some(PathBuf::from("/data/dl"))
        );
        assert_eq!(
            store.load().unwrap().monitored_folder,
            Some(PathBuf::from("/data/dl"))
        );
    }

    #[test]
    fn config_survives_poisoned_lock() {
        let state = Arc::new(test_state(Arc::new(MemoryConfigStore::new(Config {
            monitored_folder: Some(PathBuf::from("/data/dl")),
            history_db_path: None,
        }))));

        let poisoner = state.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.config.lock().unwrap();
            panic!("poison the config lock");
        })
        .join();

        assert_eq!(
            state.config().monitored_folder,
            Some(PathBuf::from("/data/dl"))
        );
    }

    #[test]
    fn stores_are_keyed_under_home() {
        let state = test_state(Arc::new(MemoryConfigStore::default()));
        let store = state.store_for(Path::new("/data/dl"));
        assert!(store.dir().starts_with(state.home.join("analytics")));
    }

    #[test]
    fn idle_state_is_not_monitoring() {
        let state = test_state(Arc::new(MemoryConfigStore::default()));
        assert!(!state.is_monitoring());
    }
}
