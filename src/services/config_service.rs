use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::AppError;
use crate::models::settings::Config;
use crate::paths;

/// Load/save capability for the persisted settings.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Config, AppError>;
    fn save(&self, config: &Config) -> Result<(), AppError>;
}

/// Pretty-printed JSON file.
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn platform_default() -> Result<Self, AppError> {
        Ok(Self::new(paths::config_file_path()?))
    }
}

impl ConfigStore for JsonConfigStore {
    /// A missing or unreadable file loads as defaults.
    fn load(&self) -> Result<Config, AppError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(default_config()),
            Err(e) => {
                tracing::warn!("could not read {}: {e}", self.path.display());
                return Ok(default_config());
            }
        };
        match serde_json::from_str::<Config>(&raw) {
            Ok(mut config) => {
                if config.monitored_folder.is_none() {
                    config.monitored_folder = default_config().monitored_folder;
                }
                Ok(config)
            }
            Err(e) => {
                tracing::warn!("ignoring corrupt settings in {}: {e}", self.path.display());
                Ok(default_config())
            }
        }
    }

    fn save(&self, config: &Config) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(config)?)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryConfigStore {
    config: Mutex<Config>,
}

impl MemoryConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Config, AppError> {
        Ok(self
            .config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save(&self, config: &Config) -> Result<(), AppError> {
        *self
            .config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config.clone();
        Ok(())
    }
}

/// The user's Downloads directory when it exists.
pub fn default_config() -> Config {
    let monitored_folder = directories::UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|p| p.to_path_buf()))
        .filter(|p| p.is_dir());
    Config {
        monitored_folder,
        history_db_path: None,
    }
}

/// Drops a saved history path that no longer points at a file, persisting
/// the change. Returns the path still in effect.
pub fn validate_history_path(
    store: &dyn ConfigStore,
    config: &mut Config,
) -> Result<Option<PathBuf>, AppError> {
    match config.history_db_path.as_ref() {
        Some(path) if paths::expand_home(path).is_file() => Ok(Some(paths::expand_home(path))),
        Some(path) => {
            tracing::warn!("saved history path {} no longer exists, clearing it", path.display());
            config.history_db_path = None;
            store.save(config)?;
            Ok(None)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path().join("config.json"));
        let config = store.load().unwrap();
        assert_eq!(config.history_db_path, None);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path().join("nested").join("config.json"));
        let config = Config {
            monitored_folder: Some(dir.path().to_path_buf()),
            history_db_path: Some(dir.path().join("History")),
        };
        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let config = JsonConfigStore::new(path).load().unwrap();
        assert_eq!(config.history_db_path, None);
    }

    #[test]
    fn stale_history_path_is_cleared_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryConfigStore::default();
        let mut config = Config {
            monitored_folder: Some(dir.path().to_path_buf()),
            history_db_path: Some(dir.path().join("missing-History")),
        };
        store.save(&config).unwrap();

        assert_eq!(validate_history_path(&store, &mut config).unwrap(), None);
        assert_eq!(config.history_db_path, None);
        assert_eq!(store.load().unwrap().history_db_path, None);
    }

    #[test]
    fn existing_history_path_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("History");
        fs::write(&history, b"").unwrap();
        let store = MemoryConfigStore::default();
        let mut config = Config {
            monitored_folder: None,
            history_db_path: Some(history.clone()),
        };
        assert_eq!(
            validate_history_path(&store, &mut config).unwrap(),
            Some(history)
        );
    }
}
