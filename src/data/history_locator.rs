use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const HISTORY_FILE_NAME: &str = "History";
const LOCAL_STATE_FILE_NAME: &str = "Local State";
const DEFAULT_PROFILE: &str = "Default";

/// Finds the browser's `History` database among its user-data directories.
#[derive(Debug, Clone)]
pub struct HistoryLocator {
    roots: Vec<PathBuf>,
}

impl HistoryLocator {
    pub fn platform_default() -> Self {
        Self::with_roots(candidate_user_data_dirs())
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// The configured path when it is a file, else the first detected one.
    pub fn locate(&self, configured: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = configured.filter(|p| p.is_file()) {
            return Some(path.to_path_buf());
        }
        self.auto_detect()
    }

    pub fn auto_detect(&self) -> Option<PathBuf> {
        let mut seen_roots = HashSet::new();
        for root in &self.roots {
            let normalized: PathBuf = root.components().collect();
            if !seen_roots.insert(normalized.clone()) || !normalized.is_dir() {
                continue;
            }
            if let Some(found) = history_in_user_data_dir(&normalized) {
                return Some(found);
            }
        }
        None
    }
}

fn candidate_user_data_dirs() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(local) = std::env::var_os("LOCALAPPDATA") {
        candidates.push(PathBuf::from(local).join("Microsoft").join("Edge").join("User Data"));
    }
    if let Some(program_data) = std::env::var_os("PROGRAMDATA") {
        candidates.push(
            PathBuf::from(program_data)
                .join("Microsoft")
                .join("Edge")
                .join("User Data"),
        );
    }
    if let Some(base) = directories::BaseDirs::new() {
        let home = base.home_dir();
        candidates.push(home.join("AppData").join("Local").join("Microsoft").join("Edge").join("User Data"));
        candidates.push(home.join(".config").join("microsoft-edge"));
        candidates.push(home.join("Library").join("Application Support").join("Microsoft Edge"));
    }
    candidates
}

/// Profile names listed in the browser's `Local State` manifest.
pub fn profiles_from_local_state(local_state: &Path) -> Vec<String> {
    let Ok(raw) = fs::read_to_string(local_state) else {
        return Vec::new();
    };
    let Ok(data) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return Vec::new();
    };
    let Some(profile) = data.get("profile").and_then(|p| p.as_object()) else {
        return Vec::new();
    };

    let mut profiles = Vec::new();
    for key in ["last_used", "default_profile"] {
        if let Some(name) = profile.get(key).and_then(|v| v.as_str()) {
            if !name.is_empty() {
                profiles.push(name.to_string());
            }
        }
    }
    if let Some(cache) = profile.get("info_cache").and_then(|v| v.as_object()) {
        profiles.extend(cache.keys().cloned());
    }
    profiles
}

fn history_in_user_data_dir(user_data_dir: &Path) -> Option<PathBuf> {
    let mut profiles = profiles_from_local_state(&user_data_dir.join(LOCAL_STATE_FILE_NAME));

    if let Ok(entries) = fs::read_dir(user_data_dir) {
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| {
                let lowered = name.to_ascii_lowercase();
                lowered == "default" || lowered.starts_with("profile")
            })
            .collect();
        names.sort();
        profiles.extend(names);
    }
    profiles.push(DEFAULT_PROFILE.to_string());

    let mut seen = HashSet::new();
    profiles
        .into_iter()
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .map(|name| user_data_dir.join(name).join(HISTORY_FILE_NAME))
        .find(|path| path.is_file())
}
