use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::AppError;

pub const HOME_ENV: &str = "DOWNLOAD_INSIGHTS_HOME";
const ANALYTICS_SUBDIR: &str = "analytics";
const LEGACY_INSIGHTS_SUBDIR: &str = "downloadinsights";
const CONFIG_FILE_NAME: &str = "config.json";

/// Application data root. `DOWNLOAD_INSIGHTS_HOME` wins over the platform dir.
pub fn app_home() -> Result<PathBuf, AppError> {
    if let Some(override_path) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(override_path));
    }
    directories::ProjectDirs::from("", "", "Download Insights")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| AppError::Config("could not resolve application data directory".into()))
}

pub fn config_file_path() -> Result<PathBuf, AppError> {
    if let Some(override_path) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(override_path).join(CONFIG_FILE_NAME));
    }
    directories::ProjectDirs::from("", "", "Download Insights")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
        .ok_or_else(|| AppError::Config("could not resolve configuration directory".into()))
}

pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match directories::BaseDirs::new() {
        Some(base) => base.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

/// Absolute form of `folder` with `~` expanded and trailing separators removed.
pub fn normalize(folder: &Path) -> PathBuf {
    let expanded = expand_home(folder);
    let absolute = std::path::absolute(&expanded).unwrap_or(expanded);
    absolute.components().collect()
}

fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut in_run = false;
    for ch in segment.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Stable, filesystem-safe key for a monitored folder: `<tail>_<digest10>`.
pub fn storage_identifier(folder: &Path) -> String {
    let normalized = normalize(folder);
    let digest = Sha256::digest(normalized.to_string_lossy().as_bytes());
    let hex = format!("{digest:x}");
    let tail = normalized
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "downloads".to_string());
    format!("{}_{}", sanitize_segment(&tail), &hex[..10])
}

pub fn analytics_dir(home: &Path, folder: &Path) -> PathBuf {
    home.join(ANALYTICS_SUBDIR).join(storage_identifier(folder))
}

pub fn legacy_insights_dir(folder: &Path) -> PathBuf {
    normalize(folder).join(LEGACY_INSIGHTS_SUBDIR)
}
