use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitored_folder: Option<PathBuf>,
    #[serde(default, alias = "edge_history_path")]
    pub history_db_path: Option<PathBuf>,
}
