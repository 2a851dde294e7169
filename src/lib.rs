//! Watches a downloads folder, files each finished download under a folder
//! named after the site it came from, and keeps a queryable log of moves.

pub mod commands;
pub mod data;
pub mod error;
pub mod logging;
pub mod models;
pub mod paths;
pub mod services;
pub mod state;

pub use error::AppError;
pub use state::AppState;
