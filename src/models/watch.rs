use std::path::PathBuf;
use std::time::{Instant, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Moved,
}

/// Filesystem notification, consumed as soon as it is received.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
    pub timestamp: SystemTime,
}

impl WatchEvent {
    pub fn new(path: PathBuf, kind: WatchEventKind) -> Self {
        Self {
            path,
            kind,
            timestamp: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    Vanished,
    PartialDownload,
    Cancelled,
    TimedOut,
}

impl std::fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vanished => write!(f, "file disappeared"),
            Self::PartialDownload => write!(f, "download is still in progress"),
            Self::Cancelled => write!(f, "monitoring stopped"),
            Self::TimedOut => write!(f, "size never settled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityState {
    Pending,
    Settled { size: u64 },
    Abandoned(AbandonReason),
}

/// A file under stability observation.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub path: PathBuf,
    pub last_known_size: Option<u64>,
    pub last_checked_at: Instant,
    pub polls: u32,
}

impl PendingFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_known_size: None,
            last_checked_at: Instant::now(),
            polls: 0,
        }
    }
}
