use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::models::watch::{AbandonReason, PendingFile, StabilityState};

/// Extensions browsers use while a download is still being written.
pub const INCOMPLETE_EXTENSIONS: &[&str] = &["tmp", "crdownload"];

const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
pub struct StabilityOptions {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for StabilityOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_polls: 150,
        }
    }
}

pub fn is_incomplete_download(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            INCOMPLETE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Sleeps for `duration` in short slices. Returns `false` if cancelled.
pub fn sleep_unless_cancelled(duration: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

impl PendingFile {
    /// Feeds one size observation (`None` when the file is gone).
    pub fn observe(&mut self, current: Option<u64>, max_polls: u32) -> StabilityState {
        self.polls += 1;
        self.last_checked_at = Instant::now();

        let Some(size) = current else {
            return StabilityState::Abandoned(AbandonReason::Vanished);
        };

        match self.last_known_size.replace(size) {
            Some(previous) if previous == size => {
                if is_incomplete_download(&self.path) {
                    StabilityState::Abandoned(AbandonReason::PartialDownload)
                } else {
                    StabilityState::Settled { size }
                }
            }
            _ if self.polls >= max_polls => StabilityState::Abandoned(AbandonReason::TimedOut),
            _ => StabilityState::Pending,
        }
    }
}

fn current_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

/// Polls `path` until its size holds still across one interval.
pub fn wait_until_settled(
    path: PathBuf,
    options: &StabilityOptions,
    cancel: &AtomicBool,
) -> StabilityState {
    let mut pending = PendingFile::new(path);
    loop {
        if cancel.load(Ordering::Relaxed) {
            return StabilityState::Abandoned(AbandonReason::Cancelled);
        }
        match pending.observe(current_size(&pending.path), options.max_polls) {
            StabilityState::Pending => {}
            outcome => return outcome,
        }
        if !sleep_unless_cancelled(options.poll_interval, cancel) {
            return StabilityState::Abandoned(AbandonReason::Cancelled);
        }
    }
}
