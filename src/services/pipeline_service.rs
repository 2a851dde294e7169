use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::models::insight::{EventKind, InsightRecord};
use crate::models::watch::{AbandonReason, StabilityState, WatchEvent, WatchEventKind};
use crate::services::insight_service::InsightStore;
use crate::services::message_service::MessageSink;
use crate::services::relocation_service::{self, DuplicateCandidate, DuplicatePolicy};
use crate::services::resolver_service::DomainResolver;
use crate::services::stability_service::{self, StabilityOptions};

/// Settle, resolve, relocate and log, one file at a time.
pub struct DownloadPipeline {
    root: PathBuf,
    resolver: DomainResolver,
    store: InsightStore,
    duplicates: Box<dyn DuplicatePolicy>,
    sink: Arc<dyn MessageSink>,
    stability: StabilityOptions,
}

impl DownloadPipeline {
    pub fn new(
        root: PathBuf,
        resolver: DomainResolver,
        store: InsightStore,
        duplicates: Box<dyn DuplicatePolicy>,
        sink: Arc<dyn MessageSink>,
        stability: StabilityOptions,
    ) -> Self {
        Self {
            root,
            resolver,
            store,
            duplicates,
            sink,
            stability,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the record written for this event, if any.
    pub fn handle_event(&self, event: &WatchEvent, cancel: &AtomicBool) -> Option<InsightRecord> {
        if event.path.is_dir() {
            return None;
        }
        match event.kind {
            WatchEventKind::Created => {
                if stability_service::is_incomplete_download(&event.path) {
                    self.sink.emit(&format!(
                        "Detected new temporary file: {}",
                        event.path.display()
                    ));
                }
                None
            }
            WatchEventKind::Moved => {
                // inotify reports a rename as both `To` and `Both`; the second
                // copy arrives after the file has already been relocated.
                if !event.path.exists() {
                    tracing::debug!("renamed file already gone: {}", event.path.display());
                    return None;
                }
                self.sink
                    .emit(&format!("File renamed to {}", event.path.display()));
                self.handle_renamed(&event.path, cancel)
            }
        }
    }

    fn handle_renamed(&self, path: &Path, cancel: &AtomicBool) -> Option<InsightRecord> {
        match stability_service::wait_until_settled(path.to_path_buf(), &self.stability, cancel) {
            StabilityState::Settled { .. } => self.classify_settled(path, cancel),
            StabilityState::Abandoned(AbandonReason::TimedOut) => {
                self.sink.emit(&format!(
                    "Gave up waiting for {} to finish writing",
                    path.display()
                ));
                None
            }
            StabilityState::Abandoned(reason) => {
                tracing::debug!("not classifying {}: {reason}", path.display());
                None
            }
            StabilityState::Pending => None,
        }
    }

    /// Resolves, moves and logs a file whose size has stopped changing.
    pub fn classify_settled(&self, path: &Path, cancel: &AtomicBool) -> Option<InsightRecord> {
        let origin = self.resolver.resolve(path, cancel);
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let destination_dir = self.root.join(origin.domain.as_str());
        let is_duplicate = self.duplicates.is_duplicate(&DuplicateCandidate {
            file_name: &file_name,
            domain: &origin.domain,
            destination_dir: &destination_dir,
        });

        let destination = match relocation_service::relocate(path, &self.root, &origin.domain) {
            Ok(destination) => destination,
            // Exact-name re-downloads collide with the earlier copy and stay put unlogged.
            Err(e) if is_duplicate => {
                self.sink.emit(&format!(
                    "Failed to move {}: {e} (already downloaded from {})",
                    path.display(),
                    origin.domain.as_str()
                ));
                return None;
            }
            Err(e) => {
                self.sink
                    .emit(&format!("Failed to move {}: {e}", path.display()));
                return None;
            }
        };
        self.sink.emit(&format!(
            "Moved {} to {}",
            path.display(),
            destination_dir.display()
        ));

        match self.store.append(
            EventKind::Moved,
            &destination,
            &origin.domain,
            origin.raw_url.as_deref(),
            is_duplicate,
        ) {
            Ok(record) => Some(record),
            Err(e) => {
                self.sink.emit(&format!(
                    "Failed to record move of {}: {e}",
                    destination.display()
                ));
                None
            }
        }
    }
}
