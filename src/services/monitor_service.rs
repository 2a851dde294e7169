use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::AppError;
use crate::models::watch::{WatchEvent, WatchEventKind};
use crate::services::message_service::MessageSink;
use crate::services::pipeline_service::DownloadPipeline;

pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const RECV_TIMEOUT: Duration = Duration::from_millis(500);
const RENAME_ECHO_WINDOW: Duration = Duration::from_secs(2);

pub struct MonitorHandle {
    folder: PathBuf,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| !thread.is_finished())
            .unwrap_or(false)
    }

    /// Signals the worker and waits up to `timeout` for it to exit.
    /// Returns false when the worker was left behind still running.
    pub fn stop(mut self, timeout: Duration) -> bool {
        self.cancel.store(true, Ordering::Relaxed);
        let Some(thread) = self.thread.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    "monitor for {} did not stop within {:?}",
                    self.folder.display(),
                    timeout
                );
                return false;
            }
            thread::sleep(Duration::from_millis(25));
        }
        if thread.join().is_err() {
            tracing::error!("monitor thread for {} panicked", self.folder.display());
        }
        true
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

fn is_direct_child(path: &Path, roots: &[PathBuf]) -> bool {
    path.parent()
        .map(|parent| roots.iter().any(|root| root == parent))
        .unwrap_or(false)
}

/// Maps a raw notify event onto the two kinds the pipeline cares about.
/// Only files directly inside one of `roots` are kept.
pub fn translate_event(event: &notify::Event, roots: &[PathBuf]) -> Vec<WatchEvent> {
    let (kind, paths): (WatchEventKind, Vec<&PathBuf>) = match event.kind {
        EventKind::Create(CreateKind::Folder) => return Vec::new(),
        EventKind::Create(_) => (WatchEventKind::Created, event.paths.iter().collect()),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            (WatchEventKind::Moved, event.paths.get(1).into_iter().collect())
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            (WatchEventKind::Moved, event.paths.first().into_iter().collect())
        }
        // FSEvents reports both ends of a rename as `Any`; the end that
        // still exists is the new name.
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => (
            WatchEventKind::Moved,
            event.paths.iter().filter(|p| p.is_file()).collect(),
        ),
        _ => return Vec::new(),
    };

    paths
        .into_iter()
        .filter(|path| is_direct_child(path, roots) && !path.is_dir())
        .map(|path| WatchEvent::new(path.clone(), kind))
        .collect()
}

/// Paths whose rename was just handled. Some backends report one rename
/// more than once (inotify sends both `To` and `Both`), so a repeat that
/// arrives within `window` of the previous handling finishing is dropped.
struct RecentRenames {
    window: Duration,
    handled: HashMap<PathBuf, Instant>,
}

impl RecentRenames {
    fn new(window: Duration) -> Self {
        Self {
            window,
            handled: HashMap::new(),
        }
    }

    fn is_echo(&mut self, path: &Path, now: Instant) -> bool {
        let window = self.window;
        self.handled
            .retain(|_, finished| now.saturating_duration_since(*finished) < window);
        self.handled.contains_key(path)
    }

    fn mark_handled(&mut self, path: &Path, now: Instant) {
        self.handled.insert(path.to_path_buf(), now);
    }
}

fn watch_roots(folder: &Path) -> Vec<PathBuf> {
    let mut roots = vec![folder.to_path_buf()];
    if let Ok(canonical) = folder.canonicalize() {
        if canonical != folder {
            roots.push(canonical);
        }
    }
    roots
}

/// Watches `folder` (non-recursively) on a background thread, feeding
/// creations and renames through `pipeline`.
pub fn start_monitoring(
    folder: &Path,
    pipeline: DownloadPipeline,
    sink: Arc<dyn MessageSink>,
) -> Result<MonitorHandle, AppError> {
    if !folder.is_dir() {
        return Err(AppError::Config(format!(
            "monitored folder is not a directory: {}",
            folder.display()
        )));
    }

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = tx.send(res);
    })?;
    watcher.watch(folder, RecursiveMode::NonRecursive)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let worker_cancel = cancel.clone();
    let roots = watch_roots(folder);
    let worker_sink = sink.clone();
    let thread = thread::Builder::new()
        .name("download-monitor".to_string())
        .spawn(move || run_monitor(watcher, rx, pipeline, roots, worker_cancel, worker_sink))?;

    sink.emit(&format!("Started monitoring {}", folder.display()));
    Ok(MonitorHandle {
        folder: folder.to_path_buf(),
        cancel,
        thread: Some(thread),
    })
}

fn run_monitor(
    watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<notify::Event>>,
    pipeline: DownloadPipeline,
    roots: Vec<PathBuf>,
    cancel: Arc<AtomicBool>,
    sink: Arc<dyn MessageSink>,
) {
    let mut recent = RecentRenames::new(RENAME_ECHO_WINDOW);
    while !cancel.load(Ordering::Relaxed) {
        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(Ok(event)) => {
                for watch_event in translate_event(&event, &roots) {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let is_rename = watch_event.kind == WatchEventKind::Moved;
                    if is_rename && recent.is_echo(&watch_event.path, Instant::now()) {
                        tracing::debug!("duplicate rename event for {}", watch_event.path.display());
                        continue;
                    }
                    dispatch(&pipeline, &watch_event, &cancel, sink.as_ref());
                    if is_rename {
                        recent.mark_handled(&watch_event.path, Instant::now());
                    }
                }
            }
            Ok(Err(e)) => sink.emit(&format!("Watcher error: {e}")),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                sink.emit("Watcher disconnected");
                break;
            }
        }
    }
    drop(watcher);
    sink.emit("Monitoring stopped.");
}

fn dispatch(
    pipeline: &DownloadPipeline,
    event: &WatchEvent,
    cancel: &AtomicBool,
    sink: &dyn MessageSink,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.handle_event(event, cancel)));
    if outcome.is_err() {
        sink.emit(&format!(
            "Unexpected failure while handling {}",
            event.path.display()
        ));
    }
}
