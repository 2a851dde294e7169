use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

/// Destination for human-readable progress notifications.
pub trait MessageSink: Send + Sync {
    fn emit(&self, message: &str);
}

/// Thread-safe queue the watcher writes to and the front-end drains.
pub struct MessageQueue {
    tx: Mutex<Sender<String>>,
    rx: Mutex<Receiver<String>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
        }
    }

    /// Everything queued so far, oldest first. Never blocks on the producer.
    pub fn drain(&self) -> Vec<String> {
        let rx = self.rx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rx.try_iter().collect()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSink for MessageQueue {
    fn emit(&self, message: &str) {
        tracing::info!(target: "download_insights::monitor", "{message}");
        let stamped = format!("[{}] {message}", chrono::Local::now().format("%H:%M:%S"));
        let tx = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = tx.send(stamped);
    }
}

#[cfg(test)]
#[derive(Default)]
pub(crate) struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

#[cfg(test)]
impl CollectingSink {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub(crate) fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

#[cfg(test)]
impl MessageSink for CollectingSink {
    fn emit(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
