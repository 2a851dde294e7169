use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::data::history::{LookupError, OriginSource};
use crate::models::origin::{Domain, ResolvedOrigin};
use crate::services::message_service::MessageSink;
use crate::services::stability_service::sleep_unless_cancelled;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
        }
    }
}

/// Host label of `url`: `https://www.example.co.uk/x` gives `example`.
pub fn extract_domain(url: &str) -> Domain {
    let Ok(parsed) = url::Url::parse(url.trim()) else {
        return Domain::Unresolved;
    };
    let Some(host) = parsed.host_str() else {
        return Domain::Unresolved;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = host.strip_prefix("www.").unwrap_or(host);
    match host.split('.').next() {
        Some(label) if !label.is_empty() => Domain::Resolved(label.to_string()),
        _ => Domain::Unresolved,
    }
}

/// Maps settled downloads to their origin via the history port.
pub struct DomainResolver {
    source: Arc<dyn OriginSource>,
    retry: RetryPolicy,
    sink: Arc<dyn MessageSink>,
}

impl DomainResolver {
    pub fn new(source: Arc<dyn OriginSource>, retry: RetryPolicy, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            source,
            retry,
            sink,
        }
    }

    /// Never fails: anything unrecoverable yields `Domain::Unresolved`.
    pub fn resolve(&self, file_path: &Path, cancel: &AtomicBool) -> ResolvedOrigin {
        let target = file_path.to_string_lossy();
        let mut delay = self.retry.initial_delay;

        for attempt in 1..=self.retry.max_attempts {
            match self.source.find_origin_url(&target) {
                Ok(Some(url)) => {
                    let domain = extract_domain(&url);
                    if !domain.is_resolved() {
                        self.sink.emit(&format!("Could not read a host from {url}"));
                    }
                    return ResolvedOrigin {
                        domain,
                        raw_url: Some(url),
                    };
                }
                Ok(None) => {
                    self.sink.emit(&format!("No history entry found for: {target}"));
                    return ResolvedOrigin::unresolved();
                }
                Err(LookupError::Locked) => {
                    if attempt == self.retry.max_attempts {
                        break;
                    }
                    self.sink.emit(&format!(
                        "History database is locked, retrying in {:.1} seconds",
                        delay.as_secs_f64()
                    ));
                    if !sleep_unless_cancelled(delay, cancel) {
                        self.sink.emit(&format!("Stopped resolving {target}"));
                        return ResolvedOrigin::unresolved();
                    }
                    delay *= 2;
                }
                Err(e @ LookupError::NotFound(_)) | Err(e @ LookupError::SourceMissing(_)) => {
                    self.sink.emit(&e.to_string());
                    return ResolvedOrigin::unresolved();
                }
                Err(e) => {
                    self.sink.emit(&format!("Error getting domain for {target}: {e}"));
                    return ResolvedOrigin::unresolved();
                }
            }
        }

        self.sink.emit(&format!(
            "Failed to get domain for {target} after {} attempts",
            self.retry.max_attempts
        ));
        ResolvedOrigin::unresolved()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::message_service::CollectingSink;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Scripted history: queued errors first, then the mapping.
    #[derive(Default)]
    pub(crate) struct FakeHistory {
        pub(crate) urls: HashMap<String, String>,
        pub(crate) failures: Mutex<VecDeque<LookupError>>,
        pub(crate) calls: Mutex<u32>,
    }

    impl FakeHistory {
        pub(crate) fn with_url(path: &str, url: &str) -> Self {
            let mut fake = Self::default();
            fake.urls.insert(path.to_string(), url.to_string());
            fake
        }

        fn fail_with(self, errors: Vec<LookupError>) -> Self {
            *self.failures.lock().unwrap() = errors.into();
            self
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl OriginSource for FakeHistory {
        fn find_origin_url(&self, target_path: &str) -> Result<Option<String>, LookupError> {
            *self.calls.lock().unwrap() += 1;
            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            Ok(self.urls.get(target_path).cloned())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
        }
    }

    fn resolver(fake: Arc<FakeHistory>, sink: Arc<CollectingSink>) -> DomainResolver {
        DomainResolver::new(fake, fast_retry(), sink)
    }

    #[test]
    fn extracts_first_label_after_www() {
        assert_eq!(
            extract_domain("https://www.example.co.uk/page"),
            Domain::Resolved("example".to_string())
        );
        assert_eq!(
            extract_domain("https://github.com/x/y.zip"),
            Domain::Resolved("github".to_string())
        );
        assert_eq!(
            extract_domain("http://dl.google.com/a"),
            Domain::Resolved("dl".to_string())
        );
    }

    #[test]
    fn hostless_urls_are_unresolved() {
        assert_eq!(extract_domain("not a url"), Domain::Unresolved);
        assert_eq!(extract_domain(""), Domain::Unresolved);
        assert_eq!(extract_domain("file:///tmp/a.zip"), Domain::Unresolved);
        assert_eq!(extract_domain("data:text/plain,hello"), Domain::Unresolved);
    }

    #[test]
    fn resolves_known_download() {
        let fake = Arc::new(FakeHistory::with_url("/dl/a.zip", "https://www.example.com/a.zip"));
        let sink = Arc::new(CollectingSink::default());
        let origin = resolver(fake, sink).resolve(Path::new("/dl/a.zip"), &AtomicBool::new(false));
        assert_eq!(origin.domain, Domain::Resolved("example".to_string()));
        assert_eq!(origin.raw_url.as_deref(), Some("https://www.example.com/a.zip"));
    }

    #[test]
    fn unknown_download_is_unresolved_and_reported() {
        let fake = Arc::new(FakeHistory::default());
        let sink = Arc::new(CollectingSink::default());
        let origin = resolver(fake, sink.clone()).resolve(Path::new("/dl/x"), &AtomicBool::new(false));
        assert_eq!(origin, ResolvedOrigin::unresolved());
        assert_eq!(origin.domain.as_str(), "unknown_domain");
        assert!(sink.contains("No history entry found"));
    }

    #[test]
    fn retries_while_locked_then_succeeds() {
        let fake = Arc::new(
            FakeHistory::with_url("/dl/a.zip", "https://example.org/")
                .fail_with(vec![LookupError::Locked, LookupError::Locked]),
        );
        let sink = Arc::new(CollectingSink::default());
        let origin = resolver(fake.clone(), sink.clone())
            .resolve(Path::new("/dl/a.zip"), &AtomicBool::new(false));
        assert_eq!(origin.domain, Domain::Resolved("example".to_string()));
        assert_eq!(fake.calls(), 3);
        assert_eq!(
            sink.messages().iter().filter(|m| m.contains("locked")).count(),
            2
        );
    }

    #[test]
    fn gives_up_after_five_locked_attempts() {
        let fake = Arc::new(
            FakeHistory::with_url("/dl/a.zip", "https://example.org/")
                .fail_with((0..10).map(|_| LookupError::Locked).collect()),
        );
        let sink = Arc::new(CollectingSink::default());
        let origin = resolver(fake.clone(), sink.clone())
            .resolve(Path::new("/dl/a.zip"), &AtomicBool::new(false));
        assert_eq!(origin.domain, Domain::Unresolved);
        assert_eq!(fake.calls(), 5);
        assert!(sink.contains("after 5 attempts"));
    }

    #[test]
    fn other_failures_are_terminal() {
        let fake = Arc::new(
            FakeHistory::with_url("/dl/a.zip", "https://example.org/")
                .fail_with(vec![LookupError::Query("no such table: downloads".into())]),
        );
        let sink = Arc::new(CollectingSink::default());
        let origin = resolver(fake.clone(), sink.clone())
            .resolve(Path::new("/dl/a.zip"), &AtomicBool::new(false));
        assert_eq!(origin.domain, Domain::Unresolved);
        assert_eq!(fake.calls(), 1);
        assert!(sink.contains("no such table"));
    }

    #[test]
    fn missing_database_is_reported_not_raised() {
        let fake = Arc::new(FakeHistory::default().fail_with(vec![LookupError::NotFound(
            "browser history database not found".into(),
        )]));
        let sink = Arc::new(CollectingSink::default());
        let origin = resolver(fake, sink.clone()).resolve(Path::new("/dl/a"), &AtomicBool::new(false));
        assert_eq!(origin.domain, Domain::Unresolved);
        assert!(sink.contains("history database not found"));
    }

    #[test]
    fn cancellation_interrupts_backoff() {
        let fake = Arc::new(FakeHistory::default().fail_with(vec![LookupError::Locked]));
        let sink = Arc::new(CollectingSink::default());
        let resolver = DomainResolver::new(
            fake.clone(),
            RetryPolicy {
                max_attempts: 5,
                initial_delay: Duration::from_secs(60),
            },
            sink,
        );
        let origin = resolver.resolve(Path::new("/dl/a"), &AtomicBool::new(true));
        assert_eq!(origin.domain, Domain::Unresolved);
        assert_eq!(fake.calls(), 1);
    }
}
