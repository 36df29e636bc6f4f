//! Temporary deny list keyed by client IP, method and path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::Clock;

#[derive(Clone, Debug, PartialEq, Eq)]
struct BlockEntry {
    method: String,
    path: String,
    /// Unix milliseconds.
    expires_at: i64,
}

impl BlockEntry {
    fn matches(&self, method: &str, path: &str) -> bool {
        self.method.eq_ignore_ascii_case(method) && self.path == path
    }
}

#[derive(Clone)]
pub struct IpBlocker {
    entries: Arc<Mutex<HashMap<String, Vec<BlockEntry>>>>,
    clock: Arc<dyn Clock>,
}

impl IpBlocker {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Block `(ip, method, path)` for `duration`. Entries are appended, never merged.
    pub async fn add(&self, ip: &str, method: &str, path: &str, duration: Duration) {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        let expires_at = self.now_millis().saturating_add(millis);
        self.entries
            .lock()
            .await
            .entry(ip.to_string())
            .or_default()
            .push(BlockEntry {
                method: method.to_string(),
                path: path.to_string(),
                expires_at,
            });
        debug!(ip, method, path, expires_at, "ip blocked");
    }

    pub async fn is_blocked(&self, ip: &str, method: &str, path: &str) -> bool {
        let now = self.now_millis();
        self.entries.lock().await.get(ip).is_some_and(|entries| {
            entries
                .iter()
                .any(|entry| entry.expires_at > now && entry.matches(method, path))
        })
    }

    /// Drop every expired entry and every IP left without entries.
    /// Returns the number of entries removed.
    pub async fn remove_expired(&self) -> usize {
        let now = self.now_millis();
        let mut entries = self.entries.lock().await;
        let mut removed = 0;
        entries.retain(|_, list| {
            let before = list.len();
            list.retain(|entry| entry.expires_at > now);
            removed += before - list.len();
            !list.is_empty()
        });
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let blocker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = blocker.remove_expired().await;
                if removed > 0 {
                    debug!(removed, "expired ip blocks swept");
                }
            }
        })
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}
