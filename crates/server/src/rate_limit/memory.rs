use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;
use voicetranscript_common::Result;

use super::RateLimitStore;

#[derive(Debug, Clone, Copy)]
struct Window {
    window_id: u64,
    count: u64,
}

/// In-process fixed-window counters, one entry per client key
#[derive(Debug, Default)]
pub struct MemoryStore {
    windows: DashMap<String, Window>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request for `key` in `window_id` and return the new count.
    ///
    /// The entry's shard lock is held for the whole read-modify-write.
    pub fn hit(&self, key: &str, window_id: u64) -> u64 {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(Window { window_id, count: 0 });

        if entry.window_id != window_id {
            entry.window_id = window_id;
            entry.count = 0;
        }
        entry.count += 1;
        entry.count
    }

    /// Drop every entry whose window is older than `current_window`
    pub fn sweep(&self, current_window: u64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| w.window_id >= current_window);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!("Swept {} stale rate limit windows", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn increment(&self, key: &str, window_id: u64, _ttl: Duration) -> Result<u64> {
        Ok(self.hit(key, window_id))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counts_within_window_and_resets_on_new_window() {
        let store = MemoryStore::new();
        assert_eq!(store.hit("a", 10), 1);
        assert_eq!(store.hit("a", 10), 2);
        assert_eq!(store.hit("b", 10), 1);
        assert_eq!(store.hit("a", 11), 1);
    }

    #[test]
    fn test_sweep_removes_stale_windows() {
        let store = MemoryStore::new();
        store.hit("old", 1);
        store.hit("current", 2);

        assert_eq!(store.sweep(2), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.hit("current", 2), 2);
    }

    #[test]
    fn test_concurrent_hits_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.hit("shared", 7);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.hit("shared", 7), 801);
    }
}
