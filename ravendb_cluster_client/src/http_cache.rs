use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;

/// Entries kept by [`HttpCache::new`].
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// A response remembered for a read request, keyed by request url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub change_vector: String,
    pub payload: Vec<u8>,
}

/// Change vector keyed response cache shared by all commands of an executor.
///
/// Holds at most `max_entries` responses. Storing a new url when full evicts
/// the oldest stored one.
#[derive(Debug)]
pub struct HttpCache {
    max_entries: usize,
    items: RwLock<CacheItems>,
}

#[derive(Debug, Default)]
struct CacheItems {
    entries: HashMap<String, CachedResponse>,
    insertion_order: VecDeque<String>,
}

impl Default for HttpCache {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl HttpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero disables caching.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries,
            items: RwLock::new(CacheItems::default()),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub async fn get(&self, url: &str) -> Option<CachedResponse> {
        self.items.read().await.entries.get(url).cloned()
    }

    pub async fn set(&self, url: &str, change_vector: String, payload: Vec<u8>) {
        if self.max_entries == 0 {
            return;
        }
        let mut items = self.items.write().await;
        let response = CachedResponse {
            change_vector,
            payload,
        };
        if items.entries.insert(url.to_string(), response).is_some() {
            return;
        }
        items.insertion_order.push_back(url.to_string());
        while items.entries.len() > self.max_entries {
            match items.insertion_order.pop_front() {
                Some(oldest) => {
                    tracing::trace!("Evicting cached response for {}", oldest);
                    items.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub async fn remove(&self, url: &str) {
        let mut items = self.items.write().await;
        if items.entries.remove(url).is_some() {
            items.insertion_order.retain(|key| key != url);
        }
    }

    pub async fn clear(&self) {
        let mut items = self.items.write().await;
        items.entries.clear();
        items.insertion_order.clear();
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.entries.len()
    }
}
