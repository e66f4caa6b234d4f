use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

pub const HOME_CACHE_TTL: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    expires_at: Instant,
}

/// Rendered-page cache keyed by path and query string. Entries expire
/// on their TTL only; writes elsewhere never invalidate them.
#[derive(Debug, Default)]
pub struct PageCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.body.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().await.remove(key);
        None
    }

    pub async fn set(&self, key: String, body: String, ttl: Duration) {
        let entry = CacheEntry {
            body,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key, entry);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

pub fn cache_key(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    }
}
