use serde::{Deserialize, Serialize};

/// A single stored cache record.
///
/// Invariants: `expires_at > created_at`; the sum of `size_bytes` across all entries in a
/// backend never exceeds that backend's configured ceiling after a `store` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: i64,
    pub expires_at: i64,
    pub hit_count: u64,
    pub last_accessed: i64,
    pub size_bytes: u64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: serde_json::Value, created_at: i64, ttl_seconds: i64) -> Self {
        let size_bytes = value.to_string().len() as u64;
        Self {
            key: key.into(),
            value,
            created_at,
            expires_at: created_at + ttl_seconds,
            hit_count: 0,
            last_accessed: created_at,
            size_bytes,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    pub fn touch(&mut self, now: i64) {
        self.hit_count += 1;
        self.last_accessed = now;
    }
}

/// Aggregate stats returned by `Cache::stats()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub backend: String,
    pub total_entries: u64,
    pub expired_entries: u64,
    pub total_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            total_entries: 0,
            expired_entries: 0,
            total_size_bytes: 0,
            hits: 0,
            misses: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry() {
        let entry = CacheEntry::new("k", serde_json::json!("v"), 1_000, 10);
        assert_eq!(entry.expires_at, 1_010);
        assert!(!entry.is_expired(1_005));
        assert!(entry.is_expired(1_010));
        assert!(entry.is_expired(1_011));
    }

    #[test]
    fn test_touch_updates_stats() {
        let mut entry = CacheEntry::new("k", serde_json::json!("v"), 1_000, 10);
        entry.touch(1_002);
        assert_eq!(entry.hit_count, 1);
        assert_eq!(entry.last_accessed, 1_002);
    }
}
