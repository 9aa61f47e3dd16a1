//! Content-addressed cache with TTL + LRU eviction, backed by either an on-disk SQLite store
//! or an in-process map.
//!
//! `rusqlite::Connection` is `!Send`, so the durable backend owns its connection exclusively on
//! one `spawn_blocking` worker thread and communicates via an `mpsc` command channel paired
//! with per-call `oneshot` responses, mirroring this codebase's other worker-confined,
//! non-`Send` storage handles. The Cache is never a process-wide singleton: it is constructed
//! once by the Orchestrator and shared via `Arc` to whichever components need it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::models::cache_entry::{CacheEntry, CacheStats};

const DEFAULT_MAX_SIZE_BYTES: u64 = 64 * 1024 * 1024;

/// Computes the content-addressed cache key: lowercase hex SHA-256 of `content`, with
/// `"{prefix}:"` prepended if non-empty.
pub fn cache_key(content: &str, prefix: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}:{hex}"),
        _ => hex,
    }
}

fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

enum Command {
    Get {
        key: String,
        resp: oneshot::Sender<Option<CacheEntry>>,
    },
    Store {
        entry: CacheEntry,
        max_size_bytes: u64,
        resp: oneshot::Sender<()>,
    },
    Invalidate {
        key: String,
        resp: oneshot::Sender<()>,
    },
    ClearAll {
        resp: oneshot::Sender<()>,
    },
    CleanupExpired {
        resp: oneshot::Sender<u64>,
    },
    Stats {
        resp: oneshot::Sender<CacheStats>,
    },
}

/// Content-addressed cache. Safe for concurrent callers.
pub struct Cache {
    backend: Backend,
    max_size_bytes: u64,
}

enum Backend {
    Durable { tx: mpsc::Sender<Command> },
    Memory { store: Mutex<MemoryStore> },
}

#[derive(Default)]
struct MemoryStore {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl Cache {
    /// Attempts to open a durable (SQLite) cache rooted at `dir`. Falls back to an in-memory
    /// cache if the durable backend cannot be initialized, per §4.1's failure model.
    pub async fn open(dir: &std::path::Path, max_size_bytes: Option<u64>) -> Self {
        let max_size_bytes = max_size_bytes.unwrap_or(DEFAULT_MAX_SIZE_BYTES);
        match start_worker(dir.join("cache.sqlite3")).await {
            Ok(tx) => {
                debug!(path = %dir.display(), "opened durable cache backend");
                Self {
                    backend: Backend::Durable { tx },
                    max_size_bytes,
                }
            }
            Err(err) => {
                warn!(error = %err, "durable cache backend unavailable, falling back to memory");
                Self::memory(Some(max_size_bytes))
            }
        }
    }

    pub fn memory(max_size_bytes: Option<u64>) -> Self {
        Self {
            backend: Backend::Memory {
                store: Mutex::new(MemoryStore::default()),
            },
            max_size_bytes: max_size_bytes.unwrap_or(DEFAULT_MAX_SIZE_BYTES),
        }
    }

    pub fn key(&self, content: &str, prefix: Option<&str>) -> String {
        cache_key(content, prefix)
    }

    /// Returns the stored value iff present and unexpired. On a hit, atomically bumps
    /// `hit_count`/`last_accessed`. Any backend failure degrades to a miss, never an error.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = now_epoch();
        match &self.backend {
            Backend::Memory { store } => {
                let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(entry) = store.entries.get_mut(key) {
                    if entry.is_expired(now) {
                        store.misses += 1;
                        return None;
                    }
                    entry.touch(now);
                    store.hits += 1;
                    return Some(entry.value.clone());
                }
                store.misses += 1;
                None
            }
            Backend::Durable { tx } => {
                let (resp, rx) = oneshot::channel();
                if tx.send(Command::Get { key: key.to_string(), resp }).await.is_err() {
                    warn!("cache worker unavailable on get");
                    return None;
                }
                match rx.await {
                    Ok(Some(entry)) if !entry.is_expired(now) => Some(entry.value),
                    _ => None,
                }
            }
        }
    }

    /// Inserts or replaces `key`, resetting `hit_count` to zero. If the resulting total size
    /// would exceed the ceiling, evicts by ascending `last_accessed` until there's room.
    pub async fn store(&self, key: &str, value: Value, ttl_hours: f64) {
        let now = now_epoch();
        let ttl_seconds = (ttl_hours * 3600.0) as i64;
        let entry = CacheEntry::new(key, value, now, ttl_seconds.max(1));

        match &self.backend {
            Backend::Memory { store } => {
                let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
                store.entries.insert(key.to_string(), entry);
                evict_over_capacity(&mut store.entries, self.max_size_bytes);
            }
            Backend::Durable { tx } => {
                let (resp, rx) = oneshot::channel();
                if tx
                    .send(Command::Store {
                        entry,
                        max_size_bytes: self.max_size_bytes,
                        resp,
                    })
                    .await
                    .is_err()
                {
                    warn!("cache worker unavailable on store");
                    return;
                }
                let _ = rx.await;
            }
        }
    }

    pub async fn invalidate(&self, key: &str) {
        match &self.backend {
            Backend::Memory { store } => {
                store.lock().unwrap_or_else(|e| e.into_inner()).entries.remove(key);
            }
            Backend::Durable { tx } => {
                let (resp, rx) = oneshot::channel();
                if tx.send(Command::Invalidate { key: key.to_string(), resp }).await.is_ok() {
                    let _ = rx.await;
                }
            }
        }
    }

    pub async fn clear_all(&self) {
        match &self.backend {
            Backend::Memory { store } => {
                let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
                store.entries.clear();
                store.hits = 0;
                store.misses = 0;
            }
            Backend::Durable { tx } => {
                let (resp, rx) = oneshot::channel();
                if tx.send(Command::ClearAll { resp }).await.is_ok() {
                    let _ = rx.await;
                }
            }
        }
    }

    /// Deletes every expired entry, returning the count removed.
    pub async fn cleanup_expired(&self) -> u64 {
        let now = now_epoch();
        match &self.backend {
            Backend::Memory { store } => {
                let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
                let before = store.entries.len();
                store.entries.retain(|_, entry| !entry.is_expired(now));
                (before - store.entries.len()) as u64
            }
            Backend::Durable { tx } => {
                let (resp, rx) = oneshot::channel();
                if tx.send(Command::CleanupExpired { resp }).await.is_err() {
                    return 0;
                }
                rx.await.unwrap_or(0)
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let now = now_epoch();
        match &self.backend {
            Backend::Memory { store } => {
                let store = store.lock().unwrap_or_else(|e| e.into_inner());
                let expired = store.entries.values().filter(|e| e.is_expired(now)).count() as u64;
                CacheStats {
                    backend: "memory".to_string(),
                    total_entries: store.entries.len() as u64,
                    expired_entries: expired,
                    total_size_bytes: store.entries.values().map(|e| e.size_bytes).sum(),
                    hits: store.hits,
                    misses: store.misses,
                }
            }
            Backend::Durable { tx } => {
                let (resp, rx) = oneshot::channel();
                if tx.send(Command::Stats { resp }).await.is_err() {
                    return CacheStats { backend: "durable".to_string(), ..Default::default() };
                }
                rx.await.unwrap_or_default()
            }
        }
    }
}

fn evict_over_capacity(entries: &mut HashMap<String, CacheEntry>, max_size_bytes: u64) {
    let mut total: u64 = entries.values().map(|e| e.size_bytes).sum();
    if total <= max_size_bytes {
        return;
    }
    let mut by_access: Vec<(String, i64)> = entries.iter().map(|(k, v)| (k.clone(), v.last_accessed)).collect();
    by_access.sort_by_key(|(_, last_accessed)| *last_accessed);
    for (key, _) in by_access {
        if total <= max_size_bytes {
            break;
        }
        if let Some(removed) = entries.remove(&key) {
            total -= removed.size_bytes;
        }
    }
}

async fn start_worker(path: PathBuf) -> Result<mpsc::Sender<Command>, String> {
    let (tx, mut rx) = mpsc::channel::<Command>(128);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

    tokio::task::spawn_blocking(move || {
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                let _ = ready_tx.send(Err(err.to_string()));
                return;
            }
        }

        let conn = match rusqlite::Connection::open(&path) {
            Ok(conn) => conn,
            Err(err) => {
                let _ = ready_tx.send(Err(err.to_string()));
                return;
            }
        };

        if let Err(err) = conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                hit_count INTEGER NOT NULL,
                last_accessed INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_expires_at ON cache_entries(expires_at);
            CREATE INDEX IF NOT EXISTS idx_cache_last_accessed ON cache_entries(last_accessed);
            "#,
        ) {
            let _ = ready_tx.send(Err(err.to_string()));
            return;
        }

        let _ = ready_tx.send(Ok(()));

        while let Some(cmd) = rx.blocking_recv() {
            handle_command(&conn, cmd);
        }
    });

    match ready_rx.await {
        Ok(Ok(())) => Ok(tx),
        Ok(Err(err)) => Err(err),
        Err(_) => Err("worker thread dropped before initializing".to_string()),
    }
}

fn handle_command(conn: &rusqlite::Connection, cmd: Command) {
    match cmd {
        Command::Get { key, resp } => {
            let entry = fetch_entry(conn, &key);
            if let Some(ref entry) = entry {
                let now = now_epoch();
                if !entry.is_expired(now) {
                    let _ = conn.execute(
                        "UPDATE cache_entries SET hit_count = hit_count + 1, last_accessed = ?1 WHERE key = ?2",
                        rusqlite::params![now, key],
                    );
                }
            }
            let _ = resp.send(entry);
        }
        Command::Store { entry, max_size_bytes, resp } => {
            let _ = conn.execute(
                "INSERT OR REPLACE INTO cache_entries
                 (key, value, created_at, expires_at, hit_count, last_accessed, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
                rusqlite::params![
                    entry.key,
                    entry.value.to_string(),
                    entry.created_at,
                    entry.expires_at,
                    entry.last_accessed,
                    entry.size_bytes as i64,
                ],
            );
            evict_durable_over_capacity(conn, max_size_bytes);
            let _ = resp.send(());
        }
        Command::Invalidate { key, resp } => {
            let _ = conn.execute("DELETE FROM cache_entries WHERE key = ?1", [key]);
            let _ = resp.send(());
        }
        Command::ClearAll { resp } => {
            let _ = conn.execute("DELETE FROM cache_entries", []);
            let _ = resp.send(());
        }
        Command::CleanupExpired { resp } => {
            let now = now_epoch();
            let removed = conn
                .execute("DELETE FROM cache_entries WHERE expires_at <= ?1", [now])
                .unwrap_or(0);
            let _ = resp.send(removed as u64);
        }
        Command::Stats { resp } => {
            let now = now_epoch();
            let total_entries: i64 = conn
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))
                .unwrap_or(0);
            let expired_entries: i64 = conn
                .query_row("SELECT COUNT(*) FROM cache_entries WHERE expires_at <= ?1", [now], |r| r.get(0))
                .unwrap_or(0);
            let total_size_bytes: i64 = conn
                .query_row("SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries", [], |r| r.get(0))
                .unwrap_or(0);
            let _ = resp.send(CacheStats {
                backend: "durable".to_string(),
                total_entries: total_entries as u64,
                expired_entries: expired_entries as u64,
                total_size_bytes: total_size_bytes as u64,
                hits: 0,
                misses: 0,
            });
        }
    }
}

fn fetch_entry(conn: &rusqlite::Connection, key: &str) -> Option<CacheEntry> {
    conn.query_row(
        "SELECT key, value, created_at, expires_at, hit_count, last_accessed, size_bytes
         FROM cache_entries WHERE key = ?1",
        [key],
        |row| {
            let raw_value: String = row.get(1)?;
            Ok(CacheEntry {
                key: row.get(0)?,
                value: serde_json::from_str(&raw_value).unwrap_or(Value::Null),
                created_at: row.get(2)?,
                expires_at: row.get(3)?,
                hit_count: row.get::<_, i64>(4)? as u64,
                last_accessed: row.get(5)?,
                size_bytes: row.get::<_, i64>(6)? as u64,
            })
        },
    )
    .ok()
}

fn evict_durable_over_capacity(conn: &rusqlite::Connection, max_size_bytes: u64) {
    let total: i64 = conn
        .query_row("SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries", [], |r| r.get(0))
        .unwrap_or(0);
    let mut remaining = total as u64;
    if remaining <= max_size_bytes {
        return;
    }

    let mut stmt = match conn.prepare("SELECT key, size_bytes FROM cache_entries ORDER BY last_accessed ASC") {
        Ok(stmt) => stmt,
        Err(_) => return,
    };
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))
        .ok();
    let Some(rows) = rows else { return };

    for row in rows.flatten() {
        if remaining <= max_size_bytes {
            break;
        }
        let (key, size) = row;
        if conn.execute("DELETE FROM cache_entries WHERE key = ?1", [&key]).is_ok() {
            remaining = remaining.saturating_sub(size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_stability_and_uniqueness() {
        assert_eq!(cache_key("hello", None), cache_key("hello", None));
        assert_ne!(cache_key("hello", None), cache_key("world", None));

        let hex = cache_key("hello", None);
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_cache_key_prefix() {
        let key = cache_key("hello", Some("llm_python"));
        assert!(key.starts_with("llm_python:"));
    }

    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        let cache = Cache::memory(None);
        cache.store("k", serde_json::json!({"v": 1}), 1.0).await;
        let value = cache.get("k").await;
        assert_eq!(value, Some(serde_json::json!({"v": 1})));
    }

    #[tokio::test]
    async fn test_memory_cache_miss_on_unknown_key() {
        let cache = Cache::memory(None);
        assert_eq!(cache.get("nope").await, None);
    }

    #[tokio::test]
    async fn test_memory_cache_invalidate() {
        let cache = Cache::memory(None);
        cache.store("k", serde_json::json!("v"), 1.0).await;
        cache.invalidate("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_memory_cache_lru_eviction() {
        let cache = Cache::memory(Some(10));
        cache.store("a", serde_json::json!("xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx"), 10.0).await;
        cache.store("b", serde_json::json!("yyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyy"), 10.0).await;
        let stats = cache.stats().await;
        assert!(stats.total_size_bytes <= 10 || stats.total_entries <= 1);
    }

    #[tokio::test]
    async fn test_durable_backend_falls_back_on_bad_path() {
        // An unwritable path (a file masquerading as a directory) should force the memory
        // fallback rather than panicking.
        let bogus_parent = tempfile::NamedTempFile::new().unwrap();
        let bogus_dir = bogus_parent.path().join("nested");
        let cache = Cache::open(&bogus_dir, None).await;
        // Falls back to memory; basic operations must still work.
        cache.store("k", serde_json::json!("v"), 1.0).await;
        assert_eq!(cache.get("k").await, Some(serde_json::json!("v")));
    }
}
