//! Grid-keyed response cache.
//!
//! Consolidated responses are cached per geographic grid cell (coordinates
//! rounded to three decimals, ~111 m at the equator) so nearby requests
//! coalesce onto one entry. When geocoding failed and only a raw address is
//! known, a hash of the normalized address stands in for the cell.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::types::{Category, RecommendationResponse};

const KEY_PREFIX: &str = "rec:v1";

/// Grid precision used by the canonical key format.
pub const DEFAULT_GRID_PRECISION: u32 = 3;

// =============================================================================
// KEY BUILDER
// =============================================================================

/// Render one coordinate for the cache key: rounded to `precision` decimals
/// half-away-from-zero, exactly `precision` fraction digits, no negative zero.
fn format_coord(value: f64, precision: u32) -> String {
    let scale = 10f64.powi(precision as i32);
    let scaled = value * scale;
    let rounded = if scaled >= 0.0 {
        (scaled + 0.5).floor()
    } else {
        (scaled - 0.5).ceil()
    } as i64;

    let sign = if rounded < 0 { "-" } else { "" };
    let magnitude = rounded.unsigned_abs();
    let unit = scale as u64;
    format!(
        "{sign}{}.{:0width$}",
        magnitude / unit,
        magnitude % unit,
        width = precision as usize
    )
}

fn category_part(categories: &[Category]) -> String {
    match categories {
        [single] => single.name().to_string(),
        _ => {
            let mut names: Vec<&str> = categories.iter().map(Category::name).collect();
            names.sort_unstable();
            names.dedup();
            names.join("+")
        }
    }
}

/// Coordinate-mode key: `rec:v1:{lat}:{lng}:{catPart}`.
pub fn coordinate_cache_key(lat: f64, lng: f64, categories: &[Category], precision: u32) -> String {
    format!(
        "{KEY_PREFIX}:{}:{}:{}",
        format_coord(lat, precision),
        format_coord(lng, precision),
        category_part(categories)
    )
}

/// Address-mode key (geocoding unavailable): `rec:v1:addr:{h16}:{cat}` where
/// `h16` is the first 16 uppercase hex chars of SHA-256 over the lowercased,
/// trimmed address.
pub fn address_cache_key(address: &str, categories: &[Category]) -> String {
    let normalized = address.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    let hex: String = digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02X}"))
        .collect();
    let cat = match categories {
        [single] => single.name(),
        _ => Category::All.name(),
    };
    format!("{KEY_PREFIX}:addr:{hex}:{cat}")
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

/// Advisory statistics over the cache table.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub earliest_created_at: Option<i64>,
    pub latest_created_at: Option<i64>,
}

/// Key/value store with TTL for consolidated responses.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Fetch a live entry; expired rows read as misses. Hits bump the
    /// advisory hit_count and last_accessed_at columns.
    async fn get(&self, key: &str) -> Result<Option<RecommendationResponse>, CacheError>;

    /// Upsert with an expiry `ttl` from now. Last writer wins per key.
    async fn put(
        &self,
        key: &str,
        response: &RecommendationResponse,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Delete expired rows, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, CacheError>;

    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// SQLite-backed implementation. Connections are serialized behind a mutex
/// and all queries run on the blocking pool.
#[derive(Clone)]
pub struct SqliteResponseCache {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteResponseCache {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private in-memory store, used by tests and the CLI dry-run mode.
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), CacheError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             CREATE TABLE IF NOT EXISTS response_cache (\
               cache_key TEXT PRIMARY KEY,\
               payload TEXT NOT NULL,\
               created_at INTEGER NOT NULL,\
               expires_at INTEGER NOT NULL,\
               hit_count INTEGER NOT NULL DEFAULT 0,\
               last_accessed_at INTEGER\
             );",
        )?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Connection) -> Result<R, CacheError>,
    {
        let guard = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        f(&guard)
    }
}

fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

#[async_trait]
impl ResponseCache for SqliteResponseCache {
    async fn get(&self, key: &str) -> Result<Option<RecommendationResponse>, CacheError> {
        let key = key.to_string();
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let now = now_epoch();
                let mut stmt = conn.prepare(
                    "SELECT payload FROM response_cache \
                     WHERE cache_key = ?1 AND expires_at > ?2",
                )?;
                let mut rows = stmt.query(params![key, now])?;
                let Some(row) = rows.next()? else {
                    return Ok(None);
                };
                let payload: String = row.get(0)?;
                let response: RecommendationResponse = serde_json::from_str(&payload)
                    .map_err(|e| CacheError::Serde(e.to_string()))?;
                conn.execute(
                    "UPDATE response_cache \
                     SET hit_count = hit_count + 1, last_accessed_at = ?1 \
                     WHERE cache_key = ?2",
                    params![now, key],
                )?;
                Ok(Some(response))
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    async fn put(
        &self,
        key: &str,
        response: &RecommendationResponse,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = key.to_string();
        let payload =
            serde_json::to_string(response).map_err(|e| CacheError::Serde(e.to_string()))?;
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let now = now_epoch();
                let expires_at = now + ttl.as_secs() as i64;
                conn.execute(
                    "INSERT INTO response_cache (cache_key, payload, created_at, expires_at) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(cache_key) DO UPDATE SET \
                        payload = excluded.payload,\
                        created_at = excluded.created_at,\
                        expires_at = excluded.expires_at",
                    params![key, payload, now, expires_at],
                )?;
                Ok(())
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let removed = conn.execute(
                    "DELETE FROM response_cache WHERE expires_at <= ?1",
                    params![now_epoch()],
                )?;
                Ok(removed)
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let (entry_count, earliest, latest): (i64, Option<i64>, Option<i64>) = conn
                    .query_row(
                        "SELECT COUNT(*), MIN(created_at), MAX(created_at) FROM response_cache",
                        [],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )?;
                Ok(CacheStats {
                    entry_count: entry_count.max(0) as usize,
                    earliest_created_at: earliest,
                    latest_created_at: latest,
                })
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseMetadata;

    fn response() -> RecommendationResponse {
        RecommendationResponse {
            lat: 43.477,
            lng: -79.76,
            resolved_address: Some("Oakville".to_string()),
            category: Category::Restaurant,
            categories: vec![Category::Restaurant],
            recommendations: Vec::new(),
            metadata: ResponseMetadata::default(),
            from_cache: false,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn coordinate_key_format() {
        let key = coordinate_cache_key(43.4769, -79.7596, &[Category::Restaurant], 3);
        assert_eq!(key, "rec:v1:43.477:-79.760:Restaurant");
    }

    #[test]
    fn coordinate_key_half_away_from_zero() {
        assert_eq!(format_coord(1.2345, 3), "1.235");
        assert_eq!(format_coord(-1.2345, 3), "-1.235");
        assert_eq!(format_coord(0.0005, 3), "0.001");
        assert_eq!(format_coord(-0.0004, 3), "0.000");
        assert_eq!(format_coord(43.0, 3), "43.000");
    }

    #[test]
    fn coordinate_key_sorts_categories() {
        let ab = coordinate_cache_key(1.0, 2.0, &[Category::Bar, Category::Cafe], 3);
        let ba = coordinate_cache_key(1.0, 2.0, &[Category::Cafe, Category::Bar], 3);
        assert_eq!(ab, ba);
        assert_eq!(ab, "rec:v1:1.000:2.000:Bar+Cafe");
    }

    #[test]
    fn address_key_hashes_normalized_address() {
        let a = address_cache_key("  Nowhereville ", &[Category::All]);
        let b = address_cache_key("nowhereville", &[Category::All]);
        assert_eq!(a, b);
        assert!(a.starts_with("rec:v1:addr:"));
        assert!(a.ends_with(":All"));
        let hex = a.split(':').nth(3).unwrap();
        assert_eq!(hex.len(), 16);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hex, hex.to_uppercase());
    }

    #[test]
    fn address_key_multi_category_collapses_to_all() {
        let key = address_cache_key("x", &[Category::Bar, Category::Cafe]);
        assert!(key.ends_with(":All"));
        let single = address_cache_key("x", &[Category::Bar]);
        assert!(single.ends_with(":Bar"));
    }

    #[tokio::test]
    async fn put_get_roundtrip_and_expiry() {
        let cache = SqliteResponseCache::in_memory().unwrap();
        let key = "rec:v1:1.000:2.000:All";

        assert!(cache.get(key).await.unwrap().is_none());

        cache
            .put(key, &response(), Duration::from_secs(3600))
            .await
            .unwrap();
        let hit = cache.get(key).await.unwrap().unwrap();
        assert_eq!(hit.resolved_address.as_deref(), Some("Oakville"));

        // Zero TTL rows are already expired.
        cache
            .put(key, &response(), Duration::from_secs(0))
            .await
            .unwrap();
        assert!(cache.get(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let cache = SqliteResponseCache::in_memory().unwrap();
        cache
            .put("live", &response(), Duration::from_secs(3600))
            .await
            .unwrap();
        cache
            .put("dead", &response(), Duration::from_secs(0))
            .await
            .unwrap();

        let removed = cache.purge_expired().await.unwrap();
        assert_eq!(removed, 1);
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn stats_track_created_range() {
        let cache = SqliteResponseCache::in_memory().unwrap();
        assert_eq!(cache.stats().await.unwrap().entry_count, 0);
        cache
            .put("a", &response(), Duration::from_secs(60))
            .await
            .unwrap();
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entry_count, 1);
        assert!(stats.earliest_created_at.is_some());
    }
}
