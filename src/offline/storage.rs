//! Version-keyed cache buckets
//!
//! A [`CacheStorage`] holds named [`CacheBucket`]s in creation order. Each
//! bucket maps a request URL to a stored response. When a storage root is
//! configured every bucket is a directory under it and every entry a JSON
//! file named by the SHA-256 of its URL, so cached assets survive restarts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::request::{FetchRequest, FetchResponse, ResponseKind};
use crate::{Error, Result};

/// File listing bucket names in creation order
const INDEX_FILE: &str = "buckets.json";

fn bucket_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static regex"))
}

/// Reject names that cannot safely become a directory
pub(crate) fn validate_bucket_name(name: &str) -> Result<()> {
    if name == "." || name == ".." || !bucket_name_re().is_match(name) {
        return Err(Error::Cache(format!("Invalid cache name '{name}'")));
    }
    Ok(())
}

/// Counters for the fetch strategies
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Requests answered from a bucket
    pub hits: AtomicU64,
    /// GET lookups that found nothing
    pub misses: AtomicU64,
    /// Static requests answered by the network
    pub network_fallbacks: AtomicU64,
    /// Synthesised 503s and offline pages
    pub offline_responses: AtomicU64,
}

impl CacheStats {
    /// Record a served offline response
    pub fn record_offline(&self) {
        self.offline_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a static request answered by the network
    pub fn record_network_fallback(&self) {
        self.network_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Calculate hit rate (0.0-1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Point-in-time copy
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            network_fallbacks: self.network_fallbacks.load(Ordering::Relaxed),
            offline_responses: self.offline_responses.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Serializable copy of [`CacheStats`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStatsSnapshot {
    /// Requests answered from a bucket
    pub hits: u64,
    /// GET lookups that found nothing
    pub misses: u64,
    /// Static requests answered by the network
    pub network_fallbacks: u64,
    /// Synthesised 503s and offline pages
    pub offline_responses: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
}

/// A response as kept in a bucket
#[derive(Debug, Clone)]
struct CachedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: bytes::Bytes,
    cached_at: DateTime<Utc>,
}

impl CachedResponse {
    fn from_response(response: &FetchResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            cached_at: Utc::now(),
        }
    }

    fn to_response(&self) -> FetchResponse {
        FetchResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            kind: ResponseKind::Basic,
        }
    }
}

/// On-disk form of one entry
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    cached_at: DateTime<Utc>,
}

impl StoredEntry {
    fn new(url: &str, cached: &CachedResponse) -> Self {
        Self {
            url: url.to_string(),
            status: cached.status.as_u16(),
            headers: cached
                .headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect(),
            body: STANDARD.encode(&cached.body),
            cached_at: cached.cached_at,
        }
    }

    fn into_cached(self) -> Result<(String, CachedResponse)> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| Error::Cache(format!("Invalid stored status for {}: {e}", self.url)))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<HeaderName>(),
                value.parse::<HeaderValue>(),
            ) {
                headers.append(name, value);
            }
        }
        let body = STANDARD
            .decode(&self.body)
            .map_err(|e| Error::Cache(format!("Invalid stored body for {}: {e}", self.url)))?;

        Ok((
            self.url,
            CachedResponse {
                status,
                headers,
                body: body.into(),
                cached_at: self.cached_at,
            },
        ))
    }
}

/// One named cache generation
pub struct CacheBucket {
    name: String,
    entries: DashMap<String, CachedResponse>,
    dir: Option<PathBuf>,
}

impl CacheBucket {
    fn new(name: &str, dir: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = &dir {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            name: name.to_string(),
            entries: DashMap::new(),
            dir,
        })
    }

    /// Load a persisted bucket; unreadable entries are skipped
    fn load(name: &str, dir: PathBuf) -> Result<Self> {
        let bucket = Self::new(name, Some(dir.clone()))?;

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(Error::from)
                .and_then(|content| serde_json::from_str::<StoredEntry>(&content).map_err(Error::from))
                .and_then(StoredEntry::into_cached);
            match parsed {
                Ok((url, cached)) => {
                    bucket.entries.insert(url, cached);
                }
                Err(e) => warn!(bucket = %name, path = %path.display(), error = %e, "Skipping unreadable cache entry"),
            }
        }

        debug!(bucket = %name, entries = bucket.entries.len(), "Loaded cache bucket");
        Ok(bucket)
    }

    /// Bucket name (the version tag)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored URLs, sorted
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        urls.sort();
        urls
    }

    /// Look up a URL
    pub fn get(&self, url: &str) -> Option<FetchResponse> {
        self.entries.get(url).map(|cached| cached.to_response())
    }

    /// Store a response under `url`, replacing any previous entry
    pub fn put(&self, url: &str, response: &FetchResponse) -> Result<()> {
        let cached = CachedResponse::from_response(response);
        if let Some(dir) = &self.dir {
            write_entry(dir, url, &cached)?;
        }
        self.entries.insert(url.to_string(), cached);
        debug!(bucket = %self.name, url = %url, "Cached response");
        Ok(())
    }
}

fn entry_file_name(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hash = hasher.finalize();
    format!("{hash:x}.json")
}

fn write_entry(dir: &Path, url: &str, cached: &CachedResponse) -> Result<()> {
    let content = serde_json::to_vec_pretty(&StoredEntry::new(url, cached))?;
    write_atomic(dir, &dir.join(entry_file_name(url)), &content)
}

fn write_atomic(dir: &Path, target: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(content)?;
    staged.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Ordered collection of cache buckets
pub struct CacheStorage {
    buckets: RwLock<Vec<Arc<CacheBucket>>>,
    root: Option<PathBuf>,
    stats: CacheStats,
}

impl CacheStorage {
    /// Storage that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            buckets: RwLock::new(Vec::new()),
            root: None,
            stats: CacheStats::default(),
        }
    }

    /// Storage persisted under `root`, reloading whatever is already there
    pub fn persistent(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let mut names: Vec<String> = match fs::read_to_string(root.join(INDEX_FILE)) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        // Directories missing from the index are appended in name order
        let mut unindexed: Vec<String> = fs::read_dir(&root)?
            .filter_map(std::result::Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !names.contains(name))
            .collect();
        unindexed.sort();
        names.extend(unindexed);

        let mut buckets = Vec::with_capacity(names.len());
        for name in names {
            if validate_bucket_name(&name).is_err() {
                warn!(bucket = %name, "Ignoring cache directory with invalid name");
                continue;
            }
            let dir = root.join(&name);
            if !dir.is_dir() {
                continue;
            }
            buckets.push(Arc::new(CacheBucket::load(&name, dir)?));
        }

        info!(root = %root.display(), buckets = buckets.len(), "Opened persistent cache storage");

        let storage = Self {
            buckets: RwLock::new(buckets),
            root: Some(root),
            stats: CacheStats::default(),
        };
        storage.write_index()?;
        Ok(storage)
    }

    /// Open a bucket, creating it if missing
    pub fn open(&self, name: &str) -> Result<Arc<CacheBucket>> {
        if let Some(bucket) = self.find(name) {
            return Ok(bucket);
        }
        validate_bucket_name(name)?;

        let created = {
            let mut buckets = self.buckets.write();
            // Another caller may have created it meanwhile
            if let Some(existing) = buckets.iter().find(|b| b.name == name) {
                return Ok(Arc::clone(existing));
            }
            let bucket = Arc::new(CacheBucket::new(
                name,
                self.root.as_ref().map(|root| root.join(name)),
            )?);
            buckets.push(Arc::clone(&bucket));
            bucket
        };

        self.write_index()?;
        info!(bucket = %name, "Created cache bucket");
        Ok(created)
    }

    /// Store into `name` only if that bucket still exists
    ///
    /// The bucket list stays read-locked for the write, so a concurrent
    /// [`delete`](Self::delete) either runs first (nothing is stored) or
    /// waits and removes the new entry with the bucket. Returns whether the
    /// entry was stored.
    pub fn put_if_present(&self, name: &str, url: &str, response: &FetchResponse) -> Result<bool> {
        let buckets = self.buckets.read();
        let Some(bucket) = buckets.iter().find(|b| b.name == name) else {
            return Ok(false);
        };
        bucket.put(url, response)?;
        Ok(true)
    }

    /// Whether a bucket exists
    pub fn has(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Bucket names in creation order
    pub fn keys(&self) -> Vec<String> {
        self.buckets.read().iter().map(|b| b.name.clone()).collect()
    }

    /// Delete a bucket. Returns whether it existed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let removed = {
            let mut buckets = self.buckets.write();
            let before = buckets.len();
            buckets.retain(|b| b.name != name);
            buckets.len() != before
        };
        if !removed {
            return Ok(false);
        }

        if let Some(root) = &self.root {
            let dir = root.join(name);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            self.write_index()?;
        }
        info!(bucket = %name, "Deleted cache bucket");
        Ok(true)
    }

    /// Find a response for `request` in any bucket, oldest bucket first.
    /// Only GET requests are ever matched.
    pub fn match_request(&self, request: &FetchRequest) -> Option<FetchResponse> {
        if !request.is_get() {
            return None;
        }
        let found = self.match_url(&request.url);
        let counter = if found.is_some() {
            &self.stats.hits
        } else {
            &self.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Find a stored URL in any bucket without touching the statistics
    pub fn match_url(&self, url: &str) -> Option<FetchResponse> {
        self.buckets.read().iter().find_map(|bucket| bucket.get(url))
    }

    /// Strategy counters
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Persistence root, if any
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn find(&self, name: &str) -> Option<Arc<CacheBucket>> {
        self.buckets
            .read()
            .iter()
            .find(|b| b.name == name)
            .map(Arc::clone)
    }

    fn write_index(&self) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let content = serde_json::to_vec_pretty(&self.keys())?;
        write_atomic(root, &root.join(INDEX_FILE), &content)
    }
}
