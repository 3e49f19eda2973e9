use super::{CacheEntry, CacheStore, EntryPredicate, StoreReport};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

/// Records smaller than this are written as plain JSON.
const COMPRESSION_FLOOR: usize = 1024;

/// Keep the gzip form only when it is below this fraction of the JSON.
const MAX_COMPRESSED_RATIO: f64 = 0.8;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// On-disk form of a cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    key: String,
    content: String,
    file_count: usize,
    total_bytes: u64,
    created_at: DateTime<Utc>,
    last_access_at: DateTime<Utc>,
}

impl From<&CacheEntry> for DiskRecord {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            content: entry.content.to_string(),
            file_count: entry.file_count,
            total_bytes: entry.total_bytes,
            created_at: entry.created_at,
            last_access_at: entry.last_access_at,
        }
    }
}

impl From<DiskRecord> for CacheEntry {
    fn from(record: DiskRecord) -> Self {
        Self {
            key: record.key,
            content: Arc::from(record.content),
            file_count: record.file_count,
            total_bytes: record.total_bytes,
            created_at: record.created_at,
            last_access_at: record.last_access_at,
        }
    }
}

/// Serialize a record, gzipping it when that saves enough space.
fn encode(record: &DiskRecord) -> io::Result<Vec<u8>> {
    let json = serde_json::to_vec(record)?;
    if json.len() < COMPRESSION_FLOOR {
        return Ok(json);
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
    encoder.write_all(&json)?;
    let packed = encoder.finish()?;

    if (packed.len() as f64) < json.len() as f64 * MAX_COMPRESSED_RATIO {
        Ok(packed)
    } else {
        Ok(json)
    }
}

fn decode(bytes: &[u8]) -> io::Result<DiskRecord> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut json = Vec::with_capacity(bytes.len() * 4);
        GzDecoder::new(bytes).read_to_end(&mut json)?;
        Ok(serde_json::from_slice(&json)?)
    } else {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Disk tier: one file per entry, named by the SHA-256 of its key.
///
/// Files hold the entry as JSON, gzipped when the record is large and
/// compresses well. Writes go to a temporary file that is renamed into
/// place. After every write the directory is pruned: files older than
/// the TTL go first, then the oldest files until the total size fits
/// `budget_bytes`.
pub struct DiskStore {
    dir: PathBuf,
    budget_bytes: u64,
    ttl: Duration,
    write_seq: AtomicU64,
}

impl DiskStore {
    pub fn new(dir: PathBuf, budget_bytes: u64, ttl: Duration) -> Self {
        Self {
            dir,
            budget_bytes,
            ttl,
            write_seq: AtomicU64::new(0),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.entry", hex::encode(digest)))
    }

    async fn read_record(path: &Path) -> Result<Option<DiskRecord>, EngineError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_io(path, e)),
        };
        decode(&bytes).map(Some).map_err(|e| cache_io(path, e))
    }

    /// Every `*.entry` file in the cache directory.
    async fn entry_files(&self) -> Result<Vec<PathBuf>, EngineError> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(cache_io(&self.dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| cache_io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("entry") {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Drop expired files, then the oldest ones while over budget.
    /// `keep` is the file just written and is never evicted.
    async fn prune(&self, keep: &Path) -> Result<StoreReport, EngineError> {
        let now = Utc::now();
        let mut report = StoreReport::default();
        let mut live = Vec::new();
        let mut total: u64 = 0;

        for path in self.entry_files().await? {
            let meta = match fs::metadata(&path).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Could not stat {}: {}", path.display(), e);
                    continue;
                }
            };
            let written = meta.modified().map(DateTime::<Utc>::from).unwrap_or(now);

            if path != keep && now.signed_duration_since(written) > self.ttl {
                if remove_file_quietly(&path).await {
                    report.expired += 1;
                }
                continue;
            }
            total += meta.len();
            live.push((written, path, meta.len()));
        }

        live.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, path, len) in live {
            if total <= self.budget_bytes {
                break;
            }
            if path == keep {
                continue;
            }
            if remove_file_quietly(&path).await {
                total -= len;
                report.evicted += 1;
            }
        }

        if report.expired + report.evicted > 0 {
            debug!(
                "Disk cache pruned: {} expired, {} evicted, {} bytes kept",
                report.expired, report.evicted, total
            );
        }
        Ok(report)
    }
}

async fn remove_file_quietly(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Could not remove {}: {}", path.display(), e);
            false
        }
    }
}

fn cache_io(path: &Path, err: impl std::fmt::Display) -> EngineError {
    EngineError::CacheIo(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl CacheStore for DiskStore {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn load(&self, key: &str) -> Result<Option<Arc<CacheEntry>>, EngineError> {
        let record = Self::read_record(&self.path_for(key)).await?;
        // A hash collision would surface as a different key
        Ok(record
            .filter(|record| record.key == key)
            .map(|record| Arc::new(CacheEntry::from(record))))
    }

    async fn save(&self, entry: Arc<CacheEntry>) -> Result<StoreReport, EngineError> {
        let target = self.path_for(&entry.key);
        let bytes = encode(&DiskRecord::from(entry.as_ref())).map_err(|e| cache_io(&target, e))?;
        if bytes.len() as u64 > self.budget_bytes {
            return Ok(StoreReport::default());
        }

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| cache_io(&self.dir, e))?;

        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let temp = target.with_extension(format!("tmp.{}.{}", std::process::id(), seq));

        fs::write(&temp, bytes).await.map_err(|e| cache_io(&temp, e))?;
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(cache_io(&target, e));
        }

        let report = match self.prune(&target).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Disk cache prune failed: {}", e);
                StoreReport::default()
            }
        };
        Ok(StoreReport {
            stored: true,
            ..report
        })
    }

    async fn remove(&self, key: &str) -> Result<bool, EngineError> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(cache_io(&path, e)),
        }
    }

    async fn remove_where(&self, predicate: &EntryPredicate) -> Result<usize, EngineError> {
        let mut removed = 0;
        for path in self.entry_files().await? {
            let record = match Self::read_record(&path).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping unreadable cache file: {}", e);
                    continue;
                }
            };
            let entry = CacheEntry::from(record);
            if predicate(&entry) && remove_file_quietly(&path).await {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn len(&self) -> usize {
        match self.entry_files().await {
            Ok(files) => files.len(),
            Err(e) => {
                warn!("Could not count disk cache entries: {}", e);
                0
            }
        }
    }
}
