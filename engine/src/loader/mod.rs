//! Concurrent File Loader
//!
//! Enumerates and reads files under a root with bounded concurrency and hard
//! limits. Every file goes through the `SecurityGate` before it is read, and
//! every failure is collected instead of aborting the batch.
//!
//! Enumeration is depth-first with directory entries sorted by name, so the
//! set kept under the file cap is the same on every run and every platform.

use crate::config::LoaderConfig;
use crate::fs_guard::{AccessMode, SecurityGate};
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// A file that was read successfully.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub content: String,
    pub size: u64,
}

/// A file (or directory) that could not be loaded, and why.
#[derive(Debug, Clone)]
pub struct LoadError {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a load.
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    /// Successfully read files, sorted by path
    pub files: Vec<LoadedFile>,
    /// Per-file failures (security rejections, I/O errors)
    pub errors: Vec<LoadError>,
    /// Eligible files seen during enumeration
    pub enumerated: usize,
    /// Eligible files left out because of the file cap
    pub dropped: usize,
    /// Files skipped by the extension pre-filter
    pub skipped: usize,
}

impl LoadResult {
    pub fn truncated(&self) -> bool {
        self.dropped > 0
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Reads files under a root with a bounded worker pool.
pub struct ConcurrentFileLoader {
    gate: Arc<SecurityGate>,
    config: LoaderConfig,
    loads: AtomicUsize,
}

impl ConcurrentFileLoader {
    pub fn new(gate: Arc<SecurityGate>, config: LoaderConfig) -> Self {
        Self {
            gate,
            config,
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of `load_files` calls so far.
    pub fn loads_performed(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Load a single file or every eligible file below a directory.
    ///
    /// Never fails as a whole: a rejected root shows up as the only entry in
    /// `errors`.
    pub async fn load_files(&self, root: &Path) -> LoadResult {
        self.loads.fetch_add(1, Ordering::Relaxed);

        let validation = self.gate.validate(root, AccessMode::Read);
        let resolved = match (validation.ok, validation.resolved_path) {
            (true, Some(resolved)) => resolved,
            _ => {
                let reason = validation
                    .violations
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                return LoadResult {
                    errors: vec![LoadError {
                        path: root.to_path_buf(),
                        reason,
                    }],
                    ..LoadResult::default()
                };
            }
        };

        let is_dir = match fs::metadata(&resolved).await {
            Ok(meta) => meta.is_dir(),
            Err(e) => {
                return LoadResult {
                    errors: vec![LoadError {
                        path: resolved,
                        reason: e.to_string(),
                    }],
                    ..LoadResult::default()
                };
            }
        };

        if !is_dir {
            let mut result = LoadResult {
                enumerated: 1,
                ..LoadResult::default()
            };
            match read_one(&self.gate, resolved).await {
                Ok(file) => result.files.push(file),
                Err(err) => result.errors.push(err),
            }
            return result;
        }

        let mut result = LoadResult::default();
        let paths = self.enumerate(&resolved, &mut result).await;
        info!(
            "Loading {} of {} files from {} ({} dropped)",
            paths.len(),
            result.enumerated,
            resolved.display(),
            result.dropped
        );

        let (files, errors) = self.read_all(paths).await;
        result.files = files;
        result.errors.extend(errors);
        result.files.sort_by(|a, b| a.path.cmp(&b.path));
        result
    }

    /// Depth-first walk, sorted by name. Keeps the first `max_files` eligible
    /// files and counts the rest as dropped.
    async fn enumerate(&self, root: &Path, result: &mut LoadResult) -> Vec<PathBuf> {
        let mut kept = Vec::new();
        // (directory, depth of its entries below root)
        let mut stack: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 1)];

        while let Some((dir, depth)) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    result.errors.push(LoadError {
                        path: dir,
                        reason: format!("cannot list directory: {}", e),
                    });
                    continue;
                }
            };

            let mut children = Vec::new();
            loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => children.push(entry.path()),
                    Ok(None) => break,
                    Err(e) => {
                        result.errors.push(LoadError {
                            path: dir.clone(),
                            reason: format!("cannot list directory: {}", e),
                        });
                        break;
                    }
                }
            }
            children.sort();

            let mut subdirs = Vec::new();
            for child in children {
                if self.is_excluded(&child) {
                    debug!("Excluded {}", child.display());
                    continue;
                }
                let file_type = match fs::symlink_metadata(&child).await {
                    Ok(meta) => meta.file_type(),
                    Err(e) => {
                        result.errors.push(LoadError {
                            path: child,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                if file_type.is_dir() {
                    if depth < self.config.max_depth {
                        subdirs.push(child);
                    } else {
                        debug!("Depth limit reached at {}", child.display());
                    }
                    continue;
                }
                let regular = if file_type.is_symlink() {
                    match fs::metadata(&child).await {
                        Ok(target) if target.is_dir() => {
                            // Symlinked directories are not followed
                            debug!("Not following directory symlink {}", child.display());
                            continue;
                        }
                        Ok(target) => target.is_file(),
                        // Dangling links go to the gate, which reports them
                        Err(_) => true,
                    }
                } else {
                    file_type.is_file()
                };
                if !regular {
                    debug!("Skipping non-regular file {}", child.display());
                    result.skipped += 1;
                    continue;
                }
                if !self.gate.is_allowed_extension(&child) {
                    result.skipped += 1;
                    continue;
                }

                result.enumerated += 1;
                if kept.len() < self.config.max_files {
                    kept.push(child);
                } else {
                    result.dropped += 1;
                }
            }

            // Reverse so the stack pops subdirectories in name order
            for sub in subdirs.into_iter().rev() {
                stack.push((sub, depth + 1));
            }
        }

        if result.dropped > 0 {
            warn!(
                "File cap of {} reached under {}: {} files dropped",
                self.config.max_files,
                root.display(),
                result.dropped
            );
        }
        kept
    }

    /// Read every path with at most `concurrency` reads in flight. Returns once
    /// every read has completed or failed.
    async fn read_all(&self, paths: Vec<PathBuf>) -> (Vec<LoadedFile>, Vec<LoadError>) {
        let permits = Semaphore::new(self.config.concurrency.max(1));
        let mut tasks = FuturesUnordered::new();

        for path in paths {
            let permits = &permits;
            let gate = &self.gate;
            tasks.push(async move {
                let _permit = permits.acquire().await.map_err(|_| LoadError {
                    path: path.clone(),
                    reason: "worker pool closed".to_string(),
                })?;
                read_one(gate, path).await
            });
        }

        let mut files = Vec::new();
        let mut errors = Vec::new();
        while let Some(outcome) = tasks.next().await {
            match outcome {
                Ok(file) => files.push(file),
                Err(err) => {
                    debug!("Skipping {}: {}", err.path.display(), err.reason);
                    errors.push(err);
                }
            }
        }
        (files, errors)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.config.exclude_patterns.iter().any(|pattern| {
            match pattern.strip_prefix('*') {
                Some(suffix) => name.ends_with(suffix),
                None => name == pattern,
            }
        })
    }
}

/// Validate, read and re-check one file.
async fn read_one(gate: &SecurityGate, path: PathBuf) -> Result<LoadedFile, LoadError> {
    let resolved = gate
        .validate(&path, AccessMode::Read)
        .into_result(&path)
        .map_err(|e| LoadError {
            path: path.clone(),
            reason: e.to_string(),
        })?;

    let read_failed = |e: std::io::Error| LoadError {
        path: path.clone(),
        reason: format!("read failed: {}", e),
    };
    // One byte past the limit is enough to tell an oversized file
    let limit = gate.max_file_size().saturating_add(1);
    let mut bytes = Vec::new();
    fs::File::open(&resolved)
        .await
        .map_err(read_failed)?
        .take(limit)
        .read_to_end(&mut bytes)
        .await
        .map_err(read_failed)?;

    let size = bytes.len() as u64;
    gate.check_read_size(&resolved, size)
        .map_err(|violation| LoadError {
            path: path.clone(),
            reason: violation.to_string(),
        })?;

    Ok(LoadedFile {
        path: resolved,
        content: String::from_utf8_lossy(&bytes).into_owned(),
        size,
    })
}
