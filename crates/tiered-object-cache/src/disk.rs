//! On-disk cache tier: one file per key, staleness- and cost-bounded
//!
//! The directory listing plus per-file metadata is the entire index; no
//! manifest is kept. The aggregate on-disk size is computed once by a
//! background scan started at construction, then maintained incrementally.

use crate::error::{StoreError, StoreResult};
use crate::item::CacheItem;
use crate::types::{CacheStats, DiskConfig};
use sha2::{Digest, Sha256};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct DiskState {
    total_cost: u64,
    cost_limit: u64,
    max_staleness: Duration,
    /// One-shot background size scan; taken and awaited by the first
    /// cost-dependent operation, after which updates are incremental only.
    initial_scan: Option<JoinHandle<u64>>,
}

struct EntryFile {
    path: PathBuf,
    size: u64,
    modified: Option<SystemTime>,
}

/// The disk tier: a file-per-key store under `<root>/<cache name>`.
///
/// Every `get` reconstructs a fresh item from file bytes; nothing is held in
/// memory at rest beyond the running aggregate cost. If the tier directory
/// cannot be created the tier degrades to permanently-empty behavior instead
/// of failing construction.
pub struct DiskTier<I> {
    dir: Option<PathBuf>,
    state: Mutex<DiskState>,
    hits: AtomicU64,
    misses: AtomicU64,
    _item: PhantomData<fn() -> I>,
}

impl<I: CacheItem> DiskTier<I> {
    /// Create the tier directory and start the background size scan.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn new(name: &str, config: DiskConfig) -> Self {
        let dir = config.root.join(name);
        let dir = match fs::create_dir_all(&dir).await {
            Ok(()) => {
                info!(dir = ?dir, "disk tier initialized");
                Some(dir)
            }
            Err(err) => {
                warn!(dir = ?dir, error = %err, "cache directory unavailable, disk tier disabled");
                None
            }
        };

        let initial_scan = dir
            .clone()
            .map(|dir| tokio::spawn(async move { scan_total_size(&dir).await }));

        Self {
            dir,
            state: Mutex::new(DiskState {
                total_cost: 0,
                cost_limit: config.cost_limit,
                max_staleness: config.max_staleness,
                initial_scan,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            _item: PhantomData,
        }
    }

    /// The file name for a key: lowercase hex SHA-256 of the key string.
    /// Pure and deterministic, so lookups stay consistent across runs.
    fn file_name(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(Self::file_name(key)))
    }

    /// Lock the tier state, first awaiting the one-time size scan if it has
    /// not resolved yet. All cost-dependent operations go through here.
    async fn settled(&self) -> MutexGuard<'_, DiskState> {
        let mut state = self.state.lock().await;
        if let Some(scan) = state.initial_scan.take() {
            match scan.await {
                Ok(total) => {
                    info!(total_cost = total, "disk size scan complete");
                    state.total_cost = total;
                }
                Err(err) => {
                    warn!(error = %err, "disk size scan failed, assuming empty");
                    state.total_cost = 0;
                }
            }
        }
        state
    }

    /// Write or (with `None`) delete the entry for `key`, adjusting the
    /// running cost by the size delta. Storage failures are logged and
    /// swallowed; the caller always succeeds.
    pub async fn set(&self, key: &str, value: Option<&I>) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        let mut state = self.settled().await;

        let old_size = fs::metadata(&path).await.map(|m| m.len()).ok();

        let bytes = match value {
            Some(value) => match value.to_bytes() {
                Some(bytes) => Some(bytes),
                None => {
                    // The old version must not keep being served under a
                    // key the caller just failed to persist.
                    debug!(key, "item produced no bytes, not persisted");
                    None
                }
            },
            None => None,
        };

        match bytes {
            Some(bytes) => {
                if let Err(err) = write_atomic(&path, &bytes).await {
                    warn!(key, error = %err, "disk write failed");
                    return;
                }
                state.total_cost =
                    state.total_cost.saturating_sub(old_size.unwrap_or(0)) + bytes.len() as u64;
                debug!(key, size = bytes.len(), total_cost = state.total_cost, "disk set");
            }
            None => {
                let Some(old_size) = old_size else {
                    return;
                };
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        state.total_cost = state.total_cost.saturating_sub(old_size);
                        debug!(key, size = old_size, "disk entry removed");
                    }
                    Err(err) => warn!(key, error = %err, "disk delete failed"),
                }
            }
        }
    }

    /// Read and deserialize the entry for `key`. Absence, read failure, and
    /// decode failure all surface as `None`; a file that exists but cannot
    /// be decoded is removed so it does not poison future reads.
    pub async fn get(&self, key: &str) -> Option<I> {
        let Some(path) = self.entry_path(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(key, error = %err, "disk read failed");
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match I::from_bytes(&bytes) {
            Some(item) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "disk hit");
                Some(item)
            }
            None => {
                warn!(key, size = bytes.len(), "undecodable entry, removing");
                self.remove_entry_file(&path).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Existence check via the filesystem; no counters, no cost dependency.
    pub async fn contains(&self, key: &str) -> bool {
        match self.entry_path(key) {
            Some(path) => fs::metadata(&path).await.is_ok(),
            None => false,
        }
    }

    /// Replace the cost ceiling (`0` = unbounded) and run an eviction pass
    /// so a lowered limit takes effect immediately.
    pub async fn update_cost_limit(&self, cost_limit: u64) {
        {
            let mut state = self.settled().await;
            state.cost_limit = cost_limit;
        }
        self.purge().await;
    }

    /// Disk entries have no liveness concept; always a no-op.
    pub async fn purge_unowned(&self) {}

    /// Evict stale entries, then evict oldest-first until the aggregate cost
    /// is within the limit. No-op when both limits are disabled.
    pub async fn purge(&self) {
        let Some(dir) = self.dir.as_deref() else {
            return;
        };
        let mut state = self.settled().await;
        if state.cost_limit == 0 && state.max_staleness.is_zero() {
            return;
        }

        let files = match list_entry_files(dir).await {
            Ok(files) => files,
            Err(err) => {
                warn!(error = %err, "purge aborted");
                return;
            }
        };

        // Files without a readable mtime sit out the staleness pass but are
        // re-joined, oldest end, for the cost pass.
        let mut undated = Vec::new();
        let mut dated = Vec::new();
        for file in files {
            match file.modified {
                Some(_) => dated.push(file),
                None => undated.push(file),
            }
        }
        dated.sort_by_key(|file| file.modified);

        let mut idx = 0;
        if !state.max_staleness.is_zero() {
            let now = SystemTime::now();
            while idx < dated.len() {
                let file = &dated[idx];
                let age = file
                    .modified
                    .and_then(|m| now.duration_since(m).ok())
                    .unwrap_or(Duration::ZERO);
                if age <= state.max_staleness {
                    // Sorted oldest-first: everything from here on is younger.
                    break;
                }
                Self::delete_counted(file, &mut state, "stale").await;
                idx += 1;
            }
        }

        if state.cost_limit > 0 {
            let candidates = undated.iter().chain(dated[idx..].iter());
            for file in candidates {
                if state.total_cost <= state.cost_limit {
                    break;
                }
                Self::delete_counted(file, &mut state, "over cost limit").await;
            }
        }
    }

    /// Delete every entry file; the directory itself is retained.
    pub async fn clear(&self) {
        let Some(dir) = self.dir.as_deref() else {
            return;
        };
        let mut state = self.settled().await;

        let files = match list_entry_files(dir).await {
            Ok(files) => files,
            Err(err) => {
                warn!(error = %err, "clear aborted");
                return;
            }
        };
        for file in &files {
            Self::delete_counted(file, &mut state, "cleared").await;
        }
        debug!(total_cost = state.total_cost, "disk tier cleared");
    }

    pub async fn total_cost(&self) -> u64 {
        self.settled().await.total_cost
    }

    pub async fn cost_limit(&self) -> u64 {
        self.state.lock().await.cost_limit
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = match self.dir.as_deref() {
            Some(dir) => list_entry_files(dir)
                .await
                .map(|files| files.len())
                .unwrap_or(0),
            None => 0,
        };
        let state = self.settled().await;
        CacheStats {
            entries,
            total_cost: state.total_cost,
            cost_limit: state.cost_limit,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Delete one entry file, decrementing the running cost on success. A
    /// failed deletion leaves the cost unadjusted and is not retried.
    async fn delete_counted(file: &EntryFile, state: &mut DiskState, reason: &str) {
        match fs::remove_file(&file.path).await {
            Ok(()) => {
                state.total_cost = state.total_cost.saturating_sub(file.size);
                debug!(path = ?file.path, size = file.size, reason, "disk eviction");
            }
            Err(err) => warn!(path = ?file.path, error = %err, "disk eviction failed"),
        }
    }

    async fn remove_entry_file(&self, path: &Path) {
        let size = fs::metadata(path).await.map(|m| m.len()).ok();
        if fs::remove_file(path).await.is_ok() {
            if let Some(size) = size {
                let mut state = self.settled().await;
                state.total_cost = state.total_cost.saturating_sub(size);
            }
        }
    }
}

/// Write `bytes` to a temp file in the same directory, then rename into
/// place so readers never observe a partial entry.
async fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(err) = fs::write(&tmp, bytes).await {
        return Err(StoreError::Io(tmp, err));
    }
    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(StoreError::Io(path.to_path_buf(), err));
    }
    Ok(())
}

async fn list_entry_files(dir: &Path) -> StoreResult<Vec<EntryFile>> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|err| StoreError::List(dir.to_path_buf(), err))?;
    let mut files = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => return Err(StoreError::List(dir.to_path_buf(), err)),
        };
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        files.push(EntryFile {
            path: entry.path(),
            size: metadata.len(),
            modified: metadata.modified().ok(),
        });
    }
    Ok(files)
}

async fn scan_total_size(dir: &Path) -> u64 {
    match list_entry_files(dir).await {
        Ok(files) => files.iter().map(|file| file.size).sum(),
        Err(err) => {
            warn!(error = %err, "disk size scan could not list directory");
            0
        }
    }
}
