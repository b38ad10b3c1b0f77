//! 磁盘目录 + 内存索引的 LRU 合成缓存
//!
//! 目录布局：`<dir>/<key>.pcm` 为原始 PCM，`<dir>/<key>.meta` 为 bincode 编码的元数据

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::application::ports::{
    generate_cache_key, CacheEntry, CacheError, CacheStats, SynthesisCachePort,
};
use crate::domain::audio::{AudioSamples, AudioSpec};

const PCM_EXTENSION: &str = "pcm";
const META_EXTENSION: &str = "meta";
const TMP_EXTENSION: &str = "tmp";

/// 淘汰后总大小的目标比例
const EVICTION_TARGET_RATIO: f64 = 0.8;

/// 文件缓存配置
#[derive(Debug, Clone)]
pub struct FileCacheConfig {
    /// 缓存目录
    pub dir: PathBuf,
    /// 最大缓存大小（字节）
    pub max_size_bytes: u64,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/cache"),
            max_size_bytes: 512 * 1024 * 1024, // 512MB
        }
    }
}

/// 元数据 sidecar
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    spec: AudioSpec,
    created_at: i64,
    last_accessed: i64,
}

impl EntryMeta {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            spec: entry.spec,
            created_at: entry.created_at.timestamp_millis(),
            last_accessed: entry.last_accessed.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone)]
struct IndexedEntry {
    entry: CacheEntry,
    /// 进程内访问序号，时间戳相同时决定 LRU 顺序
    seq: u64,
}

#[derive(Debug, Default)]
struct CacheIndex {
    entries: HashMap<String, IndexedEntry>,
    total_bytes: u64,
    next_seq: u64,
}

impl CacheIndex {
    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn insert(&mut self, entry: CacheEntry) {
        let seq = self.bump_seq();
        self.total_bytes += entry.size_bytes;
        if let Some(old) = self
            .entries
            .insert(entry.key.clone(), IndexedEntry { entry, seq })
        {
            self.total_bytes = self.total_bytes.saturating_sub(old.entry.size_bytes);
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(removed.entry.size_bytes);
        Some(removed.entry)
    }

    /// 按 LRU 顺序（最久未访问在前）返回 key
    fn lru_order(&self) -> Vec<String> {
        let mut order: Vec<_> = self
            .entries
            .values()
            .map(|e| (e.entry.last_accessed, e.seq, e.entry.key.clone()))
            .collect();
        order.sort();
        order.into_iter().map(|(_, _, key)| key).collect()
    }
}

/// 文件合成缓存
pub struct FileSynthesisCache {
    dir: PathBuf,
    max_size_bytes: u64,
    index: Mutex<CacheIndex>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl FileSynthesisCache {
    /// 打开缓存目录并重建索引
    pub fn open(config: &FileCacheConfig) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&config.dir)?;

        let mut index = Self::scan_dir(&config.dir)?;
        let restored = index.entries.len();

        if index.total_bytes > config.max_size_bytes {
            let evicted = evict_to_target(&config.dir, config.max_size_bytes, &mut index);
            tracing::info!(evicted = evicted, "Cache over ceiling after restore, evicted");
        }

        tracing::info!(
            dir = %config.dir.display(),
            max_size_bytes = config.max_size_bytes,
            entries = restored,
            current_size = index.total_bytes,
            "FileSynthesisCache initialized"
        );

        Ok(Self {
            dir: config.dir.clone(),
            max_size_bytes: config.max_size_bytes,
            index: Mutex::new(index),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pcm_path(&self, key: &str) -> PathBuf {
        entry_path(&self.dir, key, PCM_EXTENSION)
    }

    /// 扫描目录重建索引
    ///
    /// 没有 sidecar 的文件使用占位参数和文件修改时间；孤立 sidecar 与临时文件直接删除
    fn scan_dir(dir: &Path) -> Result<CacheIndex, CacheError> {
        let mut pcm_files = Vec::new();
        let mut meta_keys = Vec::new();

        for item in std::fs::read_dir(dir)? {
            let item = item?;
            let path = item.path();
            if !item.file_type()?.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };

            match path.extension().and_then(|e| e.to_str()) {
                Some(PCM_EXTENSION) => pcm_files.push((stem, path, item.metadata()?)),
                Some(META_EXTENSION) => meta_keys.push(stem),
                Some(TMP_EXTENSION) => {
                    tracing::debug!(path = %path.display(), "Removing leftover temp file");
                    remove_file_quietly(&path);
                }
                _ => {}
            }
        }

        let mut restored: Vec<CacheEntry> = Vec::with_capacity(pcm_files.len());
        for (key, path, metadata) in pcm_files {
            let meta = read_sidecar(dir, &key);
            let entry = match meta {
                Some(meta) => CacheEntry {
                    key: key.clone(),
                    path,
                    size_bytes: metadata.len(),
                    spec: meta.spec,
                    placeholder_spec: false,
                    created_at: millis_to_datetime(meta.created_at),
                    last_accessed: millis_to_datetime(meta.last_accessed),
                },
                None => {
                    let modified = metadata
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|_| Utc::now());
                    CacheEntry {
                        key: key.clone(),
                        path,
                        size_bytes: metadata.len(),
                        spec: AudioSpec::PLACEHOLDER,
                        placeholder_spec: true,
                        created_at: modified,
                        last_accessed: modified,
                    }
                }
            };
            restored.push(entry);
        }

        for key in meta_keys {
            if !restored.iter().any(|e| e.key == key) {
                tracing::debug!(key = %key, "Removing orphaned cache sidecar");
                remove_file_quietly(&entry_path(dir, &key, META_EXTENSION));
            }
        }

        // 按访问时间分配序号，保持重启前的 LRU 顺序
        restored.sort_by_key(|e| e.last_accessed);
        let mut index = CacheIndex::default();
        for entry in restored {
            index.insert(entry);
        }
        Ok(index)
    }

    /// 清理失效条目（文件丢失或内容不合法）
    async fn purge(&self, index: &mut CacheIndex, key: &str, reason: &str) {
        if let Some(entry) = index.remove(key) {
            tracing::warn!(key = %key, reason = %reason, "Purging stale cache entry");
            let _ = tokio::fs::remove_file(&entry.path).await;
            let _ = tokio::fs::remove_file(entry_path(&self.dir, key, META_EXTENSION)).await;
        }
    }

    async fn write_sidecar(&self, entry: &CacheEntry) {
        let meta = EntryMeta::from_entry(entry);
        let result = match bincode::serialize(&meta) {
            Ok(bytes) => tokio::fs::write(entry_path(&self.dir, &entry.key, META_EXTENSION), bytes)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = result {
            tracing::warn!(key = %entry.key, error = %e, "Failed to write cache sidecar");
        }
    }

    fn miss(&self) -> Option<AudioSamples> {
        self.miss_count.fetch_add(1, Ordering::Relaxed);
        None
    }
}

#[async_trait]
impl SynthesisCachePort for FileSynthesisCache {
    async fn get(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
    ) -> Result<Option<AudioSamples>, CacheError> {
        let key = generate_cache_key(text, voice_id, speed);
        let mut index = self.index.lock().await;

        let Some(indexed) = index.entries.get(&key) else {
            return Ok(self.miss());
        };
        let entry = indexed.entry.clone();

        let data = match tokio::fs::read(&entry.path).await {
            Ok(data) => data,
            Err(e) => {
                self.purge(&mut index, &key, &e.to_string()).await;
                return Ok(self.miss());
            }
        };

        let samples = match AudioSamples::new(data, entry.spec) {
            Ok(samples) => samples,
            Err(e) => {
                self.purge(&mut index, &key, &e.to_string()).await;
                return Ok(self.miss());
            }
        };

        let seq = index.bump_seq();
        let now = Utc::now();
        let updated = match index.entries.get_mut(&key) {
            Some(indexed) => {
                indexed.seq = seq;
                indexed.entry.last_accessed = now;
                indexed.entry.size_bytes = samples.len_bytes() as u64;
                indexed.entry.placeholder_spec = false;
                indexed.entry.clone()
            }
            None => return Ok(self.miss()),
        };

        if entry.placeholder_spec {
            tracing::info!(key = %key, spec = %updated.spec, "Placeholder cache metadata confirmed");
        }
        self.write_sidecar(&updated).await;

        self.hit_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "Cache hit");
        Ok(Some(samples))
    }

    async fn put(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
        samples: &AudioSamples,
    ) -> Result<(), CacheError> {
        let key = generate_cache_key(text, voice_id, speed);
        let path = self.pcm_path(&key);
        let tmp_path = entry_path(&self.dir, &key, &format!("{}.{}", PCM_EXTENSION, TMP_EXTENSION));

        let mut index = self.index.lock().await;

        tokio::fs::write(&tmp_path, samples.data()).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        let now = Utc::now();
        let entry = CacheEntry {
            key: key.clone(),
            path,
            size_bytes: samples.len_bytes() as u64,
            spec: samples.spec(),
            placeholder_spec: false,
            created_at: now,
            last_accessed: now,
        };
        self.write_sidecar(&entry).await;
        index.insert(entry);

        tracing::debug!(
            key = %key,
            size_bytes = samples.len_bytes(),
            total_bytes = index.total_bytes,
            "Cache entry stored"
        );

        if index.total_bytes > self.max_size_bytes {
            let evicted = evict_to_target(&self.dir, self.max_size_bytes, &mut index);
            tracing::info!(
                evicted = evicted,
                total_bytes = index.total_bytes,
                "LRU eviction finished"
            );
        }

        Ok(())
    }

    async fn contains(&self, text: &str, voice_id: &str, speed: f32) -> bool {
        let key = generate_cache_key(text, voice_id, speed);
        let index = self.index.lock().await;
        match index.entries.get(&key) {
            Some(indexed) => tokio::fs::try_exists(&indexed.entry.path)
                .await
                .unwrap_or(false),
            None => false,
        }
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut index = self.index.lock().await;
        let count = index.entries.len();

        for (key, indexed) in index.entries.drain() {
            if let Err(e) = tokio::fs::remove_file(&indexed.entry.path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(key = %key, error = %e, "Failed to remove cache file");
                }
            }
            let _ = tokio::fs::remove_file(entry_path(&self.dir, &key, META_EXTENSION)).await;
        }
        index.total_bytes = 0;

        tracing::info!(cleared = count, "Cache cleared");
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let index = self.index.lock().await;
        CacheStats {
            entry_count: index.entries.len(),
            total_bytes: index.total_bytes,
            max_bytes: self.max_size_bytes,
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}

/// 淘汰最久未访问的条目，直到总大小不超过上限的 80%
fn evict_to_target(dir: &Path, max_size_bytes: u64, index: &mut CacheIndex) -> usize {
    let target = (max_size_bytes as f64 * EVICTION_TARGET_RATIO) as u64;
    let mut evicted = 0;

    for key in index.lru_order() {
        if index.total_bytes <= target {
            break;
        }
        if let Some(entry) = index.remove(&key) {
            remove_file_quietly(&entry.path);
            remove_file_quietly(&entry_path(dir, &key, META_EXTENSION));
            evicted += 1;
            tracing::debug!(
                key = %key,
                size_bytes = entry.size_bytes,
                "LRU evicted cache entry"
            );
        }
    }

    evicted
}

fn entry_path(dir: &Path, key: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", key, extension))
}

fn read_sidecar(dir: &Path, key: &str) -> Option<EntryMeta> {
    let bytes = std::fs::read(entry_path(dir, key, META_EXTENSION)).ok()?;
    match bincode::deserialize::<EntryMeta>(&bytes) {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Corrupt cache sidecar, using placeholder");
            None
        }
    }
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}
