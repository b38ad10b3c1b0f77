//! Synthesis Cache Port - 合成结果缓存
//!
//! 定义合成结果缓存的抽象接口，具体实现为磁盘目录 + 内存索引 (LRU)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::audio::{AudioSamples, AudioSpec};

/// 缓存 key 长度（十六进制字符）
pub const CACHE_KEY_LEN: usize = 24;

/// Synthesis Cache 错误
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Invalid cached audio: {0}")]
    InvalidAudio(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::IoError(err.to_string())
    }
}

/// 缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// 冗余保存的音频参数，命中时无需重新解析文件
    pub spec: AudioSpec,
    /// 从磁盘恢复且没有元数据时为 true，首次读取时校正
    pub placeholder_spec: bool,
    pub created_at: DateTime<Utc>,
    /// LRU 排序字段，每次命中都会更新
    pub last_accessed: DateTime<Utc>,
}

/// Synthesis Cache Port
///
/// 以 (文本, 音色, 语速) 为 key 的 LRU 缓存
#[async_trait]
pub trait SynthesisCachePort: Send + Sync {
    /// 查找缓存，命中时更新 last_accessed（LRU touch）
    ///
    /// 索引存在但文件丢失时清理索引并返回 None
    async fn get(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
    ) -> Result<Option<AudioSamples>, CacheError>;

    /// 存储合成结果
    ///
    /// 总大小超过上限时同步执行 LRU 淘汰
    async fn put(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
        samples: &AudioSamples,
    ) -> Result<(), CacheError>;

    /// 检查是否已缓存（不更新 LRU）
    async fn contains(&self, text: &str, voice_id: &str, speed: f32) -> bool;

    /// 清空缓存
    async fn clear(&self) -> Result<(), CacheError>;

    /// 获取缓存统计信息
    async fn stats(&self) -> CacheStats;
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub hit_count: u64,
    pub miss_count: u64,
}

/// 文本归一化：去除首尾空白，合并连续空白
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 生成缓存 key
///
/// md5(归一化文本 + 音色 + 语速) 截断到固定长度，作为文件名使用
pub fn generate_cache_key(text: &str, voice_id: &str, speed: f32) -> String {
    let material = format!("{}\u{1f}{}\u{1f}{:.2}", normalize_text(text), voice_id, speed);
    let digest = md5::compute(material.as_bytes());
    let mut key = format!("{:x}", digest);
    key.truncate(CACHE_KEY_LEN);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_and_fixed_length() {
        let a = generate_cache_key("你好，世界。", "zh-voice", 1.0);
        let b = generate_cache_key("你好，世界。", "zh-voice", 1.0);
        assert_eq!(a, b);
        assert_eq!(a.len(), CACHE_KEY_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_uses_normalized_text() {
        let a = generate_cache_key("  hello   world ", "v", 1.0);
        let b = generate_cache_key("hello world", "v", 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_depends_on_voice_and_speed() {
        let base = generate_cache_key("text", "v1", 1.0);
        assert_ne!(base, generate_cache_key("text", "v2", 1.0));
        assert_ne!(base, generate_cache_key("text", "v1", 1.25));
        // 语速按两位小数参与计算
        assert_eq!(base, generate_cache_key("text", "v1", 1.001));
    }
}
