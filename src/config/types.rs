//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 合成引擎配置
    #[serde(default)]
    pub tts: TtsConfig,

    /// 合成缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 章节导出配置
    #[serde(default)]
    pub export: ExportConfig,

    /// 朗读偏好默认值
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// 进程监管配置
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 合成引擎类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// 远程 HTTP 服务
    Http,
    /// 本地命令行（如 Piper）
    Command,
    /// 模拟引擎
    #[default]
    Simulated,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineKind::Http => "http",
            EngineKind::Command => "command",
            EngineKind::Simulated => "simulated",
        };
        write!(f, "{}", name)
    }
}

/// 合成引擎配置
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    /// 引擎类型
    /// 可选: http, command, simulated
    #[serde(default)]
    pub engine: EngineKind,

    /// TTS 服务基础 URL（http 引擎）
    #[serde(default = "default_tts_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,

    /// 收到 429 后重试前的等待时间（毫秒）
    #[serde(default = "default_rate_limit_retry_delay")]
    pub rate_limit_retry_delay_ms: u64,

    /// 音色标识
    #[serde(default = "default_voice")]
    pub voice: String,

    /// 可执行文件（command 引擎）
    #[serde(default = "default_command")]
    pub command: String,

    /// 命令参数，支持 {voice} {speed} {length_scale} 占位符
    #[serde(default = "default_command_args")]
    pub args: Vec<String>,

    /// 命令输出 PCM 的采样率
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// 命令输出 PCM 的声道数
    #[serde(default = "default_channels")]
    pub channels: u16,
}

fn default_tts_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_tts_timeout() -> u64 {
    120
}

fn default_rate_limit_retry_delay() -> u64 {
    2000
}

fn default_voice() -> String {
    "default".to_string()
}

fn default_command() -> String {
    "piper".to_string()
}

fn default_command_args() -> Vec<String> {
    vec![
        "--model".to_string(),
        "{voice}".to_string(),
        "--length_scale".to_string(),
        "{length_scale}".to_string(),
        "--output_raw".to_string(),
    ]
}

fn default_sample_rate() -> u32 {
    22050
}

fn default_channels() -> u16 {
    1 // 单声道
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            url: default_tts_url(),
            timeout_secs: default_tts_timeout(),
            rate_limit_retry_delay_ms: default_rate_limit_retry_delay(),
            voice: default_voice(),
            command: default_command(),
            args: default_command_args(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
        }
    }
}

/// 合成缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// 缓存目录
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// 最大缓存大小（字节），超过后淘汰到 80%
    #[serde(default = "default_cache_max_size")]
    pub max_size_bytes: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

fn default_cache_max_size() -> u64 {
    512 * 1024 * 1024 // 512 MB
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_size_bytes: default_cache_max_size(),
        }
    }
}

/// 章节导出配置
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// 导出目录
    #[serde(default = "default_export_dir")]
    pub output_dir: PathBuf,

    /// 每次合成的最大字符数
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("data/export")
}

fn default_max_chunk_chars() -> usize {
    1000
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_export_dir(),
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

/// 朗读偏好默认值
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// 读完自动进入下一章
    #[serde(default = "default_auto_next_chapter")]
    pub auto_next_chapter: bool,

    /// 语速倍率
    #[serde(default = "default_speech_speed")]
    pub speech_speed: f32,

    /// 音调
    #[serde(default = "default_pitch")]
    pub pitch: f32,

    /// 睡眠定时器（分钟），0 表示关闭
    #[serde(default)]
    pub sleep_timer_minutes: u32,

    /// 朗读时预先合成的后续段落数
    #[serde(default = "default_prefetch_paragraphs")]
    pub prefetch_paragraphs: usize,
}

fn default_auto_next_chapter() -> bool {
    true
}

fn default_speech_speed() -> f32 {
    1.0
}

fn default_pitch() -> f32 {
    1.0
}

fn default_prefetch_paragraphs() -> usize {
    2
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            auto_next_chapter: default_auto_next_chapter(),
            speech_speed: default_speech_speed(),
            pitch: default_pitch(),
            sleep_timer_minutes: 0,
            prefetch_paragraphs: default_prefetch_paragraphs(),
        }
    }
}

/// 进程监管配置
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// 僵尸进程清理间隔（秒），0 表示不启动后台清理
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    30
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.tts.engine, EngineKind::Simulated);
        assert_eq!(config.tts.url, "http://localhost:8000");
        assert_eq!(config.export.max_chunk_chars, 1000);
        assert_eq!(config.playback.prefetch_paragraphs, 2);
        assert!(config.playback.auto_next_chapter);
        assert_eq!(config.cache.dir, PathBuf::from("data/cache"));
    }

    #[test]
    fn test_engine_kind_display() {
        assert_eq!(EngineKind::Http.to_string(), "http");
        assert_eq!(EngineKind::Command.to_string(), "command");
    }
}
