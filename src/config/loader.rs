//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（narrator.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, EngineKind};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["narrator", "narrator.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `NARRATOR_`，层级分隔符 `__`）
/// 2. 配置文件（narrator.toml 或 narrator.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `NARRATOR_TTS__ENGINE=http`
/// - `NARRATOR_TTS__URL=http://tts-server:8000`
/// - `NARRATOR_CACHE__DIR=/data/cache`
/// - `NARRATOR_PLAYBACK__SLEEP_TIMER_MINUTES=30`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 首先设置默认值（最低优先级）
    builder = builder
        .set_default("tts.engine", "simulated")?
        .set_default("tts.url", "http://localhost:8000")?
        .set_default("tts.timeout_secs", 120)?
        .set_default("tts.rate_limit_retry_delay_ms", 2000)?
        .set_default("tts.voice", "default")?
        .set_default("tts.command", "piper")?
        .set_default("tts.sample_rate", 22050)?
        .set_default("tts.channels", 1)?
        .set_default("cache.dir", "data/cache")?
        .set_default("cache.max_size_bytes", 512_u64 * 1024 * 1024)?
        .set_default("export.output_dir", "data/export")?
        .set_default("export.max_chunk_chars", 1000)?
        .set_default("playback.auto_next_chapter", true)?
        .set_default("playback.speech_speed", 1.0)?
        .set_default("playback.pitch", 1.0)?
        .set_default("playback.sleep_timer_minutes", 0)?
        .set_default("playback.prefetch_paragraphs", 2)?
        .set_default("supervisor.sweep_interval_secs", 30)?
        .set_default("log.level", "info")?;

    // 2. 添加配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 添加环境变量（最高优先级）
    // 例如: NARRATOR_TTS__URL=http://tts-server:8000
    // 注意: 环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix("NARRATOR")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.tts.engine == EngineKind::Http && config.tts.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "TTS URL cannot be empty when the http engine is selected".to_string(),
        ));
    }

    if config.tts.engine == EngineKind::Command && config.tts.command.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "TTS command cannot be empty when the command engine is selected".to_string(),
        ));
    }

    if config.tts.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "TTS timeout cannot be 0".to_string(),
        ));
    }

    if config.tts.sample_rate == 0 || config.tts.channels == 0 {
        return Err(ConfigError::ValidationError(
            "TTS sample rate and channels must be positive".to_string(),
        ));
    }

    if config.cache.max_size_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "Cache size ceiling cannot be 0".to_string(),
        ));
    }

    if config.export.max_chunk_chars == 0 {
        return Err(ConfigError::ValidationError(
            "Export chunk size cannot be 0".to_string(),
        ));
    }

    if config.playback.speech_speed <= 0.0 || config.playback.pitch <= 0.0 {
        return Err(ConfigError::ValidationError(
            "Speech speed and pitch must be positive".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Narrator Configuration ===");
    tracing::info!("TTS Engine: {}", config.tts.engine);
    match config.tts.engine {
        EngineKind::Http => {
            tracing::info!("TTS URL: {}", config.tts.url);
            tracing::info!("TTS Timeout: {}s", config.tts.timeout_secs);
        }
        EngineKind::Command => {
            tracing::info!("TTS Command: {} {:?}", config.tts.command, config.tts.args);
            tracing::info!(
                "TTS Output: {}Hz / {}ch",
                config.tts.sample_rate,
                config.tts.channels
            );
        }
        EngineKind::Simulated => {}
    }
    tracing::info!("TTS Voice: {}", config.tts.voice);
    tracing::info!("Cache Directory: {:?}", config.cache.dir);
    tracing::info!("Cache Ceiling: {} bytes", config.cache.max_size_bytes);
    tracing::info!("Export Directory: {:?}", config.export.output_dir);
    tracing::info!("Auto Next Chapter: {}", config.playback.auto_next_chapter);
    if config.playback.sleep_timer_minutes > 0 {
        tracing::info!("Sleep Timer: {} min", config.playback.sleep_timer_minutes);
    }
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("==============================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_default_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_empty_url_with_http_engine() {
        let mut config = AppConfig::default();
        config.tts.url = String::new();
        assert!(validate_config(&config).is_ok());

        config.tts.engine = EngineKind::Http;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_values() {
        let mut config = AppConfig::default();
        config.cache.max_size_bytes = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.export.max_chunk_chars = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.playback.speech_speed = 0.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("narrator.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[tts]
engine = "command"
command = "/usr/local/bin/piper"
args = ["--model", "{{voice}}", "--output_raw"]
voice = "zh_CN-huayan-medium.onnx"

[cache]
max_size_bytes = 1048576

[playback]
auto_next_chapter = false
sleep_timer_minutes = 20
"#
        )
        .unwrap();

        let config = load_config_from_path(Some(&path)).unwrap();
        assert_eq!(config.tts.engine, EngineKind::Command);
        assert_eq!(config.tts.command, "/usr/local/bin/piper");
        assert_eq!(config.tts.args, vec!["--model", "{voice}", "--output_raw"]);
        assert_eq!(config.cache.max_size_bytes, 1_048_576);
        assert!(!config.playback.auto_next_chapter);
        assert_eq!(config.playback.sleep_timer_minutes, 20);
        // 未设置的字段使用默认值
        assert_eq!(config.export.max_chunk_chars, 1000);
        assert_eq!(config.tts.sample_rate, 22050);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config_from_path(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}
