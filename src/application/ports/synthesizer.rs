//! Synthesizer Port - 语音合成能力抽象
//!
//! 编排器和导出器只依赖这个接口，具体后端在 infrastructure/adapters/tts

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::audio::AudioSamples;

/// 合成错误
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Rate limited by synthesis service")]
    RateLimited,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    #[error("Process error: {0}")]
    ProcessError(String),

    #[error("Synthesis engine unavailable: {0}")]
    Unavailable(String),

    #[error("Synthesis cancelled")]
    Cancelled,
}

/// 合成请求
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// 要合成的文本
    pub text: String,
    /// 语速倍率
    pub speed: f32,
    /// 音调（不支持的引擎会忽略）
    pub pitch: f32,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speed: 1.0,
            pitch: 1.0,
        }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }
}

/// Synthesizer Port
///
/// 当前激活的合成后端
#[async_trait]
pub trait SynthesizerPort: Send + Sync {
    /// 引擎类型标识（如 "http"、"piper"）
    fn engine_name(&self) -> &str;

    /// 音色标识，参与缓存 key 计算
    fn voice_id(&self) -> &str;

    /// 合成一段文本
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioSamples, SynthesisError>;

    /// 检查后端是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
