//! Audio Sink Port - 平台音频输出

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::audio::AudioSamples;

/// 音频输出错误
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
}

/// Audio Sink Port
///
/// `play` 在音频播放完毕或被 `stop` 打断时返回
#[async_trait]
pub trait AudioSinkPort: Send + Sync {
    async fn play(&self, samples: AudioSamples) -> Result<(), SinkError>;

    /// 立即停止输出，正在等待的 `play` 随之返回
    fn stop(&self);

    fn pause(&self);

    fn resume(&self);
}
