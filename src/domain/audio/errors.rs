//! Audio Model - Errors

use thiserror::Error;

use super::AudioSpec;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("PCM 数据长度 {len} 不是帧大小 {frame_size} 的整数倍")]
    MisalignedBuffer { len: usize, frame_size: usize },

    #[error("无效的声道数: {0}")]
    InvalidChannels(u16),

    #[error("无效的采样率: {0}")]
    InvalidSampleRate(u32),

    #[error("音频参数超出 WAV 头可表示范围: {sample_rate}Hz/{channels}ch/{bits}bit")]
    SpecOutOfRange {
        sample_rate: u32,
        channels: u16,
        bits: u16,
    },

    #[error("不支持的位深度: {0}")]
    UnsupportedBitDepth(u16),

    #[error("音频格式不一致 (片段 {index}): 期望 {expected}, 实际 {found}")]
    FormatMismatch {
        index: usize,
        expected: AudioSpec,
        found: AudioSpec,
    },

    #[error("没有可合并的音频片段")]
    NothingToMerge,
}

/// WAV 编解码错误
#[derive(Debug, Error)]
pub enum WavError {
    #[error("WAV 数据过短: {0} 字节")]
    TooShort(usize),

    #[error("无效的 WAV: {0}")]
    InvalidHeader(&'static str),

    #[error("不支持的 WAV 编码格式: {0}")]
    UnsupportedEncoding(u16),

    #[error("数据块超出文件范围")]
    TruncatedData,

    #[error("音频数据过大，超出 RIFF 4GB 限制")]
    TooLarge,

    #[error(transparent)]
    Audio(#[from] AudioError),
}
