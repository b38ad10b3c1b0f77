//! Audio Model - Value Objects

use serde::{Deserialize, Serialize};
use std::fmt;

use super::AudioError;

/// PCM 位深度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    Pcm16,
    Pcm24,
    Pcm32,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::Pcm16 => 2,
            SampleFormat::Pcm24 => 3,
            SampleFormat::Pcm32 => 4,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        (self.bytes_per_sample() * 8) as u16
    }

    pub fn from_bits(bits: u16) -> Result<Self, AudioError> {
        match bits {
            16 => Ok(SampleFormat::Pcm16),
            24 => Ok(SampleFormat::Pcm24),
            32 => Ok(SampleFormat::Pcm32),
            other => Err(AudioError::UnsupportedBitDepth(other)),
        }
    }
}

/// 音频参数（采样率 / 声道 / 位深度）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
}

impl AudioSpec {
    /// 磁盘恢复条目在没有元数据时使用的占位参数
    pub const PLACEHOLDER: AudioSpec = AudioSpec {
        sample_rate: 22050,
        channels: 1,
        format: SampleFormat::Pcm16,
    };

    pub fn new(sample_rate: u32, channels: u16, format: SampleFormat) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate(sample_rate));
        }
        if channels == 0 {
            return Err(AudioError::InvalidChannels(channels));
        }
        // WAV 头中 block_align 为 u16，byte_rate 为 u32
        let block_align = channels.checked_mul(format.bytes_per_sample() as u16);
        let byte_rate = block_align.and_then(|align| sample_rate.checked_mul(align as u32));
        if byte_rate.is_none() {
            return Err(AudioError::SpecOutOfRange {
                sample_rate,
                channels,
                bits: format.bits_per_sample(),
            });
        }
        Ok(Self {
            sample_rate,
            channels,
            format,
        })
    }

    /// 每帧字节数 = channels × bytesPerSample
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }

    pub fn block_align(&self) -> u16 {
        u16::try_from(self.frame_size()).unwrap_or(u16::MAX)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate.saturating_mul(self.block_align() as u32)
    }
}

impl fmt::Display for AudioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}bit",
            self.sample_rate,
            self.channels,
            self.format.bits_per_sample()
        )
    }
}

/// 合成得到的原始 PCM 音频（不可变）
#[derive(Clone, PartialEq, Eq)]
pub struct AudioSamples {
    data: Vec<u8>,
    spec: AudioSpec,
}

impl AudioSamples {
    pub fn new(data: Vec<u8>, spec: AudioSpec) -> Result<Self, AudioError> {
        let spec = AudioSpec::new(spec.sample_rate, spec.channels, spec.format)?;
        let frame_size = spec.frame_size();
        if data.len() % frame_size != 0 {
            return Err(AudioError::MisalignedBuffer {
                len: data.len(),
                frame_size,
            });
        }
        Ok(Self { data, spec })
    }

    /// 生成指定时长的静音
    pub fn silence(spec: AudioSpec, duration_ms: u64) -> Result<Self, AudioError> {
        let frames = spec.sample_rate as u64 * duration_ms / 1000;
        Self::new(vec![0u8; frames as usize * spec.frame_size()], spec)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.spec.channels
    }

    pub fn format(&self) -> SampleFormat {
        self.spec.format
    }

    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn frame_count(&self) -> usize {
        self.data.len() / self.spec.frame_size()
    }

    pub fn duration_ms(&self) -> u64 {
        self.frame_count() as u64 * 1000 / self.spec.sample_rate as u64
    }

    /// 按顺序拼接多个片段，参数取第一个片段
    ///
    /// 任何片段参数与第一个不同都会返回 `FormatMismatch`，不会产出损坏的音频
    pub fn concat(parts: &[AudioSamples]) -> Result<AudioSamples, AudioError> {
        let first = parts.first().ok_or(AudioError::NothingToMerge)?;
        let expected = first.spec;

        let total: usize = parts.iter().map(|p| p.data.len()).sum();
        let mut data = Vec::with_capacity(total);
        for (index, part) in parts.iter().enumerate() {
            if part.spec != expected {
                return Err(AudioError::FormatMismatch {
                    index,
                    expected,
                    found: part.spec,
                });
            }
            data.extend_from_slice(&part.data);
        }

        Ok(AudioSamples {
            data,
            spec: expected,
        })
    }
}

impl fmt::Debug for AudioSamples {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSamples")
            .field("bytes", &self.data.len())
            .field("spec", &self.spec)
            .finish()
    }
}
