//! WAV 容器编解码
//!
//! 写出标准 44 字节头的 RIFF/WAVE (PCM) 文件，读取时遍历 chunk 列表，
//! 只接受 PCM (format tag = 1) 编码，其余编码交给 symphonia 解码器处理

use super::{AudioSamples, AudioSpec, SampleFormat, WavError};

/// 标准 PCM WAV 头长度
pub const WAV_HEADER_LEN: usize = 44;

/// PCM 编码标记
const WAVE_FORMAT_PCM: u16 = 1;

/// WAV 头信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_start: usize,
    pub data_size: usize,
}

impl WavInfo {
    pub fn duration_ms(&self) -> u64 {
        if self.byte_rate == 0 {
            return 0;
        }
        self.data_size as u64 * 1000 / self.byte_rate as u64
    }
}

/// 构造 44 字节 WAV 头
pub fn wav_header(spec: AudioSpec, data_size: u32) -> [u8; WAV_HEADER_LEN] {
    let mut header = [0u8; WAV_HEADER_LEN];
    let block_align = spec.block_align();

    // RIFF header
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    header[22..24].copy_from_slice(&spec.channels.to_le_bytes());
    header[24..28].copy_from_slice(&spec.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&spec.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&spec.format.bits_per_sample().to_le_bytes());

    // data chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// 将 PCM 音频编码为 WAV
pub fn encode_wav(samples: &AudioSamples) -> Result<Vec<u8>, WavError> {
    let data_size = u32::try_from(samples.len_bytes())
        .ok()
        .filter(|size| size.checked_add(36).is_some())
        .ok_or(WavError::TooLarge)?;

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + samples.len_bytes());
    wav.extend_from_slice(&wav_header(samples.spec(), data_size));
    wav.extend_from_slice(samples.data());
    Ok(wav)
}

/// 解析 WAV 文件头
pub fn parse_wav_header(data: &[u8]) -> Result<WavInfo, WavError> {
    if data.len() < WAV_HEADER_LEN {
        return Err(WavError::TooShort(data.len()));
    }
    if &data[0..4] != b"RIFF" {
        return Err(WavError::InvalidHeader("missing RIFF header"));
    }
    if &data[8..12] != b"WAVE" {
        return Err(WavError::InvalidHeader("missing WAVE identifier"));
    }

    let mut pos = 12;
    let mut fmt: Option<[u8; 16]> = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = read_u32(data, pos + 4) as usize;
        let body = pos + 8;

        match chunk_id {
            b"fmt " => {
                if chunk_size < 16 || body + 16 > data.len() {
                    return Err(WavError::InvalidHeader("invalid fmt chunk size"));
                }
                let mut raw = [0u8; 16];
                raw.copy_from_slice(&data[body..body + 16]);
                fmt = Some(raw);
            }
            b"data" => {
                let raw = fmt.ok_or(WavError::InvalidHeader("data chunk before fmt chunk"))?;
                let available = data.len() - body;
                // 流式输出的服务端常把 data size 写成 0xFFFFFFFF，按实际长度截断
                let data_size = chunk_size.min(available);
                return Ok(WavInfo {
                    audio_format: u16::from_le_bytes([raw[0], raw[1]]),
                    channels: u16::from_le_bytes([raw[2], raw[3]]),
                    sample_rate: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
                    byte_rate: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
                    block_align: u16::from_le_bytes([raw[12], raw[13]]),
                    bits_per_sample: u16::from_le_bytes([raw[14], raw[15]]),
                    data_start: body,
                    data_size,
                });
            }
            _ => {}
        }

        pos = body.checked_add(chunk_size).ok_or(WavError::TruncatedData)?;
        // 对齐到偶数字节
        if chunk_size % 2 != 0 {
            pos += 1;
        }
    }

    match fmt {
        Some(_) => Err(WavError::InvalidHeader("missing data chunk")),
        None => Err(WavError::InvalidHeader("missing fmt chunk")),
    }
}

/// 将 PCM WAV 解码为 AudioSamples
pub fn decode_wav(data: &[u8]) -> Result<AudioSamples, WavError> {
    let info = parse_wav_header(data)?;
    if info.audio_format != WAVE_FORMAT_PCM {
        return Err(WavError::UnsupportedEncoding(info.audio_format));
    }

    let format = SampleFormat::from_bits(info.bits_per_sample)?;
    let spec = AudioSpec::new(info.sample_rate, info.channels, format)?;

    // 丢弃末尾不完整的帧
    let usable = info.data_size - info.data_size % spec.frame_size();
    let pcm = data[info.data_start..info.data_start + usable].to_vec();
    Ok(AudioSamples::new(pcm, spec)?)
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}
