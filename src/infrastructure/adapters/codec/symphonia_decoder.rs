//! 基于 symphonia 的音频解码
//!
//! 标准 PCM WAV 直接解析；浮点、WAVE_FORMAT_EXTENSIBLE 等其他编码
//! 通过 symphonia 解码并转换为 16-bit PCM

use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::domain::audio::{wav, AudioError, AudioSamples, AudioSpec, SampleFormat, WavError};

/// 解码错误
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid WAV: {0}")]
    Wav(#[from] WavError),

    #[error("Decoding failed: {0}")]
    Decoding(String),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// 解码 WAV 字节
///
/// PCM 编码走内置解析，其余编码回退到 symphonia
pub fn decode_wav_bytes(data: &[u8]) -> Result<AudioSamples, DecodeError> {
    match wav::decode_wav(data) {
        Ok(samples) => Ok(samples),
        Err(WavError::UnsupportedEncoding(tag))
        | Err(WavError::Audio(AudioError::UnsupportedBitDepth(tag))) => {
            tracing::debug!(tag = tag, "Non-canonical WAV, decoding with symphonia");
            decode_with_symphonia(data)
        }
        Err(e) => Err(e.into()),
    }
}

/// 使用 symphonia 解码为 16-bit PCM
pub fn decode_with_symphonia(data: &[u8]) -> Result<AudioSamples, DecodeError> {
    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Decoding(format!("Probe failed: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| DecodeError::Decoding("No audio track found".to_string()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::Decoding("Unknown sample rate".to_string()))?;

    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| DecodeError::Decoding("Unknown channel count".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Decoding(format!("Decoder creation failed: {}", e)))?;

    let track_id = track.id;
    let mut pcm: Vec<u8> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                return Err(DecodeError::Decoding(format!("Packet read error: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "Decode error (skipping packet)");
                continue;
            }
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        let mut sample_buf = SampleBuffer::<i16>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let actual_samples = num_frames * spec.channels.count();
        for sample in &sample_buf.samples()[..actual_samples] {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
    }

    let spec = AudioSpec::new(sample_rate, channels, SampleFormat::Pcm16)?;
    Ok(AudioSamples::new(pcm, spec)?)
}
