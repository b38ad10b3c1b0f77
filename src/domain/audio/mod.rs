//! Audio Model
//!
//! 原始 PCM 音频值对象与 WAV 容器编解码

mod errors;
mod samples;
pub mod wav;

pub use errors::{AudioError, WavError};
pub use samples::{AudioSamples, AudioSpec, SampleFormat};
