//! 音频解码适配

mod symphonia_decoder;

pub use symphonia_decoder::{decode_wav_bytes, decode_with_symphonia, DecodeError};
