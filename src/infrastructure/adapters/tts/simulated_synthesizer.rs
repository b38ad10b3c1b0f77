//! Simulated Synthesizer - 无真实 TTS 时的模拟引擎
//!
//! 按词数和语速估算朗读时长，返回等长的静音

use async_trait::async_trait;

use crate::application::ports::{SynthesisError, SynthesisRequest, SynthesizerPort};
use crate::domain::audio::{AudioSamples, AudioSpec, SampleFormat};

/// 基准朗读速度（词/分钟）
const BASE_WORDS_PER_MINUTE: f64 = 150.0;

/// 模拟合成器
pub struct SimulatedSynthesizer {
    voice: String,
    spec: AudioSpec,
}

impl SimulatedSynthesizer {
    pub fn new(voice: impl Into<String>, sample_rate: u32) -> Result<Self, SynthesisError> {
        let spec = AudioSpec::new(sample_rate, 1, SampleFormat::Pcm16)
            .map_err(|e| SynthesisError::Unavailable(e.to_string()))?;
        Ok(Self {
            voice: voice.into(),
            spec,
        })
    }

    /// 估算朗读时长（毫秒）
    pub fn estimate_duration_ms(text: &str, speed: f32) -> u64 {
        let words = text.split_whitespace().count() as f64;
        let speed = if speed > 0.0 { speed as f64 } else { 1.0 };
        let words_per_minute = BASE_WORDS_PER_MINUTE * speed;
        (words / words_per_minute * 60.0 * 1000.0).round() as u64
    }
}

impl Default for SimulatedSynthesizer {
    fn default() -> Self {
        Self {
            voice: "simulated".to_string(),
            spec: AudioSpec::PLACEHOLDER,
        }
    }
}

#[async_trait]
impl SynthesizerPort for SimulatedSynthesizer {
    fn engine_name(&self) -> &str {
        "simulated"
    }

    fn voice_id(&self) -> &str {
        &self.voice
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioSamples, SynthesisError> {
        let duration_ms = Self::estimate_duration_ms(&request.text, request.speed);
        tracing::debug!(
            words = request.text.split_whitespace().count(),
            duration_ms = duration_ms,
            "Simulated synthesis"
        );
        AudioSamples::silence(self.spec, duration_ms)
            .map_err(|e| SynthesisError::InvalidAudio(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_estimate() {
        let text = vec!["word"; 150].join(" ");
        assert_eq!(SimulatedSynthesizer::estimate_duration_ms(&text, 1.0), 60_000);
        assert_eq!(SimulatedSynthesizer::estimate_duration_ms(&text, 2.0), 30_000);
        assert_eq!(SimulatedSynthesizer::estimate_duration_ms("", 1.0), 0);
    }

    #[tokio::test]
    async fn test_silence_matches_estimate() {
        let synth = SimulatedSynthesizer::new("v", 8000).unwrap();
        let text = vec!["word"; 15].join(" ");
        let samples = synth.synthesize(&SynthesisRequest::new(text)).await.unwrap();

        assert_eq!(samples.duration_ms(), 6000);
        assert!(samples.data().iter().all(|b| *b == 0));
    }
}
