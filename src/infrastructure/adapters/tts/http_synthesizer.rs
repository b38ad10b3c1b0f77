//! HTTP Synthesizer - 调用外部 TTS HTTP 服务
//!
//! 外部 TTS API:
//! POST {base_url}/api/tts/infer
//! Request: {"text": "...", "voice": "...", "speed": 1.0, "pitch": 1.0}  (JSON)
//! Response: audio/wav binary
//!
//! 服务端返回 429 时等待固定间隔后重试一次

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

use crate::application::ports::{SynthesisError, SynthesisRequest, SynthesizerPort};
use crate::domain::audio::AudioSamples;
use crate::infrastructure::adapters::codec::decode_wav_bytes;

/// TTS 推理请求体 (JSON)
#[derive(Debug, Serialize)]
struct TtsHttpRequest<'a> {
    text: &'a str,
    voice: &'a str,
    speed: f32,
    pitch: f32,
}

/// HTTP 合成器配置
#[derive(Debug, Clone)]
pub struct HttpSynthesizerConfig {
    /// TTS 服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
    /// 429 后重试前的等待时间（毫秒）
    pub rate_limit_retry_delay_ms: u64,
    /// 音色标识
    pub voice: String,
}

impl Default for HttpSynthesizerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
            rate_limit_retry_delay_ms: 2000,
            voice: "default".to_string(),
        }
    }
}

impl HttpSynthesizerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// 单次请求的结果
enum Attempt {
    Audio(Vec<u8>),
    RateLimited,
}

/// HTTP 合成器
pub struct HttpSynthesizer {
    client: Client,
    config: HttpSynthesizerConfig,
}

impl HttpSynthesizer {
    pub fn new(config: HttpSynthesizerConfig) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SynthesisError::NetworkError(e.to_string()))?;

        tracing::info!(
            base_url = %config.base_url,
            voice = %config.voice,
            timeout_secs = config.timeout_secs,
            "HttpSynthesizer initialized"
        );

        Ok(Self { client, config })
    }

    fn infer_url(&self) -> String {
        format!("{}/api/tts/infer", self.config.base_url.trim_end_matches('/'))
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url.trim_end_matches('/'))
    }

    async fn attempt(&self, request: &SynthesisRequest) -> Result<Attempt, SynthesisError> {
        let body = TtsHttpRequest {
            text: &request.text,
            voice: &self.config.voice,
            speed: request.speed,
            pitch: request.pitch,
        };

        let response = self
            .client
            .post(self.infer_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SynthesisError::Timeout
                } else if e.is_connect() {
                    SynthesisError::NetworkError(format!("Cannot connect to TTS service: {}", e))
                } else {
                    SynthesisError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::RateLimited);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SynthesisError::ServiceError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let audio = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                SynthesisError::Timeout
            } else {
                SynthesisError::NetworkError(format!("Failed to read audio: {}", e))
            }
        })?;

        Ok(Attempt::Audio(audio.to_vec()))
    }
}

#[async_trait]
impl SynthesizerPort for HttpSynthesizer {
    fn engine_name(&self) -> &str {
        "http"
    }

    fn voice_id(&self) -> &str {
        &self.config.voice
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioSamples, SynthesisError> {
        tracing::debug!(
            url = %self.infer_url(),
            text_len = request.text.len(),
            voice = %self.config.voice,
            "Sending TTS infer request"
        );

        let audio = match self.attempt(request).await? {
            Attempt::Audio(audio) => audio,
            Attempt::RateLimited => {
                tracing::warn!(
                    delay_ms = self.config.rate_limit_retry_delay_ms,
                    "TTS service rate limited, retrying once"
                );
                tokio::time::sleep(Duration::from_millis(self.config.rate_limit_retry_delay_ms))
                    .await;
                match self.attempt(request).await? {
                    Attempt::Audio(audio) => audio,
                    Attempt::RateLimited => return Err(SynthesisError::RateLimited),
                }
            }
        };

        let samples =
            decode_wav_bytes(&audio).map_err(|e| SynthesisError::InvalidAudio(e.to_string()))?;

        tracing::info!(
            audio_size = audio.len(),
            duration_ms = samples.duration_ms(),
            spec = %samples.spec(),
            "TTS inference completed"
        );

        Ok(samples)
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
