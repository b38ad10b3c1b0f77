//! 合成引擎选择
//!
//! 三种后端统一为一个枚举，对外只暴露 `SynthesizerPort`

use async_trait::async_trait;
use std::sync::Arc;

use super::{
    CommandSynthesizer, CommandSynthesizerConfig, HttpSynthesizer, HttpSynthesizerConfig,
    SimulatedSynthesizer,
};
use crate::application::ports::{SynthesisError, SynthesisRequest, SynthesizerPort};
use crate::config::EngineKind;
use crate::domain::audio::AudioSamples;
use crate::infrastructure::process::ProcessSupervisor;

/// 创建引擎所需的全部设置
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub http: HttpSynthesizerConfig,
    pub command: CommandSynthesizerConfig,
    /// 模拟引擎的音色与采样率
    pub simulated_voice: String,
    pub simulated_sample_rate: u32,
}

/// 合成引擎
pub enum SynthesisEngine {
    Http(HttpSynthesizer),
    Command(CommandSynthesizer),
    Simulated(SimulatedSynthesizer),
}

impl SynthesisEngine {
    /// 按配置创建引擎
    ///
    /// 后端不存在（未配置 URL、可执行文件不在 PATH 中）时返回 `Ok(None)`
    pub fn create(
        kind: EngineKind,
        settings: &EngineSettings,
        supervisor: Arc<ProcessSupervisor>,
    ) -> Result<Option<Self>, SynthesisError> {
        let engine = match kind {
            EngineKind::Http => {
                if settings.http.base_url.trim().is_empty() {
                    tracing::info!("HTTP synthesis backend not configured");
                    return Ok(None);
                }
                SynthesisEngine::Http(HttpSynthesizer::new(settings.http.clone())?)
            }
            EngineKind::Command => {
                if !CommandSynthesizer::program_available(&settings.command.program) {
                    tracing::info!(
                        program = %settings.command.program,
                        "Command synthesis backend not found"
                    );
                    return Ok(None);
                }
                SynthesisEngine::Command(CommandSynthesizer::new(
                    settings.command.clone(),
                    supervisor,
                )?)
            }
            EngineKind::Simulated => SynthesisEngine::Simulated(SimulatedSynthesizer::new(
                settings.simulated_voice.clone(),
                settings.simulated_sample_rate,
            )?),
        };
        Ok(Some(engine))
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            SynthesisEngine::Http(_) => EngineKind::Http,
            SynthesisEngine::Command(_) => EngineKind::Command,
            SynthesisEngine::Simulated(_) => EngineKind::Simulated,
        }
    }

    fn inner(&self) -> &dyn SynthesizerPort {
        match self {
            SynthesisEngine::Http(engine) => engine,
            SynthesisEngine::Command(engine) => engine,
            SynthesisEngine::Simulated(engine) => engine,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl SynthesizerPort for SynthesisEngine {
    fn engine_name(&self) -> &str {
        self.inner().engine_name()
    }

    fn voice_id(&self) -> &str {
        self.inner().voice_id()
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioSamples, SynthesisError> {
        self.inner().synthesize(request).await
    }

    async fn health_check(&self) -> bool {
        self.inner().health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EngineSettings {
        EngineSettings {
            http: HttpSynthesizerConfig::default(),
            command: CommandSynthesizerConfig {
                program: "definitely-not-a-real-tts-binary".to_string(),
                ..Default::default()
            },
            simulated_voice: "sim".to_string(),
            simulated_sample_rate: 22050,
        }
    }

    #[test]
    fn test_simulated_always_available() {
        let engine = SynthesisEngine::create(
            EngineKind::Simulated,
            &settings(),
            ProcessSupervisor::new().arc(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(engine.kind(), EngineKind::Simulated);
        assert_eq!(engine.engine_name(), "simulated");
        assert_eq!(engine.voice_id(), "sim");
    }

    #[test]
    fn test_missing_backends_are_none() {
        let supervisor = ProcessSupervisor::new().arc();
        let missing_command =
            SynthesisEngine::create(EngineKind::Command, &settings(), supervisor.clone()).unwrap();
        assert!(missing_command.is_none());

        let mut no_url = settings();
        no_url.http.base_url = "  ".to_string();
        let missing_http = SynthesisEngine::create(EngineKind::Http, &no_url, supervisor).unwrap();
        assert!(missing_http.is_none());
    }

    #[test]
    fn test_http_engine_created() {
        let engine = SynthesisEngine::create(
            EngineKind::Http,
            &settings(),
            ProcessSupervisor::new().arc(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(engine.engine_name(), "http");
    }
}
