//! Command Synthesizer - 本地命令行 TTS（如 Piper）
//!
//! 文本写入 stdin，stdout 输出原始 s16le PCM。
//! 每次合成启动一个子进程，运行期间登记在进程监管器中

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::application::ports::{SynthesisError, SynthesisRequest, SynthesizerPort};
use crate::domain::audio::{AudioSamples, AudioSpec, SampleFormat};
use crate::infrastructure::process::{ChildProcess, ProcessSupervisor};

/// 子进程退出状态的轮询间隔
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 命令行合成器配置
#[derive(Debug, Clone)]
pub struct CommandSynthesizerConfig {
    /// 可执行文件
    pub program: String,
    /// 参数，支持 `{voice}`、`{speed}`、`{length_scale}` 占位符
    pub args: Vec<String>,
    /// 音色标识
    pub voice: String,
    /// 输出 PCM 的采样率
    pub sample_rate: u32,
    /// 输出 PCM 的声道数
    pub channels: u16,
    /// 单次合成超时（秒）
    pub timeout_secs: u64,
}

impl Default for CommandSynthesizerConfig {
    fn default() -> Self {
        Self {
            program: "piper".to_string(),
            args: vec![
                "--model".to_string(),
                "{voice}".to_string(),
                "--length_scale".to_string(),
                "{length_scale}".to_string(),
                "--output_raw".to_string(),
            ],
            voice: "en_US-lessac-medium.onnx".to_string(),
            sample_rate: 22050,
            channels: 1,
            timeout_secs: 120,
        }
    }
}

/// 命令行合成器
pub struct CommandSynthesizer {
    config: CommandSynthesizerConfig,
    spec: AudioSpec,
    supervisor: Arc<ProcessSupervisor>,
}

impl CommandSynthesizer {
    pub fn new(
        config: CommandSynthesizerConfig,
        supervisor: Arc<ProcessSupervisor>,
    ) -> Result<Self, SynthesisError> {
        let spec = AudioSpec::new(config.sample_rate, config.channels, SampleFormat::Pcm16)
            .map_err(|e| SynthesisError::Unavailable(e.to_string()))?;

        tracing::info!(
            program = %config.program,
            voice = %config.voice,
            spec = %spec,
            "CommandSynthesizer initialized"
        );

        Ok(Self {
            config,
            spec,
            supervisor,
        })
    }

    /// 可执行文件是否存在（绝对路径或 PATH 中）
    pub fn program_available(program: &str) -> bool {
        let path = std::path::Path::new(program);
        if path.components().count() > 1 {
            return path.is_file();
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
            .unwrap_or(false)
    }

    fn render_args(&self, request: &SynthesisRequest) -> Vec<String> {
        let speed = if request.speed > 0.0 { request.speed } else { 1.0 };
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{voice}", &self.config.voice)
                    .replace("{speed}", &format!("{:.2}", speed))
                    .replace("{length_scale}", &format!("{:.2}", 1.0 / speed))
            })
            .collect()
    }

    async fn run(&self, request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError> {
        let mut child = Command::new(&self.config.program)
            .args(self.render_args(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SynthesisError::ProcessError(format!(
                    "Failed to spawn {}: {}",
                    self.config.program, e
                ))
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let process = Arc::new(
            ChildProcess::new(child).map_err(|e| SynthesisError::ProcessError(e.to_string()))?,
        );
        let _guard = self.supervisor.register_guarded(
            process.clone(),
            self.engine_name(),
            &format!("synthesize {} chars", request.text.chars().count()),
        );

        let text = request.text.clone();
        let write_stdin = async move {
            if let Some(mut stdin) = stdin {
                // 进程可能不读取 stdin 就退出，写入失败以退出码为准
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    tracing::debug!(error = %e, "Failed to write text to synthesizer stdin");
                }
                let _ = stdin.shutdown().await;
            }
        };
        let read_stdout = async move {
            let mut buf = Vec::new();
            if let Some(mut stdout) = stdout {
                stdout.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let read_stderr = async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            buf
        };

        let ((), pcm, stderr) = tokio::join!(write_stdin, read_stdout, read_stderr);
        let pcm = pcm.map_err(|e| SynthesisError::ProcessError(e.to_string()))?;

        let status = process
            .wait_with_timeout(Duration::from_secs(self.config.timeout_secs), EXIT_POLL_INTERVAL)
            .await
            .map_err(|e| SynthesisError::ProcessError(e.to_string()))?
            .ok_or(SynthesisError::Timeout)?;

        if !status.success() {
            return Err(SynthesisError::ProcessError(format!(
                "{} exited with {}: {}",
                self.config.program,
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        Ok(pcm)
    }
}

#[async_trait]
impl SynthesizerPort for CommandSynthesizer {
    fn engine_name(&self) -> &str {
        "command"
    }

    fn voice_id(&self) -> &str {
        &self.config.voice
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioSamples, SynthesisError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut pcm = tokio::time::timeout(timeout, self.run(request))
            .await
            .map_err(|_| SynthesisError::Timeout)??;

        if pcm.is_empty() {
            return Err(SynthesisError::InvalidAudio(
                "synthesizer produced no audio".to_string(),
            ));
        }

        // 丢弃末尾不完整的帧
        let frame_size = self.spec.frame_size();
        pcm.truncate(pcm.len() - pcm.len() % frame_size);

        let samples = AudioSamples::new(pcm, self.spec)
            .map_err(|e| SynthesisError::InvalidAudio(e.to_string()))?;

        tracing::debug!(
            program = %self.config.program,
            duration_ms = samples.duration_ms(),
            "Command synthesis completed"
        );
        Ok(samples)
    }

    async fn health_check(&self) -> bool {
        Self::program_available(&self.config.program)
    }
}
