//! Narrator - 小说朗读命令行

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use narrator::application::ports::{
    PlaybackPreferences, SynthesisCachePort, SynthesizerPort, SystemClock,
};
use narrator::application::services::{
    ChapterAudioExporter, ExporterConfig, PlaybackDependencies, PlaybackOrchestrator,
};
use narrator::config::{load_config, print_config, AppConfig, EngineKind};
use narrator::domain::audio::AudioSamples;
use narrator::domain::library::{Book, BookId, Chapter, ChapterId};
use narrator::domain::playback::PlayerStatus;
use narrator::infrastructure::adapters::codec::decode_wav_bytes;
use narrator::infrastructure::adapters::{
    CommandSynthesizerConfig, EngineSettings, HttpSynthesizerConfig, SimulatedSink,
    SynthesisEngine,
};
use narrator::infrastructure::events::{track_notifications, EventPublisher, PlaybackEvent};
use narrator::infrastructure::memory::{InMemoryChapterRepository, InMemoryPreferences};
use narrator::infrastructure::persistence::{FileCacheConfig, FileSynthesisCache};
use narrator::infrastructure::process::ProcessSupervisor;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "narrator")]
#[command(about = "Novel narration pipeline: synthesis cache, chapter export and playback")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Export a text file as one chapter to WAV
    Export {
        file: PathBuf,
        /// Chapter title, defaults to the file stem
        title: Option<String>,
    },
    /// Narrate a text file with the simulated sink
    Read { file: PathBuf },
    /// Decode a WAV file and print its format
    Inspect { file: PathBuf },
    /// Show synthesis cache statistics
    CacheStats,
    /// Remove every cached synthesis result
    CacheClear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!("{},narrator={}", config.log.level, config.log.level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter)),
        )
        .init();

    tracing::info!("Narrator - TTS 朗读管线");
    print_config(&config);

    match cli.command {
        Command::Export { file, title } => export(&config, &file, title.as_deref()).await,
        Command::Read { file } => read(&config, &file).await,
        Command::Inspect { file } => inspect(&file).await,
        Command::CacheStats => cache_stats(&config).await,
        Command::CacheClear => cache_clear(&config).await,
    }
}

/// 共享的运行时组件
struct Runtime {
    supervisor: Arc<ProcessSupervisor>,
    sweeper_cancel: CancellationToken,
    cache: Arc<FileSynthesisCache>,
    synthesizer: Arc<dyn SynthesizerPort>,
}

impl Runtime {
    fn build(config: &AppConfig) -> anyhow::Result<Self> {
        // 创建进程监管器与僵尸进程清理任务
        let supervisor = ProcessSupervisor::new().arc();
        let sweeper_cancel = CancellationToken::new();
        if config.supervisor.sweep_interval_secs > 0 {
            supervisor.spawn_zombie_sweeper(
                Duration::from_secs(config.supervisor.sweep_interval_secs),
                sweeper_cancel.clone(),
            );
        }

        // 创建磁盘合成缓存
        let cache = FileSynthesisCache::open(&FileCacheConfig {
            dir: config.cache.dir.clone(),
            max_size_bytes: config.cache.max_size_bytes,
        })?
        .arc();

        let synthesizer = create_synthesizer(config, supervisor.clone())?;

        Ok(Self {
            supervisor,
            sweeper_cancel,
            cache,
            synthesizer,
        })
    }

    fn shutdown(&self) {
        self.sweeper_cancel.cancel();
        let terminated = self.supervisor.terminate_all();
        if terminated > 0 {
            tracing::info!(terminated = terminated, "Terminated remaining processes");
        }
    }
}

/// 创建合成引擎，配置的后端不可用时退回模拟引擎
fn create_synthesizer(
    config: &AppConfig,
    supervisor: Arc<ProcessSupervisor>,
) -> anyhow::Result<Arc<dyn SynthesizerPort>> {
    let tts = &config.tts;
    let settings = EngineSettings {
        http: HttpSynthesizerConfig {
            base_url: tts.url.clone(),
            timeout_secs: tts.timeout_secs,
            rate_limit_retry_delay_ms: tts.rate_limit_retry_delay_ms,
            voice: tts.voice.clone(),
        },
        command: CommandSynthesizerConfig {
            program: tts.command.clone(),
            args: tts.args.clone(),
            voice: tts.voice.clone(),
            sample_rate: tts.sample_rate,
            channels: tts.channels,
            timeout_secs: tts.timeout_secs,
        },
        simulated_voice: tts.voice.clone(),
        simulated_sample_rate: tts.sample_rate,
    };

    let engine = match SynthesisEngine::create(tts.engine, &settings, supervisor.clone())? {
        Some(engine) => engine,
        None => {
            tracing::warn!(engine = %tts.engine, "Configured engine unavailable, using simulated engine");
            SynthesisEngine::create(EngineKind::Simulated, &settings, supervisor)?
                .ok_or_else(|| anyhow::anyhow!("Simulated engine unavailable"))?
        }
    };

    tracing::info!(
        engine = %engine.kind(),
        voice_id = %engine.voice_id(),
        "Synthesis engine ready"
    );
    let synthesizer: Arc<dyn SynthesizerPort> = engine.arc();
    Ok(synthesizer)
}

/// 从文本文件构造单章节
async fn load_text_chapter(path: &Path, title: Option<&str>) -> anyhow::Result<Chapter> {
    let text = tokio::fs::read_to_string(path).await?;
    let name = title
        .map(str::to_string)
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "chapter".to_string());
    Ok(Chapter::from_text(ChapterId(1), BookId(1), name, &text))
}

async fn export(config: &AppConfig, path: &Path, title: Option<&str>) -> anyhow::Result<()> {
    let chapter = load_text_chapter(path, title).await?;
    let runtime = Runtime::build(config)?;

    let exporter = ChapterAudioExporter::new(ExporterConfig {
        output_dir: config.export.output_dir.clone(),
        max_chunk_chars: config.export.max_chunk_chars,
    });

    let result = exporter
        .export_with(
            &chapter,
            runtime.synthesizer.as_ref(),
            Some(runtime.cache.as_ref() as &dyn SynthesisCachePort),
            config.playback.speech_speed,
            config.playback.pitch,
            |done, total| tracing::info!(done = done, total = total, "Export progress"),
        )
        .await;
    runtime.shutdown();

    let output: PathBuf = result?;
    println!("{}", output.display());
    Ok(())
}

async fn read(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let chapter = load_text_chapter(path, None).await?;
    let (book_id, chapter_id) = (chapter.book_id, chapter.id);
    let runtime = Runtime::build(config)?;

    let chapters = InMemoryChapterRepository::new().arc();
    chapters.insert_book(Book::new(book_id, chapter.name.clone()), vec![chapter]);

    let preferences = InMemoryPreferences::new(PlaybackPreferences {
        auto_next_chapter: config.playback.auto_next_chapter,
        speech_speed: config.playback.speech_speed,
        pitch: config.playback.pitch,
        sleep_timer_minutes: config.playback.sleep_timer_minutes,
    })
    .arc();

    let events = EventPublisher::new().arc();
    let (notification, tracker) = track_notifications(events.subscribe());
    let mut receiver = events.subscribe();

    let orchestrator = PlaybackOrchestrator::new(
        PlaybackDependencies {
            chapters,
            remote: None,
            synthesizer: runtime.synthesizer.clone(),
            cache: Some(runtime.cache.clone() as Arc<dyn SynthesisCachePort>),
            sink: Arc::new(SimulatedSink::new()),
            supervisor: runtime.supervisor.clone(),
            preferences,
            events,
            clock: Arc::new(SystemClock),
        },
        config.playback.prefetch_paragraphs,
    );

    orchestrator.start_reading(book_id, chapter_id).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                break;
            }
            event = receiver.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped = skipped, "Event receiver lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if let PlaybackEvent::Error { message, .. } = &event {
                    eprintln!("error: {}", message);
                }
                if let Ok(state) = notification.read() {
                    tracing::info!(event = event.name(), "{}", state.summary());
                }
                if matches!(
                    event,
                    PlaybackEvent::StatusChanged { status: PlayerStatus::Idle | PlayerStatus::Paused, .. }
                ) {
                    break;
                }
            }
        }
    }

    let terminated = orchestrator.shutdown().await;
    runtime.shutdown();
    tracker.abort();
    tracing::info!(terminated = terminated, "Reading finished");
    Ok(())
}

async fn inspect(path: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path).await?;
    let samples: AudioSamples = decode_wav_bytes(&bytes)?;
    println!(
        "{}: {}, {} frames, {} ms",
        path.display(),
        samples.spec(),
        samples.frame_count(),
        samples.duration_ms()
    );
    Ok(())
}

async fn cache_stats(config: &AppConfig) -> anyhow::Result<()> {
    let cache = FileSynthesisCache::open(&FileCacheConfig {
        dir: config.cache.dir.clone(),
        max_size_bytes: config.cache.max_size_bytes,
    })?;
    let stats = cache.stats().await;
    println!(
        "entries: {}\nsize: {} / {} bytes",
        stats.entry_count, stats.total_bytes, stats.max_bytes
    );
    Ok(())
}

async fn cache_clear(config: &AppConfig) -> anyhow::Result<()> {
    let cache = FileSynthesisCache::open(&FileCacheConfig {
        dir: config.cache.dir.clone(),
        max_size_bytes: config.cache.max_size_bytes,
    })?;
    let entries = cache.stats().await.entry_count;
    cache.clear().await?;
    println!("removed {} cached entries", entries);
    Ok(())
}
