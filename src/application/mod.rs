//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（Synthesizer、AudioSink、SynthesisCache、ChapterRepository 等）
//! - services: 播放编排、章节导出、缓存感知合成
//! - error: 应用层错误定义

pub mod error;
pub mod ports;
pub mod services;

// Re-exports
pub use error::ApplicationError;

pub use ports::{
    // Audio sink
    AudioSinkPort,
    SinkError,
    // Chapter repository
    ChapterRepositoryPort,
    RemoteChapterPort,
    RepositoryError,
    // Clock
    Clock,
    ManualClock,
    SystemClock,
    // Preferences
    PlaybackPreferences,
    PreferencesPort,
    // Process
    ProcessError,
    ProcessRecord,
    SupervisedProcess,
    // Synthesis cache
    generate_cache_key,
    CacheEntry,
    CacheError,
    CacheStats,
    SynthesisCachePort,
    // Synthesizer
    SynthesisError,
    SynthesisRequest,
    SynthesizerPort,
};

pub use services::{
    cache_voice_key, pregenerate, synthesize_with_cache, ChapterAudioExporter, ExportError,
    ExporterConfig, PlaybackDependencies, PlaybackOrchestrator, PregenerationSummary,
};
