//! Application Services - 用例编排
//!
//! - playback_orchestrator: 朗读会话状态机
//! - chapter_exporter: 章节音频导出
//! - cached_synthesis / pregeneration: 缓存感知合成与批量预生成

mod cached_synthesis;
mod chapter_exporter;
mod playback_orchestrator;
mod pregeneration;

#[cfg(test)]
mod test_support;

pub use cached_synthesis::{
    cache_voice_key, synthesize_with_cache, InFlightGuard, InFlightSynthesis,
};
pub use chapter_exporter::{
    export_file_name, sanitize_file_name, ChapterAudioExporter, ExportError, ExporterConfig,
};
pub use playback_orchestrator::{
    PlaybackDependencies, PlaybackOrchestrator, DEFAULT_PREFETCH_PARAGRAPHS,
};
pub use pregeneration::{pregenerate, PregenerationSummary};
