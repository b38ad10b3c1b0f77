//! Chapter Audio Exporter
//!
//! 章节文本 → 分块 → 逐块合成 → PCM 拼接 → WAV 文件

use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::cached_synthesis::synthesize_with_cache;
use crate::application::ports::{
    SynthesisCachePort, SynthesisError, SynthesisRequest, SynthesizerPort,
};
use crate::domain::audio::{wav, AudioError, AudioSamples, AudioSpec, WavError};
use crate::domain::library::{BookId, Chapter, ChapterId};
use crate::domain::text_chunker::{chunk_paragraphs, ChunkConfig, DEFAULT_MAX_CHUNK_CHARS};

/// 文件名中章节名部分的最大长度
const MAX_NAME_LEN: usize = 50;

/// 导出错误
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Chapter {0} has no readable text")]
    EmptyChapter(ChapterId),

    #[error("Chunk {index}/{total} failed: {source}")]
    ChunkFailed {
        index: usize,
        total: usize,
        #[source]
        source: SynthesisError,
    },

    #[error("Chunk {index} has format {found}, expected {expected}")]
    FormatMismatch {
        index: usize,
        expected: AudioSpec,
        found: AudioSpec,
    },

    #[error("Audio error: {0}")]
    Audio(AudioError),

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] WavError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AudioError> for ExportError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::FormatMismatch {
                index,
                expected,
                found,
            } => ExportError::FormatMismatch {
                index,
                expected,
                found,
            },
            other => ExportError::Audio(other),
        }
    }
}

/// 导出配置
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub output_dir: PathBuf,
    pub max_chunk_chars: usize,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/export"),
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

/// 章节音频导出器
pub struct ChapterAudioExporter {
    config: ExporterConfig,
}

impl ChapterAudioExporter {
    pub fn new(config: ExporterConfig) -> Self {
        Self { config }
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// 导出文件的最终路径
    pub fn output_path(&self, chapter: &Chapter) -> PathBuf {
        self.config
            .output_dir
            .join(export_file_name(chapter.book_id, chapter.id, &chapter.name))
    }

    /// 导出章节
    ///
    /// `synthesize` 逐块调用，`on_progress(done, total)` 在每块开始前调用一次，
    /// 全部完成后再以 `(total, total)` 调用一次。任一块失败立即返回，不留下输出文件
    pub async fn export<F, Fut, P>(
        &self,
        chapter: &Chapter,
        mut synthesize: F,
        mut on_progress: P,
    ) -> Result<PathBuf, ExportError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<AudioSamples, SynthesisError>>,
        P: FnMut(usize, usize),
    {
        let paragraphs = chapter.paragraphs();
        let chunks = chunk_paragraphs(
            &paragraphs,
            &ChunkConfig {
                max_chars: self.config.max_chunk_chars,
            },
        );
        if chunks.is_empty() {
            return Err(ExportError::EmptyChapter(chapter.id));
        }

        let total = chunks.len();
        tracing::info!(
            chapter_id = %chapter.id,
            paragraphs = paragraphs.len(),
            chunks = total,
            "Exporting chapter audio"
        );

        let mut parts = Vec::with_capacity(total);
        for chunk in chunks {
            on_progress(chunk.index, total);
            let samples = synthesize(chunk.text).await.map_err(|source| {
                tracing::warn!(chapter_id = %chapter.id, chunk = chunk.index, error = %source, "Chunk synthesis failed");
                ExportError::ChunkFailed {
                    index: chunk.index,
                    total,
                    source,
                }
            })?;
            parts.push(samples);
        }
        on_progress(total, total);

        let merged = AudioSamples::concat(&parts)?;
        let bytes = wav::encode_wav(&merged)?;

        let path = self.output_path(chapter);
        write_atomically(&path, &bytes).await?;

        tracing::info!(
            chapter_id = %chapter.id,
            path = %path.display(),
            duration_ms = merged.duration_ms(),
            size = bytes.len(),
            "Chapter exported"
        );
        Ok(path)
    }

    /// 使用合成端口（可选缓存）导出章节
    pub async fn export_with<P>(
        &self,
        chapter: &Chapter,
        synthesizer: &dyn SynthesizerPort,
        cache: Option<&dyn SynthesisCachePort>,
        speed: f32,
        pitch: f32,
        on_progress: P,
    ) -> Result<PathBuf, ExportError>
    where
        P: FnMut(usize, usize),
    {
        self.export(
            chapter,
            |text| async move {
                let request = SynthesisRequest::new(text)
                    .with_speed(speed)
                    .with_pitch(pitch);
                synthesize_with_cache(cache, synthesizer, &request).await
            },
            on_progress,
        )
        .await
    }
}

/// 先写 `.part` 再重命名
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut part_name = path.as_os_str().to_owned();
    part_name.push(".part");
    let part_path = PathBuf::from(part_name);

    if let Err(e) = tokio::fs::write(&part_path, bytes).await {
        let _ = tokio::fs::remove_file(&part_path).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&part_path, path).await {
        let _ = tokio::fs::remove_file(&part_path).await;
        return Err(e);
    }
    Ok(())
}

/// `<bookId>_<chapterId>_<name>.wav`
pub fn export_file_name(book_id: BookId, chapter_id: ChapterId, name: &str) -> String {
    format!("{}_{}_{}.wav", book_id, chapter_id, sanitize_file_name(name))
}

/// 文件名清理
///
/// 只保留 ASCII 字母数字、`-` 和 `_`，其他字符替换为 `_`，连续的 `_` 合并，
/// 去掉首尾的 `_` 后截断到 50 个字符，结果为空时使用 `chapter`
pub fn sanitize_file_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            c
        } else {
            '_'
        };
        if c == '_' && sanitized.ends_with('_') {
            continue;
        }
        sanitized.push(c);
    }

    let trimmed: String = sanitized
        .trim_matches('_')
        .chars()
        .take(MAX_NAME_LEN)
        .collect();
    if trimmed.is_empty() {
        "chapter".to_string()
    } else {
        trimmed
    }
}
