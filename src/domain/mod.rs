//! Domain Layer - 领域层
//!
//! 包含:
//! - Audio Model: PCM 音频值对象与 WAV 容器
//! - Library Context: 书籍 / 章节
//! - Playback Context: 朗读会话状态
//! - 文本分块: 章节段落合并为有界大小的合成输入

pub mod audio;
pub mod library;
pub mod playback;
pub mod text_chunker;

pub use text_chunker::{chunk_paragraphs, ChunkConfig, TextChunk};
