//! Narrator - 小说朗读的 TTS 播放与音频资源管线
//!
//! 架构设计: Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Audio Model: PCM 音频值对象与 WAV 容器
//! - Library Context: 书籍 / 章节
//! - Playback Context: 朗读会话状态
//!
//! 应用层 (application/):
//! - Ports: 端口定义（Synthesizer, AudioSink, SynthesisCache, ChapterRepository, Preferences）
//! - Services: 播放编排器、章节音频导出、缓存感知合成与预生成
//!
//! 基础设施层 (infrastructure/):
//! - Persistence: 磁盘 LRU 合成缓存
//! - Process: 外部进程监管
//! - Adapters: HTTP / 命令行 / 模拟合成引擎，模拟音频输出，symphonia 解码
//! - Events: 朗读事件广播与通知状态
//! - Memory: 书库与偏好设置的内存实现

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
