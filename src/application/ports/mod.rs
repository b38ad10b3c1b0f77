//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_sink;
mod chapter_repository;
mod clock;
mod preferences;
mod process;
mod synthesis_cache;
mod synthesizer;

pub use audio_sink::{AudioSinkPort, SinkError};
pub use chapter_repository::{ChapterRepositoryPort, RemoteChapterPort, RepositoryError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use preferences::{PlaybackPreferences, PreferencesPort};
pub use process::{ProcessError, ProcessRecord, SupervisedProcess};
pub use synthesis_cache::{
    generate_cache_key, normalize_text, CacheEntry, CacheError, CacheStats, SynthesisCachePort,
    CACHE_KEY_LEN,
};
pub use synthesizer::{SynthesisError, SynthesisRequest, SynthesizerPort};
