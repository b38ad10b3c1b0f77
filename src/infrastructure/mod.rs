//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现

pub mod adapters;
pub mod events;
pub mod memory;
pub mod persistence;
pub mod process;

pub use adapters::{SimulatedSink, SynthesisEngine};
pub use events::{EventPublisher, PlaybackEvent};
pub use memory::{InMemoryChapterRepository, InMemoryPreferences, InMemoryRemoteChapters};
pub use persistence::{FileCacheConfig, FileSynthesisCache};
pub use process::{ChildProcess, ProcessGuard, ProcessSupervisor};
