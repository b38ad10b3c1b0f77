//! Memory Layer - In-Memory Implementations
//!
//! 书库、远程章节源与偏好设置的内存实现

mod chapter_repository;
mod preferences;

pub use chapter_repository::{InMemoryChapterRepository, InMemoryRemoteChapters};
pub use preferences::InMemoryPreferences;
