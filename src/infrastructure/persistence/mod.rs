//! Persistence Layer - 数据持久化
//!
//! 合成结果的磁盘缓存

mod file_cache;

pub use file_cache::{FileCacheConfig, FileSynthesisCache};
