//! Chapter Repository Ports - 出站端口
//!
//! 书库持久化与远程章节抓取都由外部协作者实现，这里只定义播放管线需要的读取接口

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::library::{Book, BookId, Chapter, ChapterId};

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Remote fetch failed: {0}")]
    RemoteError(String),
}

/// 本地书库
#[async_trait]
pub trait ChapterRepositoryPort: Send + Sync {
    async fn find_book(&self, id: BookId) -> Result<Option<Book>, RepositoryError>;

    async fn find_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, RepositoryError>;

    /// 按阅读顺序返回书籍的全部章节
    async fn find_chapters_by_book(&self, book_id: BookId) -> Result<Vec<Chapter>, RepositoryError>;

    /// 保存（远程抓取到的）章节内容
    async fn save_chapter(&self, chapter: Chapter) -> Result<(), RepositoryError>;
}

/// 远程章节源
///
/// 本地章节内容缺失时用于抓取正文
#[async_trait]
pub trait RemoteChapterPort: Send + Sync {
    async fn fetch_content(&self, chapter: &Chapter) -> Result<Chapter, RepositoryError>;
}
