//! In-Memory Chapter Repository Implementation

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::application::ports::{ChapterRepositoryPort, RemoteChapterPort, RepositoryError};
use crate::domain::library::{Book, BookId, Chapter, ChapterId};

/// 内存书库
pub struct InMemoryChapterRepository {
    books: DashMap<BookId, Book>,
    chapters: DashMap<ChapterId, Chapter>,
    /// book_id -> 按阅读顺序排列的 chapter_id
    book_chapters: DashMap<BookId, Vec<ChapterId>>,
}

impl InMemoryChapterRepository {
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
            chapters: DashMap::new(),
            book_chapters: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 添加书籍及其章节（章节按传入顺序排列）
    pub fn insert_book(&self, book: Book, chapters: Vec<Chapter>) {
        let book_id = book.id;
        let order: Vec<ChapterId> = chapters.iter().map(|c| c.id).collect();
        for chapter in chapters {
            self.chapters.insert(chapter.id, chapter);
        }
        self.book_chapters.insert(book_id, order);
        tracing::debug!(book_id = %book_id, title = %book.title, "Book added to library");
        self.books.insert(book_id, book);
    }
}

impl Default for InMemoryChapterRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChapterRepositoryPort for InMemoryChapterRepository {
    async fn find_book(&self, id: BookId) -> Result<Option<Book>, RepositoryError> {
        Ok(self.books.get(&id).map(|b| b.clone()))
    }

    async fn find_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, RepositoryError> {
        Ok(self.chapters.get(&id).map(|c| c.clone()))
    }

    async fn find_chapters_by_book(&self, book_id: BookId) -> Result<Vec<Chapter>, RepositoryError> {
        let order = match self.book_chapters.get(&book_id) {
            Some(order) => order.clone(),
            None => return Ok(Vec::new()),
        };
        Ok(order
            .iter()
            .filter_map(|id| self.chapters.get(id).map(|c| c.clone()))
            .collect())
    }

    async fn save_chapter(&self, chapter: Chapter) -> Result<(), RepositoryError> {
        let mut order = self.book_chapters.entry(chapter.book_id).or_default();
        if !order.contains(&chapter.id) {
            order.push(chapter.id);
        }
        drop(order);
        self.chapters.insert(chapter.id, chapter);
        Ok(())
    }
}

/// 内存远程章节源（测试与离线演示使用）
///
/// 只返回预先登记的章节正文
pub struct InMemoryRemoteChapters {
    contents: DashMap<ChapterId, Vec<String>>,
}

impl InMemoryRemoteChapters {
    pub fn new() -> Self {
        Self {
            contents: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn insert(&self, chapter_id: ChapterId, content: Vec<String>) {
        self.contents.insert(chapter_id, content);
    }
}

impl Default for InMemoryRemoteChapters {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteChapterPort for InMemoryRemoteChapters {
    async fn fetch_content(&self, chapter: &Chapter) -> Result<Chapter, RepositoryError> {
        let content = self
            .contents
            .get(&chapter.id)
            .map(|c| c.clone())
            .ok_or_else(|| RepositoryError::RemoteError(format!("chapter {} unavailable", chapter.id)))?;

        let mut fetched = chapter.clone();
        fetched.content = content;
        Ok(fetched)
    }
}
