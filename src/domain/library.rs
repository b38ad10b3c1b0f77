//! Library Context - 书籍与章节
//!
//! 播放管线只持有章节的段落快照，书库的持久化由外部协作者负责

use serde::{Deserialize, Serialize};
use std::fmt;

/// 书籍唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookId(pub i64);

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 章节唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChapterId(pub i64);

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 书籍
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
}

impl Book {
    pub fn new(id: BookId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }
}

/// 章节
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub book_id: BookId,
    pub name: String,
    /// 原始段落（可能包含空白段落）
    pub content: Vec<String>,
}

impl Chapter {
    pub fn new(
        id: ChapterId,
        book_id: BookId,
        name: impl Into<String>,
        content: Vec<String>,
    ) -> Self {
        Self {
            id,
            book_id,
            name: name.into(),
            content,
        }
    }

    /// 从整段文本构造章节，按行切分段落
    pub fn from_text(id: ChapterId, book_id: BookId, name: impl Into<String>, text: &str) -> Self {
        let content = text.lines().map(|line| line.to_string()).collect();
        Self::new(id, book_id, name, content)
    }

    /// 没有任何非空段落
    pub fn is_empty(&self) -> bool {
        self.content.iter().all(|p| p.trim().is_empty())
    }

    /// 可朗读的段落：去除首尾空白并丢弃空段落
    pub fn paragraphs(&self) -> Vec<String> {
        extract_paragraphs(&self.content)
    }
}

/// 提取有效段落
pub fn extract_paragraphs<S: AsRef<str>>(content: &[S]) -> Vec<String> {
    content
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}
