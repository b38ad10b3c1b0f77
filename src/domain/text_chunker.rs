//! 文本分块
//!
//! 将章节段落合并为不超过最大字符数的块，供一次合成调用使用。
//! 不同合成后端的输入长度上限不同，1000 字符对限制最小的后端也是安全的

/// 默认单块最大字符数
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 1000;

/// 块内段落之间的分隔符
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// 分块配置
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 单块最大字符数（按 Unicode 字符计）
    pub max_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

/// 一个文本块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    /// 该块覆盖的段落下标（相对于输入段落列表）
    pub paragraph_indices: Vec<usize>,
}

impl TextChunk {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// 将段落合并为有界大小的块
///
/// 分块策略：
/// 1. 空白段落直接跳过
/// 2. 当前块加上分隔符和新段落会超过上限时，新段落开启新块
/// 3. 单个段落本身超过上限时独占一个（超长）块
pub fn chunk_paragraphs<S: AsRef<str>>(paragraphs: &[S], config: &ChunkConfig) -> Vec<TextChunk> {
    let separator_chars = PARAGRAPH_SEPARATOR.chars().count();
    let mut chunks: Vec<TextChunk> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;
    let mut current_indices: Vec<usize> = Vec::new();

    for (i, paragraph) in paragraphs.iter().enumerate() {
        let paragraph = paragraph.as_ref().trim();
        if paragraph.is_empty() {
            continue;
        }
        let chars = paragraph.chars().count();

        if !current.is_empty() && current_chars + separator_chars + chars > config.max_chars {
            chunks.push(TextChunk {
                index: chunks.len(),
                text: std::mem::take(&mut current),
                paragraph_indices: std::mem::take(&mut current_indices),
            });
            current_chars = 0;
        }

        if !current.is_empty() {
            current.push_str(PARAGRAPH_SEPARATOR);
            current_chars += separator_chars;
        }
        current.push_str(paragraph);
        current_chars += chars;
        current_indices.push(i);
    }

    if !current.is_empty() {
        chunks.push(TextChunk {
            index: chunks.len(),
            text: current,
            paragraph_indices: current_indices,
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_paragraphs_share_one_chunk() {
        let chunks = chunk_paragraphs(&["第一段。", "第二段。"], &ChunkConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "第一段。\n\n第二段。");
        assert_eq!(chunks[0].paragraph_indices, vec![0, 1]);
    }

    #[test]
    fn test_overflow_starts_new_chunk() {
        let config = ChunkConfig { max_chars: 100 };
        let paragraphs: Vec<String> = (0..5).map(|i| format!("{}", i).repeat(40)).collect();
        let chunks = chunk_paragraphs(&paragraphs, &config);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.char_count() <= config.max_chars);
        }
        // 40 + 2 + 40 = 82，第三段会溢出
        assert_eq!(chunks[0].paragraph_indices, vec![0, 1]);
        assert_eq!(chunks[1].paragraph_indices, vec![2, 3]);
        assert_eq!(chunks[2].paragraph_indices, vec![4]);
    }

    #[test]
    fn test_separator_counts_toward_limit() {
        let config = ChunkConfig { max_chars: 10 };
        // 5 + 2 + 4 = 11 > 10
        let chunks = chunk_paragraphs(&["aaaaa", "bbbb"], &config);
        assert_eq!(chunks.len(), 2);
        // 5 + 2 + 3 = 10
        let chunks = chunk_paragraphs(&["aaaaa", "bbb"], &config);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_oversized_paragraph_is_its_own_chunk() {
        let config = ChunkConfig { max_chars: 10 };
        let long = "长".repeat(25);
        let chunks = chunk_paragraphs(&["短", long.as_str(), "尾"], &config);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].char_count(), 25);
        assert_eq!(chunks[1].paragraph_indices, vec![1]);
        for chunk in chunks.iter().filter(|c| c.paragraph_indices.len() > 1) {
            assert!(chunk.char_count() <= config.max_chars);
        }
    }

    #[test]
    fn test_blank_paragraphs_skipped() {
        let chunks = chunk_paragraphs(&["  ", "\t", "正文", ""], &ChunkConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "正文");
        assert_eq!(chunks[0].paragraph_indices, vec![2]);
        assert!(chunk_paragraphs::<&str>(&[], &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn test_chunk_indices_are_sequential() {
        let config = ChunkConfig { max_chars: 3 };
        let chunks = chunk_paragraphs(&["abc", "def", "ghi"], &config);
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
