//! Playback Context - 朗读会话状态

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::library::{BookId, ChapterId};

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Idle,
    Loading,
    Playing,
    Paused,
}

impl PlayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStatus::Idle => "idle",
            PlayerStatus::Loading => "loading",
            PlayerStatus::Playing => "playing",
            PlayerStatus::Paused => "paused",
        }
    }
}

impl Default for PlayerStatus {
    fn default() -> Self {
        PlayerStatus::Idle
    }
}

/// 朗读会话状态
///
/// 每个朗读会话一个实例，只由播放编排器修改
#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub session_id: Uuid,
    pub book_id: Option<BookId>,
    pub chapter_id: Option<ChapterId>,
    /// 加载章节时的段落快照
    pub paragraphs: Vec<String>,
    pub current_paragraph: usize,
    /// 上一个段落下标（供界面过渡使用）
    pub previous_paragraph: usize,
    pub status: PlayerStatus,
    pub speech_speed: f32,
    pub pitch: f32,
    pub auto_next_chapter: bool,
    pub sleep_timer_enabled: bool,
    pub sleep_timer_minutes: u32,
    pub sleep_deadline: Option<DateTime<Utc>>,
    pub session_started_at: Option<DateTime<Utc>>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            book_id: None,
            chapter_id: None,
            paragraphs: Vec::new(),
            current_paragraph: 0,
            previous_paragraph: 0,
            status: PlayerStatus::Idle,
            speech_speed: 1.0,
            pitch: 1.0,
            auto_next_chapter: false,
            sleep_timer_enabled: false,
            sleep_timer_minutes: 0,
            sleep_deadline: None,
            session_started_at: None,
        }
    }
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.status == PlayerStatus::Playing
    }

    pub fn paragraph_count(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn current_text(&self) -> Option<&str> {
        self.paragraphs
            .get(self.current_paragraph)
            .map(|s| s.as_str())
    }

    /// 是否已经读完当前章节
    pub fn at_end_of_chapter(&self) -> bool {
        self.current_paragraph >= self.paragraphs.len()
    }

    /// 替换为新章节的段落快照，下标归零
    pub fn load_chapter(&mut self, book_id: BookId, chapter_id: ChapterId, paragraphs: Vec<String>) {
        self.book_id = Some(book_id);
        self.chapter_id = Some(chapter_id);
        self.paragraphs = paragraphs;
        self.current_paragraph = 0;
        self.previous_paragraph = 0;
    }

    /// 移动段落下标，越界返回 false
    pub fn move_to(&mut self, index: usize) -> bool {
        if index >= self.paragraphs.len() {
            return false;
        }
        self.previous_paragraph = self.current_paragraph;
        self.current_paragraph = index;
        true
    }

    /// 前进一个段落（允许到达 paragraph_count，即章节末尾）
    pub fn advance(&mut self) {
        self.previous_paragraph = self.current_paragraph;
        self.current_paragraph += 1;
    }

    /// 以 `now` 为会话起点重新计算睡眠定时器截止时间
    pub fn arm_sleep_timer(&mut self, now: DateTime<Utc>) {
        self.session_started_at = Some(now);
        self.sleep_deadline = if self.sleep_timer_enabled && self.sleep_timer_minutes > 0 {
            Some(now + Duration::minutes(self.sleep_timer_minutes as i64))
        } else {
            None
        };
    }

    /// 更新定时器设置，0 分钟表示关闭
    pub fn configure_sleep_timer(&mut self, minutes: u32, now: DateTime<Utc>) {
        self.sleep_timer_minutes = minutes;
        self.sleep_timer_enabled = minutes > 0;
        let start = self.session_started_at.unwrap_or(now);
        self.arm_sleep_timer(start);
    }

    pub fn sleep_timer_expired(&self, now: DateTime<Utc>) -> bool {
        self.sleep_timer_enabled && self.sleep_deadline.map_or(false, |deadline| now > deadline)
    }

    /// 清空会话（保留偏好设置）
    pub fn reset(&mut self) {
        self.session_id = Uuid::new_v4();
        self.book_id = None;
        self.chapter_id = None;
        self.paragraphs.clear();
        self.current_paragraph = 0;
        self.previous_paragraph = 0;
        self.status = PlayerStatus::Idle;
        self.sleep_deadline = None;
        self.session_started_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_state() -> PlaybackState {
        let mut state = PlaybackState::default();
        state.load_chapter(
            BookId(1),
            ChapterId(10),
            vec!["一".to_string(), "二".to_string(), "三".to_string()],
        );
        state
    }

    #[test]
    fn test_move_is_bounds_checked() {
        let mut state = loaded_state();
        assert!(state.move_to(2));
        assert_eq!(state.previous_paragraph, 0);
        assert_eq!(state.current_text(), Some("三"));
        assert!(!state.move_to(3));
        assert_eq!(state.current_paragraph, 2);
    }

    #[test]
    fn test_advance_reaches_end_of_chapter() {
        let mut state = loaded_state();
        state.move_to(2);
        assert!(!state.at_end_of_chapter());
        state.advance();
        assert!(state.at_end_of_chapter());
        assert_eq!(state.current_text(), None);
    }

    #[test]
    fn test_sleep_timer_deadline() {
        let mut state = loaded_state();
        let start = Utc::now();
        state.configure_sleep_timer(1, start);

        assert_eq!(state.sleep_deadline, Some(start + Duration::minutes(1)));
        assert!(!state.sleep_timer_expired(start + Duration::seconds(59)));
        assert!(state.sleep_timer_expired(start + Duration::seconds(61)));

        state.configure_sleep_timer(0, start);
        assert!(state.sleep_deadline.is_none());
        assert!(!state.sleep_timer_expired(start + Duration::hours(5)));
    }

    #[test]
    fn test_reset_keeps_preferences() {
        let mut state = loaded_state();
        state.speech_speed = 1.5;
        state.auto_next_chapter = true;
        let old_session = state.session_id;

        state.reset();
        assert!(state.paragraphs.is_empty());
        assert_eq!(state.status, PlayerStatus::Idle);
        assert_eq!(state.speech_speed, 1.5);
        assert!(state.auto_next_chapter);
        assert_ne!(state.session_id, old_session);
    }
}
