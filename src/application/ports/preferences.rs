//! Preferences Port - 朗读偏好设置
//!
//! 偏好由外部的设置模块持有，编排器只读取

use serde::{Deserialize, Serialize};

/// 朗读偏好
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPreferences {
    /// 章节读完后自动进入下一章
    pub auto_next_chapter: bool,
    /// 语速倍率
    pub speech_speed: f32,
    /// 音调（部分引擎不支持）
    pub pitch: f32,
    /// 睡眠定时器分钟数，0 表示关闭
    pub sleep_timer_minutes: u32,
}

impl Default for PlaybackPreferences {
    fn default() -> Self {
        Self {
            auto_next_chapter: true,
            speech_speed: 1.0,
            pitch: 1.0,
            sleep_timer_minutes: 0,
        }
    }
}

/// Preferences Port
pub trait PreferencesPort: Send + Sync {
    fn playback_preferences(&self) -> PlaybackPreferences;
}
