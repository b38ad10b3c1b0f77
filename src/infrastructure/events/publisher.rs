//! Event Publisher Implementation
//!
//! 朗读会话事件广播

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::library::{BookId, ChapterId};
use crate::domain::playback::PlayerStatus;

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// 朗读事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum PlaybackEvent {
    /// 播放状态变更
    StatusChanged {
        session_id: Uuid,
        status: PlayerStatus,
        paragraph_index: usize,
    },
    /// 章节加载完成
    ChapterLoaded {
        session_id: Uuid,
        book_id: BookId,
        chapter_id: ChapterId,
        chapter_name: String,
        paragraph_count: usize,
    },
    /// 当前段落变更
    ParagraphChanged {
        session_id: Uuid,
        index: usize,
        total: usize,
    },
    /// 睡眠定时器到期，朗读已停止
    SleepTimerExpired { session_id: Uuid },
    /// 合成引擎已切换
    EngineSwitched { engine: String, voice_id: String },
    /// 错误（合成失败、章节加载失败等）
    Error {
        session_id: Uuid,
        message: String,
    },
}

impl PlaybackEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlaybackEvent::StatusChanged { .. } => "StatusChanged",
            PlaybackEvent::ChapterLoaded { .. } => "ChapterLoaded",
            PlaybackEvent::ParagraphChanged { .. } => "ParagraphChanged",
            PlaybackEvent::SleepTimerExpired { .. } => "SleepTimerExpired",
            PlaybackEvent::EngineSwitched { .. } => "EngineSwitched",
            PlaybackEvent::Error { .. } => "Error",
        }
    }
}

/// 事件发布器
pub struct EventPublisher {
    channel: broadcast::Sender<PlaybackEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { channel: tx }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.channel.subscribe()
    }

    pub fn publish_status(&self, session_id: Uuid, status: PlayerStatus, paragraph_index: usize) {
        self.publish(PlaybackEvent::StatusChanged {
            session_id,
            status,
            paragraph_index,
        });
    }

    pub fn publish_chapter_loaded(
        &self,
        session_id: Uuid,
        book_id: BookId,
        chapter_id: ChapterId,
        chapter_name: &str,
        paragraph_count: usize,
    ) {
        self.publish(PlaybackEvent::ChapterLoaded {
            session_id,
            book_id,
            chapter_id,
            chapter_name: chapter_name.to_string(),
            paragraph_count,
        });
    }

    pub fn publish_paragraph(&self, session_id: Uuid, index: usize, total: usize) {
        self.publish(PlaybackEvent::ParagraphChanged {
            session_id,
            index,
            total,
        });
    }

    pub fn publish_sleep_timer_expired(&self, session_id: Uuid) {
        self.publish(PlaybackEvent::SleepTimerExpired { session_id });
    }

    pub fn publish_engine_switched(&self, engine: &str, voice_id: &str) {
        self.publish(PlaybackEvent::EngineSwitched {
            engine: engine.to_string(),
            voice_id: voice_id.to_string(),
        });
    }

    pub fn publish_error(&self, session_id: Uuid, message: &str) {
        self.publish(PlaybackEvent::Error {
            session_id,
            message: message.to_string(),
        });
    }

    /// 发布事件，没有订阅者时只记录 debug 日志
    pub fn publish(&self, event: PlaybackEvent) {
        let name = event.name();
        if let Err(e) = self.channel.send(event) {
            tracing::debug!(event = name, error = %e, "Failed to publish event (no receivers)");
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = EventPublisher::new();
        let mut rx = publisher.subscribe();
        let session = Uuid::new_v4();

        publisher.publish_status(session, PlayerStatus::Playing, 3);
        publisher.publish_error(session, "boom");

        assert_eq!(
            rx.recv().await.unwrap(),
            PlaybackEvent::StatusChanged {
                session_id: session,
                status: PlayerStatus::Playing,
                paragraph_index: 3,
            }
        );
        assert_eq!(rx.recv().await.unwrap().name(), "Error");
    }

    #[test]
    fn test_publish_without_receivers_does_not_fail() {
        let publisher = EventPublisher::new();
        publisher.publish_sleep_timer_expired(Uuid::new_v4());
    }

    #[test]
    fn test_event_json_shape() {
        let event = PlaybackEvent::EngineSwitched {
            engine: "simulated".to_string(),
            voice_id: "default".to_string(),
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "EngineSwitched");
        assert_eq!(json["data"]["engine"], "simulated");

        let status = PlaybackEvent::StatusChanged {
            session_id: Uuid::nil(),
            status: PlayerStatus::Paused,
            paragraph_index: 0,
        };
        let json: serde_json::Value = serde_json::from_str(&status.to_json().unwrap()).unwrap();
        assert_eq!(json["data"]["status"], "paused");
    }
}
