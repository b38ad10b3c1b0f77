//! 朗读通知状态
//!
//! 每个会话一份，由事件通道驱动更新，供通知栏 / 命令行显示当前朗读进度

use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::PlaybackEvent;
use crate::domain::playback::PlayerStatus;

/// 通知显示状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationState {
    pub session_id: Option<Uuid>,
    pub chapter_name: Option<String>,
    pub status: PlayerStatus,
    pub paragraph_index: usize,
    pub paragraph_count: usize,
    pub engine: Option<String>,
    pub last_error: Option<String>,
    pub sleep_timer_expired: bool,
}

impl NotificationState {
    /// 根据事件更新状态
    pub fn apply(&mut self, event: &PlaybackEvent) {
        match event {
            PlaybackEvent::StatusChanged {
                session_id,
                status,
                paragraph_index,
            } => {
                self.session_id = Some(*session_id);
                self.status = *status;
                self.paragraph_index = *paragraph_index;
                if *status == PlayerStatus::Playing {
                    self.last_error = None;
                    self.sleep_timer_expired = false;
                }
            }
            PlaybackEvent::ChapterLoaded {
                session_id,
                chapter_name,
                paragraph_count,
                ..
            } => {
                self.session_id = Some(*session_id);
                self.chapter_name = Some(chapter_name.clone());
                self.paragraph_count = *paragraph_count;
                self.paragraph_index = 0;
            }
            PlaybackEvent::ParagraphChanged { index, total, .. } => {
                self.paragraph_index = *index;
                self.paragraph_count = *total;
            }
            PlaybackEvent::SleepTimerExpired { .. } => {
                self.sleep_timer_expired = true;
                self.status = PlayerStatus::Idle;
            }
            PlaybackEvent::EngineSwitched { engine, .. } => {
                self.engine = Some(engine.clone());
            }
            PlaybackEvent::Error { message, .. } => {
                self.last_error = Some(message.clone());
            }
        }
    }

    /// 单行摘要
    pub fn summary(&self) -> String {
        let chapter = self.chapter_name.as_deref().unwrap_or("-");
        let position = if self.paragraph_count == 0 {
            "0/0".to_string()
        } else {
            format!(
                "{}/{}",
                (self.paragraph_index + 1).min(self.paragraph_count),
                self.paragraph_count
            )
        };
        let mut line = format!("[{}] {} {}", self.status.as_str(), chapter, position);
        if self.sleep_timer_expired {
            line.push_str(" (sleep timer)");
        }
        if let Some(error) = &self.last_error {
            line.push_str(&format!(" error: {}", error));
        }
        line
    }
}

/// 后台消费事件并更新共享的通知状态
///
/// 发送端关闭时任务结束；落后丢失的事件只记录日志
pub fn track_notifications(
    mut receiver: broadcast::Receiver<PlaybackEvent>,
) -> (Arc<RwLock<NotificationState>>, JoinHandle<()>) {
    let state = Arc::new(RwLock::new(NotificationState::default()));
    let shared = Arc::clone(&state);

    let handle = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let mut state = shared.write().unwrap_or_else(|e| e.into_inner());
                    state.apply(&event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Notification tracker lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    (state, handle)
}
