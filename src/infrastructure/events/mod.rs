//! 事件发布与通知状态

mod notification;
mod publisher;

pub use notification::{track_notifications, NotificationState};
pub use publisher::{EventPublisher, PlaybackEvent};
