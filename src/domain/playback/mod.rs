//! Playback Context
//!
//! 朗读会话状态机的数据部分，状态迁移由应用层的播放编排器驱动

mod state;

pub use state::{PlaybackState, PlayerStatus};
