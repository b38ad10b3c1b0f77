//! In-Memory Preferences Implementation

use std::sync::{Arc, RwLock};

use crate::application::ports::{PlaybackPreferences, PreferencesPort};

/// 内存偏好设置
pub struct InMemoryPreferences {
    playback: RwLock<PlaybackPreferences>,
}

impl InMemoryPreferences {
    pub fn new(playback: PlaybackPreferences) -> Self {
        Self {
            playback: RwLock::new(playback),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn update(&self, f: impl FnOnce(&mut PlaybackPreferences)) {
        let mut playback = self.playback.write().unwrap_or_else(|e| e.into_inner());
        f(&mut playback);
    }
}

impl Default for InMemoryPreferences {
    fn default() -> Self {
        Self::new(PlaybackPreferences::default())
    }
}

impl PreferencesPort for InMemoryPreferences {
    fn playback_preferences(&self) -> PlaybackPreferences {
        self.playback
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
