//! Simulated Sink - 没有音频设备时的输出
//!
//! 按音频时长等待，支持暂停、恢复与停止

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::application::ports::{AudioSinkPort, SinkError};
use crate::domain::audio::AudioSamples;

/// 模拟音频输出
pub struct SimulatedSink {
    /// 每次 stop 递增，正在播放的 `play` 观察到变化后返回
    stop_generation: watch::Sender<u64>,
    paused: watch::Sender<bool>,
    /// 播放时长倍率，0 表示立即完成
    time_scale: f64,
    played_ms: AtomicU64,
}

impl SimulatedSink {
    pub fn new() -> Self {
        Self::with_time_scale(1.0)
    }

    pub fn with_time_scale(time_scale: f64) -> Self {
        let (stop_generation, _) = watch::channel(0);
        let (paused, _) = watch::channel(false);
        Self {
            stop_generation,
            paused,
            time_scale: time_scale.max(0.0),
            played_ms: AtomicU64::new(0),
        }
    }

    /// 累计完整播放的音频时长
    pub fn played_ms(&self) -> u64 {
        self.played_ms.load(Ordering::Relaxed)
    }
}

impl Default for SimulatedSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioSinkPort for SimulatedSink {
    async fn play(&self, samples: AudioSamples) -> Result<(), SinkError> {
        let mut stop_rx = self.stop_generation.subscribe();
        stop_rx.borrow_and_update();
        let mut pause_rx = self.paused.subscribe();

        let audio_ms = samples.duration_ms();
        let mut remaining = Duration::from_secs_f64(audio_ms as f64 / 1000.0 * self.time_scale);

        loop {
            if *pause_rx.borrow_and_update() {
                tokio::select! {
                    _ = stop_rx.changed() => return Ok(()),
                    changed = pause_rx.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                        continue;
                    }
                }
            }

            let started = Instant::now();
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {
                    self.played_ms.fetch_add(audio_ms, Ordering::Relaxed);
                    return Ok(());
                }
                _ = stop_rx.changed() => return Ok(()),
                _ = pause_rx.changed() => {
                    remaining = remaining.saturating_sub(started.elapsed());
                }
            }
        }
    }

    fn stop(&self) {
        self.stop_generation.send_modify(|generation| *generation += 1);
        self.paused.send_replace(false);
    }

    fn pause(&self) {
        self.paused.send_replace(true);
    }

    fn resume(&self) {
        self.paused.send_replace(false);
    }
}
