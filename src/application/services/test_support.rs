//! 服务测试用的端口替身

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use crate::application::ports::{
    generate_cache_key, AudioSinkPort, CacheError, CacheStats, SinkError, SynthesisCachePort,
    SynthesisError, SynthesisRequest, SynthesizerPort,
};
use crate::domain::audio::{AudioSamples, AudioSpec, SampleFormat};

pub fn mono16() -> AudioSpec {
    AudioSpec::new(22050, 1, SampleFormat::Pcm16).unwrap()
}

/// 可编排的合成器：记录请求，按文本注入失败或指定输出
pub struct ScriptedSynthesizer {
    voice: String,
    spec: AudioSpec,
    failing: Mutex<HashSet<String>>,
    outputs: Mutex<HashMap<String, AudioSamples>>,
    requests: Mutex<Vec<SynthesisRequest>>,
    delay: Duration,
}

impl ScriptedSynthesizer {
    pub fn new(voice: &str) -> Self {
        Self {
            voice: voice.to_string(),
            spec: mono16(),
            failing: Mutex::new(HashSet::new()),
            outputs: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_on(&self, text: &str) {
        self.failing.lock().unwrap().insert(text.to_string());
    }

    pub fn recover(&self, text: &str) {
        self.failing.lock().unwrap().remove(text);
    }

    pub fn output_for(&self, text: &str, samples: AudioSamples) {
        self.outputs.lock().unwrap().insert(text.to_string(), samples);
    }

    pub fn texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl SynthesizerPort for ScriptedSynthesizer {
    fn engine_name(&self) -> &str {
        "scripted"
    }

    fn voice_id(&self) -> &str {
        &self.voice
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioSamples, SynthesisError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.lock().unwrap().contains(&request.text) {
            return Err(SynthesisError::ServiceError(format!(
                "cannot synthesize '{}'",
                request.text
            )));
        }
        if let Some(samples) = self.outputs.lock().unwrap().get(&request.text) {
            return Ok(samples.clone());
        }
        // 每个字符 2 帧
        let frames = request.text.chars().count() * 2;
        Ok(AudioSamples::new(vec![0u8; frames * self.spec.frame_size()], self.spec).unwrap())
    }
}

/// 内存缓存
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, AudioSamples>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl MemoryCache {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl SynthesisCachePort for MemoryCache {
    async fn get(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
    ) -> Result<Option<AudioSamples>, CacheError> {
        let key = generate_cache_key(text, voice_id, speed);
        let found = self.entries.lock().unwrap().get(&key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        } else {
            self.misses.fetch_add(1, Ordering::SeqCst);
        }
        Ok(found)
    }

    async fn put(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
        samples: &AudioSamples,
    ) -> Result<(), CacheError> {
        let key = generate_cache_key(text, voice_id, speed);
        self.entries.lock().unwrap().insert(key, samples.clone());
        Ok(())
    }

    async fn contains(&self, text: &str, voice_id: &str, speed: f32) -> bool {
        let key = generate_cache_key(text, voice_id, speed);
        self.entries.lock().unwrap().contains_key(&key)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().unwrap();
        CacheStats {
            entry_count: entries.len(),
            total_bytes: entries.values().map(|s| s.len_bytes() as u64).sum(),
            max_bytes: u64::MAX,
            hit_count: self.hits.load(Ordering::SeqCst) as u64,
            miss_count: self.misses.load(Ordering::SeqCst) as u64,
        }
    }
}

/// 记录播放内容的音频输出
///
/// `gated` 模式下每次 `play` 都等待 `release` 或 `stop`
pub struct RecordingSink {
    played: Mutex<Vec<usize>>,
    started: AtomicUsize,
    stops: AtomicUsize,
    gated: bool,
    gate: Notify,
    stopped: Notify,
}

impl RecordingSink {
    pub fn instant() -> Self {
        Self::build(false)
    }

    pub fn gated() -> Self {
        Self::build(true)
    }

    fn build(gated: bool) -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            gated,
            gate: Notify::new(),
            stopped: Notify::new(),
        }
    }

    /// 放行当前（或下一次）等待中的 `play`
    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// 完整播放的片段字节数
    pub fn played(&self) -> Vec<usize> {
        self.played.lock().unwrap().clone()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSinkPort for RecordingSink {
    async fn play(&self, samples: AudioSamples) -> Result<(), SinkError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            tokio::select! {
                _ = self.gate.notified() => {}
                _ = self.stopped.notified() => return Ok(()),
            }
        } else {
            tokio::task::yield_now().await;
        }
        self.played.lock().unwrap().push(samples.len_bytes());
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stopped.notify_waiters();
    }

    fn pause(&self) {}

    fn resume(&self) {}
}

/// 轮询等待条件成立
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 2s");
}
