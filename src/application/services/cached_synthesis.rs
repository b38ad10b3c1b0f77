//! 缓存感知的合成

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::application::ports::{
    generate_cache_key, SynthesisCachePort, SynthesisError, SynthesisRequest, SynthesizerPort,
};
use crate::domain::audio::AudioSamples;

/// 缓存 key 中的音色部分
///
/// 引擎名参与计算，不同引擎的同名音色不会互相命中
pub fn cache_voice_key(synthesizer: &dyn SynthesizerPort) -> String {
    format!("{}:{}", synthesizer.engine_name(), synthesizer.voice_id())
}

/// 先查缓存，未命中时合成并写入缓存
///
/// 缓存读写失败只记录日志，不影响合成结果
pub async fn synthesize_with_cache(
    cache: Option<&dyn SynthesisCachePort>,
    synthesizer: &dyn SynthesizerPort,
    request: &SynthesisRequest,
) -> Result<AudioSamples, SynthesisError> {
    let Some(cache) = cache else {
        return synthesizer.synthesize(request).await;
    };

    let voice = cache_voice_key(synthesizer);
    match cache.get(&request.text, &voice, request.speed).await {
        Ok(Some(samples)) => return Ok(samples),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Cache lookup failed, synthesizing"),
    }

    let samples = synthesizer.synthesize(request).await?;

    if let Err(e) = cache
        .put(&request.text, &voice, request.speed, &samples)
        .await
    {
        tracing::warn!(error = %e, "Failed to store synthesis result in cache");
    }

    Ok(samples)
}

/// 按缓存 key 串行化进行中的合成
///
/// 预取与朗读同时请求同一段落时，后到者等先到者写入缓存后直接命中
#[derive(Clone, Default)]
pub struct InFlightSynthesis {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl InFlightSynthesis {
    pub fn new() -> Self {
        Self::default()
    }

    /// 占用 `key`，同一 key 的其他持有者释放前一直等待
    pub async fn acquire(&self, key: &str) -> InFlightGuard {
        let lock = self.locks.entry(key.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        InFlightGuard {
            locks: Arc::clone(&self.locks),
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// 当前被占用或等待中的 key 数
    pub fn pending(&self) -> usize {
        self.locks.len()
    }

    /// 去重后的 `synthesize_with_cache`
    pub async fn synthesize(
        &self,
        cache: Option<&dyn SynthesisCachePort>,
        synthesizer: &dyn SynthesizerPort,
        request: &SynthesisRequest,
    ) -> Result<AudioSamples, SynthesisError> {
        if cache.is_none() {
            return synthesizer.synthesize(request).await;
        }
        let key = generate_cache_key(&request.text, &cache_voice_key(synthesizer), request.speed);
        let _flight = self.acquire(&key).await;
        synthesize_with_cache(cache, synthesizer, request).await
    }
}

/// 合成占用凭证，释放时若无人等待则移除 key
pub struct InFlightGuard {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
