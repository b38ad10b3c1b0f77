//! 批量预生成
//!
//! 提前把一组文本合成进缓存，尽力而为：单条失败只记录日志

use tokio_util::sync::CancellationToken;

use super::cached_synthesis::{cache_voice_key, InFlightSynthesis};
use crate::application::ports::{
    generate_cache_key, SynthesisCachePort, SynthesisRequest, SynthesizerPort,
};

/// 预生成结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PregenerationSummary {
    /// 新合成并写入缓存
    pub generated: usize,
    /// 空白或已缓存
    pub skipped: usize,
    pub failed: usize,
    /// 被取消时为 true
    pub cancelled: bool,
}

/// 依次预生成 `texts`，每处理完一条调用 `on_progress(completed, total)`
///
/// 每条之间检查取消令牌；同一文本正在别处合成时等待其完成，不重复合成
#[allow(clippy::too_many_arguments)]
pub async fn pregenerate<S, P>(
    cache: &dyn SynthesisCachePort,
    synthesizer: &dyn SynthesizerPort,
    in_flight: &InFlightSynthesis,
    texts: &[S],
    speed: f32,
    pitch: f32,
    cancel: &CancellationToken,
    mut on_progress: P,
) -> PregenerationSummary
where
    S: AsRef<str>,
    P: FnMut(usize, usize),
{
    let total = texts.len();
    let voice = cache_voice_key(synthesizer);
    let mut summary = PregenerationSummary::default();

    for (index, text) in texts.iter().enumerate() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let text = text.as_ref().trim();
        if text.is_empty() || cache.contains(text, &voice, speed).await {
            summary.skipped += 1;
            on_progress(index + 1, total);
            continue;
        }

        let key = generate_cache_key(text, &voice, speed);
        let _flight = tokio::select! {
            _ = cancel.cancelled() => {
                summary.cancelled = true;
                break;
            }
            flight = in_flight.acquire(&key) => flight,
        };

        // 等待期间可能已由朗读任务写入
        if cache.contains(text, &voice, speed).await {
            summary.skipped += 1;
        } else {
            let request = SynthesisRequest::new(text).with_speed(speed).with_pitch(pitch);
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                result = synthesizer.synthesize(&request) => result,
            };

            match result {
                Ok(samples) => match cache.put(text, &voice, speed, &samples).await {
                    Ok(()) => summary.generated += 1,
                    Err(e) => {
                        tracing::warn!(index = index, error = %e, "Failed to cache pregenerated audio");
                        summary.failed += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!(index = index, error = %e, "Pregeneration failed, skipping");
                    summary.failed += 1;
                }
            }
        }

        on_progress(index + 1, total);
    }

    tracing::debug!(
        generated = summary.generated,
        skipped = summary.skipped,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "Pregeneration finished"
    );
    summary
}
