//! Playback Orchestrator
//!
//! 朗读会话状态机：`Idle → Loading → Playing ⇄ Paused → Idle`
//!
//! 公开方法构成唯一的控制路径，由 `control` 锁串行化。每个会话最多一个朗读任务，
//! 控制路径先取消并等待旧任务结束再启动新任务，两个朗读任务不会重叠

use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::cached_synthesis::InFlightSynthesis;
use super::pregeneration::pregenerate;
use crate::application::error::ApplicationError;
use crate::application::ports::{
    AudioSinkPort, ChapterRepositoryPort, Clock, PlaybackPreferences, PreferencesPort,
    RemoteChapterPort, SynthesisCachePort, SynthesisRequest, SynthesizerPort,
};
use crate::domain::library::{BookId, Chapter, ChapterId};
use crate::domain::playback::{PlaybackState, PlayerStatus};
use crate::infrastructure::events::{EventPublisher, PlaybackEvent};
use crate::infrastructure::process::ProcessSupervisor;

/// 默认预取段落数
pub const DEFAULT_PREFETCH_PARAGRAPHS: usize = 2;

/// 编排器依赖
pub struct PlaybackDependencies {
    pub chapters: Arc<dyn ChapterRepositoryPort>,
    /// 本地章节内容缺失时的远程来源
    pub remote: Option<Arc<dyn RemoteChapterPort>>,
    pub synthesizer: Arc<dyn SynthesizerPort>,
    pub cache: Option<Arc<dyn SynthesisCachePort>>,
    pub sink: Arc<dyn AudioSinkPort>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub preferences: Arc<dyn PreferencesPort>,
    pub events: Arc<EventPublisher>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Next,
    Previous,
}

/// 正在运行的朗读任务
struct Narration {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 朗读任务的下一步
enum Step {
    Speak {
        session_id: Uuid,
        index: usize,
        request: SynthesisRequest,
        /// 需要预取的后续段落
        upcoming: Vec<String>,
    },
    ChapterFinished {
        book_id: BookId,
        chapter_id: ChapterId,
    },
    Finished,
}

struct Inner {
    state: Mutex<PlaybackState>,
    control: Mutex<()>,
    narration: std::sync::Mutex<Option<Narration>>,
    chapters: Arc<dyn ChapterRepositoryPort>,
    remote: Option<Arc<dyn RemoteChapterPort>>,
    synthesizer: RwLock<Arc<dyn SynthesizerPort>>,
    cache: Option<Arc<dyn SynthesisCachePort>>,
    /// 朗读与预取共享，同一段落只合成一次
    in_flight: InFlightSynthesis,
    sink: Arc<dyn AudioSinkPort>,
    supervisor: Arc<ProcessSupervisor>,
    preferences: Arc<dyn PreferencesPort>,
    events: Arc<EventPublisher>,
    clock: Arc<dyn Clock>,
    prefetch_paragraphs: usize,
}

/// 播放编排器
#[derive(Clone)]
pub struct PlaybackOrchestrator {
    inner: Arc<Inner>,
}

impl PlaybackOrchestrator {
    pub fn new(deps: PlaybackDependencies, prefetch_paragraphs: usize) -> Self {
        let mut state = PlaybackState::default();
        apply_preferences(&mut state, &deps.preferences.playback_preferences());

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                control: Mutex::new(()),
                narration: std::sync::Mutex::new(None),
                chapters: deps.chapters,
                remote: deps.remote,
                synthesizer: RwLock::new(deps.synthesizer),
                cache: deps.cache,
                in_flight: InFlightSynthesis::new(),
                sink: deps.sink,
                supervisor: deps.supervisor,
                preferences: deps.preferences,
                events: deps.events,
                clock: deps.clock,
                prefetch_paragraphs,
            }),
        }
    }

    /// 订阅朗读事件
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    /// 当前会话状态的快照
    pub async fn snapshot(&self) -> PlaybackState {
        self.inner.state.lock().await.clone()
    }

    /// 当前使用的合成器
    pub fn synthesizer(&self) -> Arc<dyn SynthesizerPort> {
        self.inner.current_synthesizer()
    }

    /// 开始朗读章节
    ///
    /// 开启新会话：读取偏好设置、加载章节段落、重新计算睡眠定时器后开始朗读
    pub async fn start_reading(
        &self,
        book_id: BookId,
        chapter_id: ChapterId,
    ) -> Result<(), ApplicationError> {
        let _control = self.inner.control.lock().await;
        self.cancel_narration().await;

        {
            let mut state = self.inner.state.lock().await;
            state.reset();
            apply_preferences(&mut state, &self.inner.preferences.playback_preferences());
            self.inner.set_status(&mut state, PlayerStatus::Loading);
        }

        let loaded = self.load_for_reading(book_id, chapter_id).await;

        let mut state = self.inner.state.lock().await;
        let chapter = match loaded {
            Ok(chapter) => chapter,
            Err(e) => {
                tracing::warn!(book_id = %book_id, chapter_id = %chapter_id, error = %e, "Failed to start reading");
                self.inner.fail(&mut state, PlayerStatus::Idle, &e.to_string());
                return Err(e);
            }
        };

        self.inner.apply_chapter(&mut state, &chapter);
        state.arm_sleep_timer(self.inner.clock.now());
        self.inner.set_status(&mut state, PlayerStatus::Playing);

        tracing::info!(
            session_id = %state.session_id,
            book_id = %book_id,
            chapter_id = %chapter_id,
            paragraphs = state.paragraph_count(),
            "Reading started"
        );
        drop(state);

        self.restart_narration().await;
        Ok(())
    }

    /// 从当前段落开头继续朗读
    pub async fn play(&self) -> Result<(), ApplicationError> {
        let _control = self.inner.control.lock().await;
        self.play_locked().await
    }

    /// 暂停朗读，保留当前段落
    pub async fn pause(&self) {
        let _control = self.inner.control.lock().await;
        self.pause_locked().await;
    }

    /// 播放/暂停切换
    pub async fn toggle_play_pause(&self) -> Result<(), ApplicationError> {
        let _control = self.inner.control.lock().await;
        let playing = self.inner.state.lock().await.is_playing();
        if playing {
            self.pause_locked().await;
            Ok(())
        } else {
            self.play_locked().await
        }
    }

    /// 停止朗读，段落下标归零
    pub async fn stop(&self) {
        let _control = self.inner.control.lock().await;
        self.cancel_narration().await;

        let mut state = self.inner.state.lock().await;
        state.current_paragraph = 0;
        state.previous_paragraph = 0;
        if state.status != PlayerStatus::Idle {
            self.inner.set_status(&mut state, PlayerStatus::Idle);
        }
    }

    /// 下一段，已是最后一段时返回 false
    pub async fn next_paragraph(&self) -> Result<bool, ApplicationError> {
        self.step_paragraph(Direction::Next).await
    }

    /// 上一段，已是第一段时返回 false
    pub async fn previous_paragraph(&self) -> Result<bool, ApplicationError> {
        self.step_paragraph(Direction::Previous).await
    }

    /// 下一章，已是最后一章时返回 false
    pub async fn skip_to_next_chapter(&self) -> Result<bool, ApplicationError> {
        self.skip_chapter(Direction::Next).await
    }

    /// 上一章，已是第一章时返回 false
    pub async fn skip_to_previous_chapter(&self) -> Result<bool, ApplicationError> {
        self.skip_chapter(Direction::Previous).await
    }

    /// 切换合成引擎，从下一个朗读步骤开始生效
    pub fn switch_engine(&self, synthesizer: Arc<dyn SynthesizerPort>) {
        let engine = synthesizer.engine_name().to_string();
        let voice_id = synthesizer.voice_id().to_string();
        *self
            .inner
            .synthesizer
            .write()
            .unwrap_or_else(|e| e.into_inner()) = synthesizer;

        tracing::info!(engine = %engine, voice_id = %voice_id, "Synthesis engine switched");
        self.inner.events.publish_engine_switched(&engine, &voice_id);
    }

    pub async fn set_speech_speed(&self, speed: f32) -> Result<(), ApplicationError> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(ApplicationError::validation(format!(
                "Speech speed must be positive, got {}",
                speed
            )));
        }
        self.inner.state.lock().await.speech_speed = speed;
        Ok(())
    }

    pub async fn set_pitch(&self, pitch: f32) -> Result<(), ApplicationError> {
        if !(pitch.is_finite() && pitch > 0.0) {
            return Err(ApplicationError::validation(format!(
                "Pitch must be positive, got {}",
                pitch
            )));
        }
        self.inner.state.lock().await.pitch = pitch;
        Ok(())
    }

    pub async fn set_auto_next_chapter(&self, enabled: bool) {
        self.inner.state.lock().await.auto_next_chapter = enabled;
    }

    /// 设置睡眠定时器（分钟），0 表示关闭
    ///
    /// 截止时间从会话开始时间起算
    pub async fn set_sleep_timer(&self, minutes: u32) {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock().await;
        state.configure_sleep_timer(minutes, now);
        tracing::debug!(minutes = minutes, deadline = ?state.sleep_deadline, "Sleep timer configured");
    }

    /// 停止朗读并结束所有受监管的外部进程
    pub async fn shutdown(&self) -> usize {
        let _control = self.inner.control.lock().await;
        self.cancel_narration().await;

        {
            let mut state = self.inner.state.lock().await;
            state.current_paragraph = 0;
            state.previous_paragraph = 0;
            if state.status != PlayerStatus::Idle {
                self.inner.set_status(&mut state, PlayerStatus::Idle);
            }
        }

        let terminated = self.inner.supervisor.terminate_all();
        tracing::info!(terminated = terminated, "Playback orchestrator shut down");
        terminated
    }

    async fn play_locked(&self) -> Result<(), ApplicationError> {
        {
            let mut state = self.inner.state.lock().await;
            match state.status {
                PlayerStatus::Playing | PlayerStatus::Loading => return Ok(()),
                PlayerStatus::Idle | PlayerStatus::Paused => {}
            }
            if state.paragraphs.is_empty() {
                return Err(ApplicationError::invalid_state("No chapter loaded"));
            }
            if state.at_end_of_chapter() {
                state.current_paragraph = 0;
            }

            let now = self.inner.clock.now();
            if state.sleep_timer_expired(now) {
                state.arm_sleep_timer(now);
            }
            self.inner.set_status(&mut state, PlayerStatus::Playing);
        }

        self.restart_narration().await;
        Ok(())
    }

    async fn pause_locked(&self) {
        if !self.inner.state.lock().await.is_playing() {
            return;
        }
        self.cancel_narration().await;

        let mut state = self.inner.state.lock().await;
        // 朗读任务可能已经因章节结束或定时器到期而停下
        if state.status == PlayerStatus::Playing {
            self.inner.set_status(&mut state, PlayerStatus::Paused);
        }
    }

    async fn step_paragraph(&self, direction: Direction) -> Result<bool, ApplicationError> {
        let _control = self.inner.control.lock().await;

        let (target, was_playing) = {
            let state = self.inner.state.lock().await;
            if state.paragraphs.is_empty() {
                return Err(ApplicationError::invalid_state("No chapter loaded"));
            }
            let target = match direction {
                Direction::Next => state.current_paragraph.checked_add(1),
                Direction::Previous => state.current_paragraph.checked_sub(1),
            };
            match target {
                Some(target) if target < state.paragraph_count() => (target, state.is_playing()),
                _ => return Ok(false),
            }
        };

        if was_playing {
            self.cancel_narration().await;
        }

        let (moved, resume) = {
            let mut state = self.inner.state.lock().await;
            let moved = state.move_to(target);
            if moved {
                self.inner.events.publish_paragraph(
                    state.session_id,
                    state.current_paragraph,
                    state.paragraph_count(),
                );
            }
            (moved, state.is_playing())
        };

        if was_playing && resume {
            self.restart_narration().await;
        }
        Ok(moved)
    }

    async fn skip_chapter(&self, direction: Direction) -> Result<bool, ApplicationError> {
        let _control = self.inner.control.lock().await;

        let (book_id, chapter_id, previous_status) = {
            let state = self.inner.state.lock().await;
            match (state.book_id, state.chapter_id) {
                (Some(book_id), Some(chapter_id)) => (book_id, chapter_id, state.status),
                _ => return Err(ApplicationError::invalid_state("No chapter loaded")),
            }
        };

        let target = match self
            .inner
            .adjacent_chapter(book_id, chapter_id, direction)
            .await
        {
            Ok(Some(target)) => target,
            Ok(None) => return Ok(false),
            Err(e) => {
                self.cancel_narration().await;
                let mut state = self.inner.state.lock().await;
                self.inner.fail(&mut state, PlayerStatus::Idle, &e.to_string());
                return Err(e);
            }
        };

        self.cancel_narration().await;
        {
            let mut state = self.inner.state.lock().await;
            self.inner.set_status(&mut state, PlayerStatus::Loading);
        }

        let loaded = self.inner.load_chapter(target.id).await;

        let resume = {
            let mut state = self.inner.state.lock().await;
            let chapter = match loaded {
                Ok(chapter) => chapter,
                Err(e) => {
                    tracing::warn!(chapter_id = %target.id, error = %e, "Failed to load chapter");
                    self.inner.fail(&mut state, PlayerStatus::Idle, &e.to_string());
                    return Err(e);
                }
            };
            self.inner.apply_chapter(&mut state, &chapter);

            let status = match previous_status {
                PlayerStatus::Loading => PlayerStatus::Idle,
                other => other,
            };
            self.inner.set_status(&mut state, status);
            status == PlayerStatus::Playing
        };

        if resume {
            self.restart_narration().await;
        }
        Ok(true)
    }

    async fn load_for_reading(
        &self,
        book_id: BookId,
        chapter_id: ChapterId,
    ) -> Result<Chapter, ApplicationError> {
        self.inner
            .chapters
            .find_book(book_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Book", book_id))?;

        let chapter = self.inner.load_chapter(chapter_id).await?;
        if chapter.book_id != book_id {
            return Err(ApplicationError::validation(format!(
                "Chapter {} does not belong to book {}",
                chapter_id, book_id
            )));
        }
        Ok(chapter)
    }

    /// 取消并等待当前朗读任务
    async fn cancel_narration(&self) {
        let narration = self
            .inner
            .narration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(narration) = narration {
            narration.cancel.cancel();
            if let Err(e) = narration.handle.await {
                tracing::error!(error = %e, "Narration task panicked");
            }
        }
    }

    /// 回收旧任务后从当前段落启动新的朗读任务
    async fn restart_narration(&self) {
        self.cancel_narration().await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(narrate(self.inner.clone(), cancel.clone()));
        *self
            .inner
            .narration
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Narration { cancel, handle });
    }
}

impl Inner {
    fn current_synthesizer(&self) -> Arc<dyn SynthesizerPort> {
        self.synthesizer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_status(&self, state: &mut PlaybackState, status: PlayerStatus) {
        state.status = status;
        self.events
            .publish_status(state.session_id, status, state.current_paragraph);
    }

    fn fail(&self, state: &mut PlaybackState, status: PlayerStatus, message: &str) {
        self.events.publish_error(state.session_id, message);
        self.set_status(state, status);
    }

    /// 睡眠定时器到期，强制停止
    fn expire_sleep_timer(&self, state: &mut PlaybackState) {
        tracing::info!(session_id = %state.session_id, "Sleep timer expired, stopping narration");
        state.current_paragraph = 0;
        state.previous_paragraph = 0;
        self.set_status(state, PlayerStatus::Idle);
        self.events.publish_sleep_timer_expired(state.session_id);
    }

    fn apply_chapter(&self, state: &mut PlaybackState, chapter: &Chapter) {
        state.load_chapter(chapter.book_id, chapter.id, chapter.paragraphs());
        self.events.publish_chapter_loaded(
            state.session_id,
            chapter.book_id,
            chapter.id,
            &chapter.name,
            state.paragraph_count(),
        );
    }

    /// 加载章节正文，本地内容为空时从远程抓取并回存
    async fn load_chapter(&self, chapter_id: ChapterId) -> Result<Chapter, ApplicationError> {
        let chapter = self
            .chapters
            .find_chapter(chapter_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Chapter", chapter_id))?;

        if !chapter.is_empty() {
            return Ok(chapter);
        }

        let Some(remote) = &self.remote else {
            return Err(ApplicationError::validation(format!(
                "Chapter {} has no content",
                chapter_id
            )));
        };

        tracing::info!(chapter_id = %chapter_id, "Local content missing, fetching chapter");
        let fetched = remote.fetch_content(&chapter).await?;
        if fetched.is_empty() {
            return Err(ApplicationError::validation(format!(
                "Chapter {} has no content",
                chapter_id
            )));
        }

        if let Err(e) = self.chapters.save_chapter(fetched.clone()).await {
            tracing::warn!(chapter_id = %chapter_id, error = %e, "Failed to store fetched chapter");
        }
        Ok(fetched)
    }

    /// 按书籍章节列表中的位置查找相邻章节
    async fn adjacent_chapter(
        &self,
        book_id: BookId,
        chapter_id: ChapterId,
        direction: Direction,
    ) -> Result<Option<Chapter>, ApplicationError> {
        let chapters = self.chapters.find_chapters_by_book(book_id).await?;
        let position = chapters
            .iter()
            .position(|c| c.id == chapter_id)
            .ok_or_else(|| ApplicationError::not_found("Chapter", chapter_id))?;

        let target = match direction {
            Direction::Next => position.checked_add(1),
            Direction::Previous => position.checked_sub(1),
        };
        Ok(target.and_then(|i| chapters.into_iter().nth(i)))
    }

    /// 在状态锁内决定下一步，空白段落直接跳过
    fn next_step(&self, state: &mut PlaybackState) -> Step {
        while state
            .current_text()
            .map_or(false, |text| text.trim().is_empty())
        {
            state.advance();
        }

        if state.at_end_of_chapter() {
            let (Some(book_id), Some(chapter_id)) = (state.book_id, state.chapter_id) else {
                self.set_status(state, PlayerStatus::Idle);
                return Step::Finished;
            };
            if !state.auto_next_chapter {
                tracing::info!(chapter_id = %chapter_id, "Chapter finished");
                state.current_paragraph = 0;
                state.previous_paragraph = 0;
                self.set_status(state, PlayerStatus::Idle);
                return Step::Finished;
            }
            return Step::ChapterFinished {
                book_id,
                chapter_id,
            };
        }

        let index = state.current_paragraph;
        let text = state.paragraphs[index].clone();
        let upcoming = state
            .paragraphs
            .iter()
            .skip(index + 1)
            .filter(|p| !p.trim().is_empty())
            .take(self.prefetch_paragraphs)
            .cloned()
            .collect();

        self.events
            .publish_paragraph(state.session_id, index, state.paragraph_count());

        Step::Speak {
            session_id: state.session_id,
            index,
            request: SynthesisRequest::new(text)
                .with_speed(state.speech_speed)
                .with_pitch(state.pitch),
            upcoming,
        }
    }

    /// 后台预取后续段落，随朗读任务一起取消
    fn spawn_prefetch(
        &self,
        synthesizer: Arc<dyn SynthesizerPort>,
        texts: Vec<String>,
        request: &SynthesisRequest,
        cancel: CancellationToken,
    ) {
        let Some(cache) = self.cache.clone() else {
            return;
        };
        if texts.is_empty() {
            return;
        }

        let (speed, pitch) = (request.speed, request.pitch);
        let in_flight = self.in_flight.clone();
        tokio::spawn(async move {
            let summary = pregenerate(
                cache.as_ref(),
                synthesizer.as_ref(),
                &in_flight,
                &texts,
                speed,
                pitch,
                &cancel,
                |_, _| {},
            )
            .await;
            tracing::debug!(
                generated = summary.generated,
                skipped = summary.skipped,
                failed = summary.failed,
                "Upcoming paragraphs prefetched"
            );
        });
    }
}

fn apply_preferences(state: &mut PlaybackState, preferences: &PlaybackPreferences) {
    state.speech_speed = preferences.speech_speed;
    state.pitch = preferences.pitch;
    state.auto_next_chapter = preferences.auto_next_chapter;
    state.sleep_timer_minutes = preferences.sleep_timer_minutes;
    state.sleep_timer_enabled = preferences.sleep_timer_minutes > 0;
}

/// 朗读任务入口，被取消时停止音频输出
async fn narrate(inner: Arc<Inner>, cancel: CancellationToken) {
    run_narration(&inner, &cancel).await;
    if cancel.is_cancelled() {
        inner.sink.stop();
    }
}

async fn run_narration(inner: &Arc<Inner>, cancel: &CancellationToken) {
    loop {
        let step = {
            let mut state = inner.state.lock().await;
            if cancel.is_cancelled() || !state.is_playing() {
                return;
            }
            if state.sleep_timer_expired(inner.clock.now()) {
                inner.expire_sleep_timer(&mut state);
                return;
            }
            inner.next_step(&mut state)
        };

        let keep_going = match step {
            Step::Speak {
                session_id,
                index,
                request,
                upcoming,
            } => speak(inner, cancel, session_id, index, request, upcoming).await,
            Step::ChapterFinished {
                book_id,
                chapter_id,
            } => continue_with_next_chapter(inner, cancel, book_id, chapter_id).await,
            Step::Finished => false,
        };

        if !keep_going {
            return;
        }
    }
}

/// 朗读一个段落：合成（优先读缓存）→ 播放 → 等待结束
async fn speak(
    inner: &Arc<Inner>,
    cancel: &CancellationToken,
    session_id: Uuid,
    index: usize,
    request: SynthesisRequest,
    upcoming: Vec<String>,
) -> bool {
    let synthesizer = inner.current_synthesizer();

    let synthesized = tokio::select! {
        _ = cancel.cancelled() => return false,
        result = inner.in_flight.synthesize(inner.cache.as_deref(), synthesizer.as_ref(), &request) => result,
    };

    let samples = match synthesized {
        Ok(samples) => samples,
        Err(e) => {
            let mut state = inner.state.lock().await;
            if cancel.is_cancelled() {
                return false;
            }
            tracing::warn!(session_id = %session_id, paragraph = index, error = %e, "Paragraph synthesis failed");
            inner.fail(
                &mut state,
                PlayerStatus::Paused,
                &format!("Failed to synthesize paragraph {}: {}", index + 1, e),
            );
            return false;
        }
    };

    inner.spawn_prefetch(synthesizer, upcoming, &request, cancel.child_token());

    let played = tokio::select! {
        _ = cancel.cancelled() => return false,
        played = inner.sink.play(samples) => played,
    };

    let mut state = inner.state.lock().await;
    if cancel.is_cancelled() {
        return false;
    }
    if let Err(e) = played {
        tracing::warn!(session_id = %session_id, paragraph = index, error = %e, "Audio playback failed");
        inner.fail(&mut state, PlayerStatus::Paused, &e.to_string());
        return false;
    }
    if state.sleep_timer_expired(inner.clock.now()) {
        inner.expire_sleep_timer(&mut state);
        return false;
    }

    state.advance();
    true
}

/// 章节读完后自动进入下一章
async fn continue_with_next_chapter(
    inner: &Arc<Inner>,
    cancel: &CancellationToken,
    book_id: BookId,
    chapter_id: ChapterId,
) -> bool {
    let next = tokio::select! {
        _ = cancel.cancelled() => return false,
        next = inner.adjacent_chapter(book_id, chapter_id, Direction::Next) => next,
    };

    let next = match next {
        Ok(Some(next)) => next,
        Ok(None) => {
            let mut state = inner.state.lock().await;
            if cancel.is_cancelled() {
                return false;
            }
            tracing::info!(book_id = %book_id, "Reached the last chapter");
            state.current_paragraph = 0;
            state.previous_paragraph = 0;
            inner.set_status(&mut state, PlayerStatus::Idle);
            return false;
        }
        Err(e) => {
            let mut state = inner.state.lock().await;
            if cancel.is_cancelled() {
                return false;
            }
            inner.fail(&mut state, PlayerStatus::Idle, &e.to_string());
            return false;
        }
    };

    let loaded = tokio::select! {
        _ = cancel.cancelled() => return false,
        loaded = inner.load_chapter(next.id) => loaded,
    };

    let mut state = inner.state.lock().await;
    if cancel.is_cancelled() {
        return false;
    }
    match loaded {
        Ok(chapter) => {
            tracing::info!(chapter_id = %chapter.id, "Advancing to next chapter");
            inner.apply_chapter(&mut state, &chapter);
            true
        }
        Err(e) => {
            tracing::warn!(chapter_id = %next.id, error = %e, "Failed to load next chapter");
            inner.fail(&mut state, PlayerStatus::Idle, &e.to_string());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{ManualClock, ProcessError, SupervisedProcess};
    use crate::application::services::test_support::{
        wait_until, MemoryCache, RecordingSink, ScriptedSynthesizer,
    };
    use crate::domain::library::Book;
    use crate::infrastructure::memory::{
        InMemoryChapterRepository, InMemoryPreferences, InMemoryRemoteChapters,
    };
    use chrono::Utc;
    use std::time::Duration;

    struct Harness {
        orchestrator: PlaybackOrchestrator,
        synth: Arc<ScriptedSynthesizer>,
        sink: Arc<RecordingSink>,
        chapters: Arc<InMemoryChapterRepository>,
        clock: Arc<ManualClock>,
        supervisor: Arc<ProcessSupervisor>,
        events: broadcast::Receiver<PlaybackEvent>,
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// 书 1：第 10 章三段，第 11 章两段，第 12 章本地无正文（远程一段）
    fn build(
        sink: RecordingSink,
        preferences: PlaybackPreferences,
        cache: Option<Arc<MemoryCache>>,
        prefetch_paragraphs: usize,
    ) -> Harness {
        let chapters = InMemoryChapterRepository::new().arc();
        chapters.insert_book(
            Book::new(BookId(1), "测试书"),
            vec![
                Chapter::new(ChapterId(10), BookId(1), "第一章", texts(&["一", "", "二", "三"])),
                Chapter::new(ChapterId(11), BookId(1), "第二章", texts(&["四", "五"])),
                Chapter::new(ChapterId(12), BookId(1), "第三章", Vec::new()),
            ],
        );
        let remote = InMemoryRemoteChapters::new().arc();
        remote.insert(ChapterId(12), texts(&["六"]));

        let synth = Arc::new(ScriptedSynthesizer::new("a"));
        let sink = Arc::new(sink);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let supervisor = ProcessSupervisor::new().arc();
        let events = EventPublisher::new().arc();
        let receiver = events.subscribe();

        let orchestrator = PlaybackOrchestrator::new(
            PlaybackDependencies {
                chapters: chapters.clone(),
                remote: Some(remote as Arc<dyn RemoteChapterPort>),
                synthesizer: synth.clone(),
                cache: cache.map(|c| c as Arc<dyn SynthesisCachePort>),
                sink: sink.clone(),
                supervisor: supervisor.clone(),
                preferences: InMemoryPreferences::new(preferences).arc(),
                events,
                clock: clock.clone(),
            },
            prefetch_paragraphs,
        );

        Harness {
            orchestrator,
            synth,
            sink,
            chapters,
            clock,
            supervisor,
            events: receiver,
        }
    }

    fn harness(sink: RecordingSink, preferences: PlaybackPreferences) -> Harness {
        build(sink, preferences, None, 0)
    }

    fn manual_chapters() -> PlaybackPreferences {
        PlaybackPreferences {
            auto_next_chapter: false,
            ..PlaybackPreferences::default()
        }
    }

    async fn wait_for_status(orchestrator: &PlaybackOrchestrator, status: PlayerStatus) -> PlaybackState {
        for _ in 0..400 {
            let state = orchestrator.snapshot().await;
            if state.status == status {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("status {:?} not reached within 2s", status);
    }

    async fn wait_started(sink: &RecordingSink, count: usize) {
        wait_until(|| sink.started() == count).await;
    }

    fn drain(receiver: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_chapter_end_without_auto_advance_goes_idle() {
        let mut h = harness(RecordingSink::instant(), manual_chapters());

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        let state = wait_for_status(&h.orchestrator, PlayerStatus::Idle).await;

        assert_eq!(state.chapter_id, Some(ChapterId(10)));
        assert_eq!(state.current_paragraph, 0);
        assert_eq!(h.synth.texts(), vec!["一", "二", "三"]);
        assert_eq!(h.sink.played(), vec![4, 4, 4]);

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            PlaybackEvent::ChapterLoaded { chapter_id: ChapterId(10), paragraph_count: 3, .. }
        )));
        let paragraphs: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::ParagraphChanged { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(paragraphs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_auto_advance_reads_through_book() {
        let mut h = harness(RecordingSink::instant(), PlaybackPreferences::default());

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        let state = wait_for_status(&h.orchestrator, PlayerStatus::Idle).await;

        // 第三章正文来自远程，并回存到本地书库
        assert_eq!(h.synth.texts(), vec!["一", "二", "三", "四", "五", "六"]);
        assert_eq!(state.chapter_id, Some(ChapterId(12)));
        let stored = h.chapters.find_chapter(ChapterId(12)).await.unwrap().unwrap();
        assert_eq!(stored.paragraphs(), vec!["六"]);

        let loaded: Vec<ChapterId> = drain(&mut h.events)
            .into_iter()
            .filter_map(|e| match e {
                PlaybackEvent::ChapterLoaded { chapter_id, .. } => Some(chapter_id),
                _ => None,
            })
            .collect();
        assert_eq!(loaded, vec![ChapterId(10), ChapterId(11), ChapterId(12)]);
    }

    #[tokio::test]
    async fn test_sleep_timer_stops_after_current_paragraph() {
        let mut h = harness(
            RecordingSink::gated(),
            PlaybackPreferences {
                auto_next_chapter: false,
                sleep_timer_minutes: 1,
                ..PlaybackPreferences::default()
            },
        );

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        wait_started(&h.sink, 1).await;

        h.clock.advance(chrono::Duration::seconds(61));
        h.sink.release();

        let state = wait_for_status(&h.orchestrator, PlayerStatus::Idle).await;
        assert_eq!(state.current_paragraph, 0);
        assert_eq!(h.sink.played().len(), 1);
        assert_eq!(h.synth.call_count(), 1);

        let events = drain(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, PlaybackEvent::SleepTimerExpired { .. })));
    }

    #[tokio::test]
    async fn test_pause_and_resume_replays_paragraph() {
        let h = harness(RecordingSink::gated(), manual_chapters());

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        wait_started(&h.sink, 1).await;

        h.orchestrator.pause().await;
        let state = h.orchestrator.snapshot().await;
        assert_eq!(state.status, PlayerStatus::Paused);
        assert_eq!(state.current_paragraph, 0);
        assert!(h.sink.stop_count() >= 1);
        assert!(h.sink.played().is_empty());

        h.orchestrator.play().await.unwrap();
        wait_started(&h.sink, 2).await;
        h.sink.release();
        wait_started(&h.sink, 3).await;

        assert_eq!(h.orchestrator.snapshot().await.current_paragraph, 1);
        assert_eq!(h.synth.texts(), vec!["一", "一", "二"]);

        h.orchestrator.stop().await;
        let state = h.orchestrator.snapshot().await;
        assert_eq!(state.status, PlayerStatus::Idle);
        assert_eq!(state.current_paragraph, 0);
    }

    #[tokio::test]
    async fn test_toggle_play_pause() {
        let h = harness(RecordingSink::gated(), manual_chapters());
        assert!(h.orchestrator.play().await.is_err());

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        wait_started(&h.sink, 1).await;

        h.orchestrator.toggle_play_pause().await.unwrap();
        assert_eq!(h.orchestrator.snapshot().await.status, PlayerStatus::Paused);

        h.orchestrator.toggle_play_pause().await.unwrap();
        assert_eq!(h.orchestrator.snapshot().await.status, PlayerStatus::Playing);
        wait_started(&h.sink, 2).await;
        h.orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_paragraph_navigation() {
        let h = harness(RecordingSink::gated(), manual_chapters());

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        wait_started(&h.sink, 1).await;

        assert!(h.orchestrator.next_paragraph().await.unwrap());
        wait_started(&h.sink, 2).await;
        let state = h.orchestrator.snapshot().await;
        assert_eq!(state.current_paragraph, 1);
        assert_eq!(state.previous_paragraph, 0);

        assert!(h.orchestrator.previous_paragraph().await.unwrap());
        wait_started(&h.sink, 3).await;
        assert_eq!(h.orchestrator.snapshot().await.current_paragraph, 0);

        // 越界不重启朗读
        assert!(!h.orchestrator.previous_paragraph().await.unwrap());
        assert_eq!(h.synth.texts(), vec!["一", "二", "一"]);

        // 暂停时只移动下标
        h.orchestrator.pause().await;
        assert!(h.orchestrator.next_paragraph().await.unwrap());
        assert!(h.orchestrator.next_paragraph().await.unwrap());
        assert!(!h.orchestrator.next_paragraph().await.unwrap());
        let state = h.orchestrator.snapshot().await;
        assert_eq!(state.current_paragraph, 2);
        assert_eq!(state.status, PlayerStatus::Paused);
        assert_eq!(h.sink.started(), 3);
    }

    #[tokio::test]
    async fn test_skip_chapters() {
        let h = harness(RecordingSink::gated(), manual_chapters());

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        wait_started(&h.sink, 1).await;

        assert!(h.orchestrator.skip_to_next_chapter().await.unwrap());
        wait_started(&h.sink, 2).await;
        let state = h.orchestrator.snapshot().await;
        assert_eq!(state.chapter_id, Some(ChapterId(11)));
        assert_eq!(state.status, PlayerStatus::Playing);
        assert_eq!(h.synth.texts().last().map(String::as_str), Some("四"));

        assert!(h.orchestrator.skip_to_previous_chapter().await.unwrap());
        wait_started(&h.sink, 3).await;
        assert!(!h.orchestrator.skip_to_previous_chapter().await.unwrap());
        assert_eq!(h.orchestrator.snapshot().await.chapter_id, Some(ChapterId(10)));

        // 暂停状态下切章不会开始朗读，远程补全第三章
        h.orchestrator.pause().await;
        assert!(h.orchestrator.skip_to_next_chapter().await.unwrap());
        assert!(h.orchestrator.skip_to_next_chapter().await.unwrap());
        assert!(!h.orchestrator.skip_to_next_chapter().await.unwrap());

        let state = h.orchestrator.snapshot().await;
        assert_eq!(state.chapter_id, Some(ChapterId(12)));
        assert_eq!(state.paragraphs, vec!["六"]);
        assert_eq!(state.status, PlayerStatus::Paused);
        assert_eq!(h.sink.started(), 3);
    }

    #[tokio::test]
    async fn test_synthesis_failure_pauses_on_same_paragraph() {
        let mut h = harness(RecordingSink::instant(), manual_chapters());
        h.synth.fail_on("二");

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        let state = wait_for_status(&h.orchestrator, PlayerStatus::Paused).await;
        assert_eq!(state.current_paragraph, 1);
        assert!(drain(&mut h.events)
            .iter()
            .any(|e| matches!(e, PlaybackEvent::Error { .. })));

        h.synth.recover("二");
        h.orchestrator.play().await.unwrap();
        wait_for_status(&h.orchestrator, PlayerStatus::Idle).await;
        assert_eq!(h.synth.texts(), vec!["一", "二", "二", "三"]);
        assert_eq!(h.sink.played().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_chapter_reports_error() {
        let mut h = harness(RecordingSink::instant(), manual_chapters());

        let err = h
            .orchestrator
            .start_reading(BookId(1), ChapterId(99))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { resource_type: "Chapter", .. }));

        let err = h
            .orchestrator
            .start_reading(BookId(7), ChapterId(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { resource_type: "Book", .. }));

        assert_eq!(h.orchestrator.snapshot().await.status, PlayerStatus::Idle);
        let errors = drain(&mut h.events)
            .into_iter()
            .filter(|e| matches!(e, PlaybackEvent::Error { .. }))
            .count();
        assert_eq!(errors, 2);
        assert_eq!(h.synth.call_count(), 0);
    }

    #[tokio::test]
    async fn test_switch_engine_applies_to_next_paragraph() {
        let mut h = harness(RecordingSink::gated(), manual_chapters());
        let replacement = Arc::new(ScriptedSynthesizer::new("b"));

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        wait_started(&h.sink, 1).await;

        h.orchestrator.switch_engine(replacement.clone());
        assert_eq!(h.orchestrator.synthesizer().voice_id(), "b");

        h.sink.release();
        wait_started(&h.sink, 2).await;
        assert_eq!(h.synth.texts(), vec!["一"]);
        assert_eq!(replacement.texts(), vec!["二"]);

        assert!(drain(&mut h.events).iter().any(|e| matches!(
            e,
            PlaybackEvent::EngineSwitched { voice_id, .. } if voice_id == "b"
        )));
        h.orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_live_settings_apply_to_next_request() {
        let h = harness(RecordingSink::gated(), manual_chapters());
        assert!(h.orchestrator.set_speech_speed(0.0).await.is_err());
        assert!(h.orchestrator.set_pitch(f32::NAN).await.is_err());

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        wait_started(&h.sink, 1).await;

        h.orchestrator.set_speech_speed(1.5).await.unwrap();
        h.orchestrator.set_pitch(0.8).await.unwrap();
        h.sink.release();
        wait_started(&h.sink, 2).await;

        let requests = h.synth.requests();
        assert_eq!(requests[0].speed, 1.0);
        assert_eq!(requests[1].speed, 1.5);
        assert_eq!(requests[1].pitch, 0.8);
        h.orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_sleep_timer_configured_mid_session() {
        let h = harness(RecordingSink::gated(), manual_chapters());

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        wait_started(&h.sink, 1).await;

        h.orchestrator.set_sleep_timer(1).await;
        assert!(h.orchestrator.snapshot().await.sleep_deadline.is_some());

        h.clock.advance(chrono::Duration::seconds(61));
        h.sink.release();
        wait_for_status(&h.orchestrator, PlayerStatus::Idle).await;
        assert_eq!(h.sink.played().len(), 1);
    }

    #[tokio::test]
    async fn test_prefetch_fills_cache_ahead() {
        let cache = Arc::new(MemoryCache::default());
        let h = build(
            RecordingSink::gated(),
            manual_chapters(),
            Some(cache.clone()),
            DEFAULT_PREFETCH_PARAGRAPHS,
        );

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        wait_started(&h.sink, 1).await;
        wait_until(|| cache.len() == 3).await;

        for started in 2..=3 {
            h.sink.release();
            wait_started(&h.sink, started).await;
        }
        h.sink.release();
        wait_for_status(&h.orchestrator, PlayerStatus::Idle).await;

        assert_eq!(h.synth.call_count(), 3);
        assert_eq!(cache.hits(), 2);
    }

    #[tokio::test]
    async fn test_slow_synthesis_never_duplicates_prefetched_paragraph() {
        let cache = Arc::new(MemoryCache::default());
        let mut h = build(
            RecordingSink::instant(),
            manual_chapters(),
            Some(cache.clone()),
            DEFAULT_PREFETCH_PARAGRAPHS,
        );
        h.synth = Arc::new(ScriptedSynthesizer::new("a").with_delay(Duration::from_millis(30)));
        h.orchestrator.switch_engine(h.synth.clone());

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        wait_for_status(&h.orchestrator, PlayerStatus::Idle).await;

        // 合成慢于播放时，朗读等待进行中的预取而不是再合成一次
        assert_eq!(h.sink.played().len(), 3);
        let mut texts = h.synth.texts();
        texts.sort();
        assert_eq!(texts, vec!["一", "三", "二"]);
    }

    struct IdleProcess(u32);

    impl SupervisedProcess for IdleProcess {
        fn id(&self) -> u32 {
            self.0
        }

        fn is_alive(&self) -> bool {
            true
        }

        fn kill(&self) -> Result<(), ProcessError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_terminates_supervised_processes() {
        let h = harness(RecordingSink::gated(), manual_chapters());
        h.supervisor
            .register(Arc::new(IdleProcess(4242)), "command", "piper");

        h.orchestrator
            .start_reading(BookId(1), ChapterId(10))
            .await
            .unwrap();
        wait_started(&h.sink, 1).await;

        assert_eq!(h.orchestrator.shutdown().await, 1);
        assert_eq!(h.supervisor.active_count(), 0);
        assert_eq!(h.orchestrator.snapshot().await.status, PlayerStatus::Idle);
    }
}
